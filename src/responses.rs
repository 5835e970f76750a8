use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
pub struct RequestMeta {
    pub request_id: String,
    pub request_at: String, // RFC3339
    pub timestamp: i64,     // unix seconds
}

pub(crate) fn new_meta() -> RequestMeta {
    let now: DateTime<Utc> = Utc::now();
    RequestMeta {
        request_id: Uuid::new_v4().to_string(),
        request_at: now.to_rfc3339(),
        timestamp: now.timestamp(),
    }
}

// Middleware: attaches RequestMeta into request extensions
pub async fn meta_middleware(mut req: Request<Body>, next: Next) -> Response {
    let meta = new_meta();
    req.extensions_mut().insert(meta);
    next.run(req).await
}

/// `?page=&per_page=` query parameters. Pages are 1-based.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for PageQuery {
    fn default() -> Self {
        PageQuery {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageQuery {
    /// Cuts one page out of `items`, returning it with its pagination block.
    pub fn slice<T>(&self, items: Vec<T>) -> (Vec<T>, Pagination) {
        let per_page = self.per_page.clamp(1, 100);
        let page = self.page.max(1);
        let total = items.len() as u64;
        let total_pages = total.div_ceil(per_page as u64) as u32;
        let start = ((page - 1) as usize).saturating_mul(per_page as usize);
        let data = items
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();
        (
            data,
            Pagination {
                page,
                per_page,
                total,
                total_pages,
            },
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Serialize)]
pub struct SuccessEnvelope<T> {
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub meta: RequestMeta,
}

pub struct ApiOk<T> {
    status: StatusCode,
    body: SuccessEnvelope<T>,
}

impl<T> ApiOk<T> {
    pub fn ok(message: impl Into<String>, data: T, meta: RequestMeta) -> Self {
        Self {
            status: StatusCode::OK,
            body: SuccessEnvelope {
                message: message.into(),
                data,
                pagination: None,
                meta,
            },
        }
    }

    pub fn created(message: impl Into<String>, data: T, meta: RequestMeta) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: SuccessEnvelope {
                message: message.into(),
                data,
                pagination: None,
                meta,
            },
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.body.pagination = Some(pagination);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiOk<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slicing_reports_totals() {
        let q = PageQuery {
            page: 2,
            per_page: 3,
        };
        let (data, p) = q.slice((1..=7).collect::<Vec<_>>());
        assert_eq!(data, vec![4, 5, 6]);
        assert_eq!(p.total, 7);
        assert_eq!(p.total_pages, 3);

        let past_end = PageQuery {
            page: 9,
            per_page: 3,
        };
        let (data, _) = past_end.slice((1..=7).collect::<Vec<_>>());
        assert!(data.is_empty());
    }
}
