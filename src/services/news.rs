use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::timestamped_slug;
use crate::error::{ShopError, ShopResult};
use crate::state::AppState;
use crate::types::{News, NewsAudience, NewsCategory, User};

#[derive(Debug, Clone, Deserialize)]
pub struct NewsInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<NewsCategory>,
    #[serde(default)]
    pub audience: Option<NewsAudience>,
}

fn check(input: &NewsInput) -> ShopResult<()> {
    if input.title.trim().is_empty() || input.content.trim().is_empty() {
        return Err(ShopError::InvalidInput(
            "title and content are required".to_string(),
        ));
    }
    Ok(())
}

pub async fn detail(state: &AppState, slug: &str) -> ShopResult<News> {
    state
        .store
        .news_by_slug(slug)
        .await?
        .ok_or(ShopError::NotFound("news"))
}

pub async fn list(state: &AppState) -> ShopResult<Vec<News>> {
    Ok(state.store.list_news(None).await?)
}

pub async fn create(
    state: &AppState,
    admin: &User,
    input: NewsInput,
    now: DateTime<Utc>,
) -> ShopResult<News> {
    check(&input)?;
    let author = input
        .author
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| admin.fullname.clone());
    let news = News {
        id: Uuid::new_v4(),
        slug: timestamped_slug(&input.title, now),
        title: input.title.trim().to_string(),
        content: input.content,
        image: input.image.filter(|i| !i.trim().is_empty()),
        author,
        category: input.category.unwrap_or(NewsCategory::Info),
        audience: input.audience.unwrap_or(NewsAudience::All),
        created_at: now,
        updated_at: now,
    };
    let news = state.store.create_news(news).await?;
    info!(news_id = %news.id, slug = %news.slug, "news published");
    Ok(news)
}

pub async fn update(
    state: &AppState,
    id: Uuid,
    input: NewsInput,
    now: DateTime<Utc>,
) -> ShopResult<News> {
    check(&input)?;
    let mut news = state
        .store
        .news(id)
        .await?
        .ok_or(ShopError::NotFound("news"))?;
    news.title = input.title.trim().to_string();
    news.content = input.content;
    if let Some(image) = input.image {
        news.image = Some(image).filter(|i| !i.trim().is_empty());
    }
    if let Some(author) = input.author.filter(|a| !a.trim().is_empty()) {
        news.author = author;
    }
    if let Some(category) = input.category {
        news.category = category;
    }
    if let Some(audience) = input.audience {
        news.audience = audience;
    }
    news.updated_at = now;
    Ok(state.store.update_news(&news).await?)
}

pub async fn delete(state: &AppState, id: Uuid) -> ShopResult<()> {
    if !state.store.delete_news(id).await? {
        return Err(ShopError::NotFound("news"));
    }
    info!(news_id = %id, "news deleted");
    Ok(())
}
