use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::error::ShopResult;
use crate::state::AppState;
use crate::store::ProductQuery;
use crate::types::SiteSettings;

const STATIC_PAGES: &[&str] = &["/", "/auth/login", "/auth/register", "/marketplace"];

/// The stored site settings, or the defaults when none are stored or the
/// store cannot be read.
pub async fn settings(state: &AppState) -> SiteSettings {
    match state.store.settings().await {
        Ok(Some(settings)) => settings,
        Ok(None) => SiteSettings::default(),
        Err(e) => {
            warn!(error = %e, "could not load site settings, using defaults");
            SiteSettings::default()
        }
    }
}

/// Paths that stay reachable while the site is in maintenance.
pub fn bypasses_maintenance(path: &str) -> bool {
    path == "/health"
        || path == "/site"
        || path == "/deposit/notification"
        || path.starts_with("/auth")
        || path.starts_with("/admin")
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn url_entry(out: &mut String, loc: &str, lastmod: Option<DateTime<Utc>>, priority: &str) {
    out.push_str("  <url>\n");
    out.push_str(&format!("    <loc>{}</loc>\n", escape_xml(loc)));
    if let Some(at) = lastmod {
        out.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    out.push_str(&format!("    <priority>{priority}</priority>\n"));
    out.push_str("  </url>\n");
}

pub async fn sitemap(state: &AppState) -> ShopResult<String> {
    let base = state.config.public_base_url.trim_end_matches('/');
    let products = state.store.list_products(&ProductQuery::default()).await?;
    let news = state.store.list_news(None).await?;

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for page in STATIC_PAGES {
        url_entry(&mut xml, &format!("{base}{page}"), None, "1.0");
    }
    for product in &products {
        url_entry(
            &mut xml,
            &format!("{base}/marketplace/product/{}", product.slug),
            Some(product.updated_at),
            "0.8",
        );
    }
    for post in &news {
        url_entry(
            &mut xml,
            &format!("{base}/news/{}", post.slug),
            Some(post.updated_at),
            "0.6",
        );
    }
    xml.push_str("</urlset>\n");
    Ok(xml)
}

pub fn robots(state: &AppState) -> String {
    format!(
        "User-agent: *\nAllow: /\nDisallow: /admin/\nDisallow: /dashboard/\n\nSitemap: {}/sitemap.xml\n",
        state.config.public_base_url.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_exemptions() {
        assert!(bypasses_maintenance("/auth/login"));
        assert!(bypasses_maintenance("/admin/settings"));
        assert!(bypasses_maintenance("/deposit/notification"));
        assert!(!bypasses_maintenance("/deposit/create"));
        assert!(!bypasses_maintenance("/marketplace"));
    }

    #[test]
    fn xml_text_is_escaped() {
        assert_eq!(escape_xml("a&b<c>"), "a&amp;b&lt;c&gt;");
    }
}
