//! 健康ニュースの取得（NewsAPI top-headlines）

use crate::config::Config;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUERY: &str = "cancer";
pub const DEFAULT_CATEGORY: &str = "health";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub image_url: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsResponse {
    status: String,
    #[serde(default)]
    articles: Vec<Article>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    url_to_image: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    pub q: String,
    pub category: String,
    pub language: String,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            q: DEFAULT_QUERY.into(),
            category: DEFAULT_CATEGORY.into(),
            language: DEFAULT_LANGUAGE.into(),
        }
    }
}

impl NewsQuery {
    pub fn with_q(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }
}

pub struct NewsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.news_base_url, config.get_news_api_key()?))
    }

    fn endpoint(&self) -> String {
        format!("{}/top-headlines", self.base_url.trim_end_matches('/'))
    }

    /// ヘッドラインを検索
    pub async fn search(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        let response = self
            .http
            .get(self.endpoint())
            .query(&[
                ("q", query.q.as_str()),
                ("category", query.category.as_str()),
                ("language", query.language.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(%status, bytes = body.len(), "news response received");

        parse_response(&body).map_err(|e| match e {
            AppError::Json(_) if !status.is_success() => {
                AppError::News(format!("HTTP {}", status))
            }
            other => other,
        })
    }

    pub async fn search_health_news(&self) -> Result<Vec<NewsItem>> {
        self.search(&NewsQuery::default()).await
    }
}

/// レスポンスJSONを記事リストに変換（タイトルか画像のない記事は除外）
pub fn parse_response(body: &str) -> Result<Vec<NewsItem>> {
    let response: NewsResponse = serde_json::from_str(body)?;

    if response.status != "ok" {
        return Err(AppError::News(
            response
                .message
                .unwrap_or_else(|| format!("status {}", response.status)),
        ));
    }

    Ok(response
        .articles
        .into_iter()
        .filter_map(|a| {
            let title = a.title.filter(|t| !t.trim().is_empty())?;
            let image_url = a.url_to_image.filter(|u| !u.trim().is_empty())?;
            Some(NewsItem {
                title,
                image_url,
                url: a.url,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_incomplete_articles() {
        let body = r#"{
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {"title": "Skin check", "urlToImage": "https://img/1.jpg", "url": "https://n/1"},
                {"title": "No image", "urlToImage": null, "url": "https://n/2"},
                {"title": null, "urlToImage": "https://img/3.jpg"},
                {"title": "No link", "urlToImage": "https://img/4.jpg"}
            ]
        }"#;

        let items = parse_response(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Skin check");
        assert_eq!(items[0].url.as_deref(), Some("https://n/1"));
        assert_eq!(items[1].url, None);
    }

    #[test]
    fn test_parse_error_status() {
        let body = r#"{"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid."}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, AppError::News(ref m) if m.contains("invalid")));
    }

    #[test]
    fn test_default_query() {
        let q = NewsQuery::default();
        assert_eq!(q.q, "cancer");
        assert_eq!(q.category, "health");
        assert_eq!(q.language, "en");
        assert_eq!(NewsQuery::with_q("melanoma").category, "health");
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = NewsClient::new("https://newsapi.org/v2/", "key");
        assert_eq!(client.endpoint(), "https://newsapi.org/v2/top-headlines");
    }
}
