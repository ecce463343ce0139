//! Google News RSS lookups flattened into [`Article`]s.
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const CATEGORIES: [&str; 8] = [
    "WORLD", "NATION", "BUSINESS", "TECHNOLOGY", "ENTERTAINMENT", "SPORTS", "SCIENCE", "HEALTH",
];
pub const LANGUAGES: [&str; 6] = ["en", "hi", "es", "fr", "uk", "ja"];
pub const COUNTRIES: [&str; 7] = ["WORLD", "US", "IN", "GB", "MX", "UA", "JP"];
pub const MAX_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub published: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsResponse {
    pub feed_title: String,
    pub articles: Vec<Article>,
}

/// Query parameters shared by both lookups; `category` only applies to headlines.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendsQuery {
    pub category: String,
    pub lang: String,
    pub country: String,
    pub limit: usize,
}

impl Default for TrendsQuery {
    fn default() -> Self {
        TrendsQuery {
            category: "WORLD".to_string(),
            lang: "en".to_string(),
            country: "WORLD".to_string(),
            limit: 10,
        }
    }
}

impl TrendsQuery {
    pub fn validate(&self) -> AppResult<()> {
        if !CATEGORIES.contains(&self.category.as_str()) {
            return Err(AppError::InvalidInput(format!("Invalid category '{}'", self.category)));
        }
        if !LANGUAGES.contains(&self.lang.as_str()) {
            return Err(AppError::InvalidInput(format!("Invalid lang '{}'", self.lang)));
        }
        if !COUNTRIES.contains(&self.country.as_str()) {
            return Err(AppError::InvalidInput(format!("Invalid country '{}'", self.country)));
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(AppError::InvalidInput(format!("limit must be between 1 and {}", MAX_LIMIT)));
        }
        Ok(())
    }

    fn locale(&self) -> [(&'static str, String); 3] {
        [
            ("hl", self.lang.clone()),
            ("gl", self.country.clone()),
            ("ceid", format!("{}:{}", self.country, self.lang)),
        ]
    }
}

#[derive(Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Deserialize)]
struct Channel {
    #[serde(default)]
    title: String,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    #[serde(rename = "$text", default)]
    name: String,
}

#[derive(Clone)]
pub struct NewsClient {
    client: Client,
    base_url: String,
}

impl NewsClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client for news: {}", e);
            Client::new()
        });
        NewsClient { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// Top headlines for `query.category`.
    pub async fn headlines(&self, query: &TrendsQuery) -> AppResult<NewsResponse> {
        query.validate()?;
        tracing::info!(
            "Fetching trends: category={}, lang={}, country={}, limit={}",
            query.category, query.lang, query.country, query.limit
        );
        let url = format!("{}/rss/headlines/section/topic/{}", self.base_url, query.category);
        let body = self.fetch(&url, &query.locale()).await?;
        parse_feed(&body, query.limit, &query.category)
    }

    /// Search results for a free-text topic.
    pub async fn by_topic(&self, topic: &str, query: &TrendsQuery) -> AppResult<NewsResponse> {
        query.validate()?;
        if topic.trim().is_empty() {
            return Err(AppError::InvalidInput("topic must not be empty".to_string()));
        }
        tracing::info!(
            "Fetching trends for topic '{}' with lang={}, country={}, limit={}",
            topic, query.lang, query.country, query.limit
        );
        let url = format!("{}/rss/search", self.base_url);
        let mut params = vec![("q", topic.to_string())];
        params.extend(query.locale());
        let body = self.fetch(&url, &params).await?;
        parse_feed(&body, query.limit, topic)
    }

    async fn fetch(&self, url: &str, params: &[(&str, String)]) -> AppResult<String> {
        let response = self.client.get(url).query(params).send().await.map_err(|e| {
            tracing::error!("Error fetching news from {}: {}", url, e);
            AppError::News(e.to_string())
        })?;
        if !response.status().is_success() {
            tracing::error!("News feed {} returned {}", url, response.status());
            return Err(AppError::News(format!("feed returned {}", response.status())));
        }
        response.text().await.map_err(|e| AppError::News(e.to_string()))
    }
}

fn parse_feed(body: &str, limit: usize, label: &str) -> AppResult<NewsResponse> {
    let rss: Rss = quick_xml::de::from_str(body).map_err(|e| {
        tracing::warn!("No news data available for '{}': {}", label, e);
        AppError::NoDataFound("No news data available for the given topic and parameters.".to_string())
    })?;

    let articles: Vec<Article> = rss
        .channel
        .items
        .into_iter()
        .take(limit)
        .filter_map(|item| match item {
            Item { title: Some(title), link: Some(link), pub_date: Some(published), source: Some(source) } => {
                Some(Article {
                    title: headline(&title),
                    link,
                    published,
                    source: source.name.trim().to_string(),
                })
            }
            malformed => {
                tracing::warn!("Skipping malformed entry: {:?}", malformed);
                None
            }
        })
        .collect();

    if articles.is_empty() {
        tracing::warn!("No valid articles found for '{}'", label);
        return Err(AppError::NoDataFound(
            "No valid articles found for the given topic and parameters.".to_string(),
        ));
    }
    Ok(NewsResponse { feed_title: rss.channel.title, articles })
}

/// Google appends ` - Publisher` to every title.
fn headline(title: &str) -> String {
    title.split(" - ").next().unwrap_or(title).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <generator>NFE/5.0</generator>
    <title>"Diwali" - Google News</title>
    <link>https://news.google.com/search?q=Diwali</link>
    <language>en-US</language>
    <item>
      <title>Lights across the city - Daily Planet</title>
      <link>https://news.example.com/a</link>
      <guid isPermaLink="false">a</guid>
      <pubDate>Mon, 28 Oct 2024 08:00:00 GMT</pubDate>
      <description>&lt;a href="x"&gt;x&lt;/a&gt;</description>
      <source url="https://dailyplanet.example">Daily Planet</source>
    </item>
    <item>
      <title>No source here</title>
      <link>https://news.example.com/b</link>
      <pubDate>Mon, 28 Oct 2024 09:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Sweets shops report record sales - The Ledger</title>
      <link>https://news.example.com/c</link>
      <pubDate>Mon, 28 Oct 2024 10:00:00 GMT</pubDate>
      <source url="https://ledger.example">The Ledger</source>
    </item>
  </channel>
</rss>"#;

    const EMPTY_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>"nothing" - Google News</title></channel></rss>"#;

    fn client(server: &MockServer) -> NewsClient {
        NewsClient::new(server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_topic_search_flattens_valid_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/search"))
            .and(query_param("q", "Diwali"))
            .and(query_param("ceid", "IN:en"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let query = TrendsQuery { country: "IN".into(), ..Default::default() };
        let news = client(&server).by_topic("Diwali", &query).await.unwrap();
        assert_eq!(news.feed_title, "\"Diwali\" - Google News");
        assert_eq!(
            news.articles,
            vec![
                Article {
                    title: "Lights across the city".into(),
                    link: "https://news.example.com/a".into(),
                    published: "Mon, 28 Oct 2024 08:00:00 GMT".into(),
                    source: "Daily Planet".into(),
                },
                Article {
                    title: "Sweets shops report record sales".into(),
                    link: "https://news.example.com/c".into(),
                    published: "Mon, 28 Oct 2024 10:00:00 GMT".into(),
                    source: "The Ledger".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_headlines_respect_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/headlines/section/topic/BUSINESS"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let query = TrendsQuery { category: "BUSINESS".into(), limit: 1, ..Default::default() };
        let news = client(&server).headlines(&query).await.unwrap();
        assert_eq!(news.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_topic_without_valid_entries_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_FEED))
            .mount(&server)
            .await;

        let err = client(&server).by_topic("nothing", &TrendsQuery::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NoDataFound(_)));
    }

    #[tokio::test]
    async fn test_feed_outage_is_news_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).headlines(&TrendsQuery::default()).await.unwrap_err();
        assert!(matches!(err, AppError::News(_)));
    }

    #[test]
    fn query_validation_rejects_out_of_range_values() {
        assert!(TrendsQuery::default().validate().is_ok());
        assert!(TrendsQuery { limit: 0, ..Default::default() }.validate().is_err());
        assert!(TrendsQuery { limit: 51, ..Default::default() }.validate().is_err());
        assert!(TrendsQuery { lang: "de".into(), ..Default::default() }.validate().is_err());
        assert!(TrendsQuery { category: "world".into(), ..Default::default() }.validate().is_err());
    }
}
