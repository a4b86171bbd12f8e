//! Page fetchers that bind the news endpoints to the paging engine.

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{FetchedPage, PageFetcher, PageRequest};
use crate::error::LoadError;
use crate::news::api_types::{ApiArticle, ApiNewsResponse};
use crate::news::client::{HeadlineFilter, NewsClient, SearchFilter};
use crate::news::types::Article;

/// Top headlines for one country/category pair.
pub struct HeadlinesFetcher {
  client: NewsClient,
  filter: HeadlineFilter,
}

impl HeadlinesFetcher {
  pub fn new(client: NewsClient, filter: HeadlineFilter) -> Self {
    Self { client, filter }
  }
}

#[async_trait]
impl PageFetcher for HeadlinesFetcher {
  type Item = Article;

  async fn fetch_page(&self, request: PageRequest) -> Result<FetchedPage<Article>, LoadError> {
    let response = self.client.top_headlines(&self.filter, request).await?;
    Ok(into_page(response))
  }
}

/// Search results for one query.
pub struct SearchFetcher {
  client: NewsClient,
  filter: SearchFilter,
}

impl SearchFetcher {
  pub fn new(client: NewsClient, filter: SearchFilter) -> Self {
    Self { client, filter }
  }
}

#[async_trait]
impl PageFetcher for SearchFetcher {
  type Item = Article;

  async fn fetch_page(&self, request: PageRequest) -> Result<FetchedPage<Article>, LoadError> {
    let response = self.client.everything(&self.filter, request).await?;
    Ok(into_page(response))
  }
}

fn into_page(response: ApiNewsResponse) -> FetchedPage<Article> {
  FetchedPage {
    items: validate(response.articles),
    total_results: response.total_results,
  }
}

/// Keep the valid records; a bad record never fails the page.
pub fn validate(records: Vec<ApiArticle>) -> Vec<Article> {
  let total = records.len();
  let articles: Vec<Article> = records
    .into_iter()
    .filter_map(|record| match record.into_article() {
      Ok(article) => Some(article),
      Err(e) => {
        debug!("dropping article: {}", e);
        None
      }
    })
    .collect();

  if articles.len() < total {
    debug!(kept = articles.len(), total, "invalid articles dropped from page");
  }
  articles
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_invalid_records_are_dropped_not_fatal() {
    let response: ApiNewsResponse = serde_json::from_str(
      r#"{
        "status": "ok",
        "totalResults": 40,
        "articles": [
          {"title": "Kept", "url": "https://a/1", "publishedAt": "2024-01-02T00:00:00Z"},
          {"title": "No date", "url": "https://a/2"},
          {"title": "Bad date", "url": "https://a/3", "publishedAt": "02/01/2024"},
          {"url": "https://a/4", "publishedAt": "2024-01-02T00:00:00Z"},
          {"title": "Also kept", "url": "https://a/5", "publishedAt": "2024-01-01T00:00:00Z"}
        ]
      }"#,
    )
    .unwrap();

    let page = into_page(response);
    let urls: Vec<&str> = page.items.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a/1", "https://a/5"]);
    assert_eq!(page.total_results, Some(40));
  }
}
