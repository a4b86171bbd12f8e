//! Serde-deserializable types matching the news API responses.
//!
//! These types are separate from domain types: every field is optional here
//! and validation happens when converting into an [`Article`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::error::DataError;
use crate::news::types::{Article, Source};

pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// Envelope shared by both endpoints. Errors come back in the same shape
/// with `status: "error"`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNewsResponse {
  pub status: String,
  pub total_results: Option<u64>,
  #[serde(default)]
  pub articles: Vec<ApiArticle>,
  pub code: Option<String>,
  pub message: Option<String>,
}

impl ApiNewsResponse {
  pub fn is_error(&self) -> bool {
    self.status == "error"
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiSource {
  pub id: Option<String>,
  pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiArticle {
  pub source: Option<ApiSource>,
  pub author: Option<String>,
  pub title: Option<String>,
  pub description: Option<String>,
  pub url: Option<String>,
  pub url_to_image: Option<String>,
  pub published_at: Option<String>,
  pub content: Option<String>,
}

impl ApiArticle {
  /// Validate and convert into a domain article.
  pub fn into_article(self) -> Result<Article, DataError> {
    let url = non_blank(self.url).ok_or(DataError::MissingField("url"))?;
    let title = non_blank(self.title).ok_or(DataError::MissingField("title"))?;
    let published_at = non_blank(self.published_at).ok_or(DataError::MissingField("publishedAt"))?;
    let published_at = normalize_timestamp(&published_at)?;

    let source = match self.source {
      Some(s) => Source {
        id: s.id,
        name: non_blank(s.name).unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
      },
      None => Source {
        id: None,
        name: UNKNOWN_SOURCE.to_string(),
      },
    };

    Ok(Article {
      source,
      author: self.author,
      title,
      description: self.description,
      url,
      url_to_image: self.url_to_image,
      published_at,
      content: self.content,
    })
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

/// Normalise to UTC so timestamps sort lexicographically.
fn normalize_timestamp(raw: &str) -> Result<String, DataError> {
  let parsed =
    DateTime::parse_from_rfc3339(raw).map_err(|_| DataError::InvalidTimestamp(raw.to_string()))?;
  Ok(parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(json: &str) -> ApiNewsResponse {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn test_parse_success_envelope() {
    let response = parse(
      r#"{
        "status": "ok",
        "totalResults": 2,
        "articles": [
          {
            "source": {"id": "bbc-news", "name": "BBC News"},
            "author": null,
            "title": "Rust 2.0 announced",
            "description": "Not really",
            "url": "https://example.com/rust",
            "urlToImage": null,
            "publishedAt": "2024-05-01T12:30:00Z",
            "content": "..."
          },
          {"title": "No url", "publishedAt": "2024-05-01T12:30:00Z"}
        ]
      }"#,
    );

    assert!(!response.is_error());
    assert_eq!(response.total_results, Some(2));
    assert_eq!(response.articles.len(), 2);

    let article = response.articles.into_iter().next().unwrap().into_article().unwrap();
    assert_eq!(article.source.name, "BBC News");
    assert_eq!(article.url, "https://example.com/rust");
    assert_eq!(article.published_at, "2024-05-01T12:30:00Z");
  }

  #[test]
  fn test_parse_error_envelope() {
    let response = parse(
      r#"{"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid."}"#,
    );
    assert!(response.is_error());
    assert!(response.articles.is_empty());
    assert_eq!(response.code.as_deref(), Some("apiKeyInvalid"));
  }

  fn raw(url: Option<&str>, title: Option<&str>, published_at: Option<&str>) -> ApiArticle {
    ApiArticle {
      source: None,
      author: None,
      title: title.map(String::from),
      description: None,
      url: url.map(String::from),
      url_to_image: None,
      published_at: published_at.map(String::from),
      content: None,
    }
  }

  #[test]
  fn test_missing_mandatory_fields_are_rejected() {
    let ts = Some("2024-05-01T12:30:00Z");
    assert_eq!(
      raw(None, Some("t"), ts).into_article(),
      Err(DataError::MissingField("url"))
    );
    assert_eq!(
      raw(Some("https://a"), Some("  "), ts).into_article(),
      Err(DataError::MissingField("title"))
    );
    assert_eq!(
      raw(Some("https://a"), Some("t"), None).into_article(),
      Err(DataError::MissingField("publishedAt"))
    );
  }

  #[test]
  fn test_bad_timestamp_is_rejected() {
    assert_eq!(
      raw(Some("https://a"), Some("t"), Some("yesterday")).into_article(),
      Err(DataError::InvalidTimestamp("yesterday".into()))
    );
  }

  #[test]
  fn test_timestamp_is_normalised_to_utc() {
    let article = raw(Some("https://a"), Some("t"), Some("2024-05-01T14:30:00+02:00"))
      .into_article()
      .unwrap();
    assert_eq!(article.published_at, "2024-05-01T12:30:00Z");
  }

  #[test]
  fn test_missing_source_name_defaults() {
    let mut article = raw(Some("https://a"), Some("t"), Some("2024-05-01T12:30:00Z"));
    article.source = Some(ApiSource {
      id: Some("x".into()),
      name: None,
    });
    assert_eq!(article.into_article().unwrap().source.name, UNKNOWN_SOURCE);
  }
}
