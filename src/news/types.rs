use serde::{Deserialize, Serialize};

/// Where an article was published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
  pub id: Option<String>,
  pub name: String,
}

/// A validated news article, as cached and displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
  pub source: Source,
  pub author: Option<String>,
  pub title: String,
  pub description: Option<String>,
  /// Canonical article URL, also its identity
  pub url: String,
  pub url_to_image: Option<String>,
  /// RFC 3339, always UTC
  pub published_at: String,
  pub content: Option<String>,
}

/// Headline categories accepted by the top-headlines endpoint
pub const CATEGORIES: &[&str] = &[
  "business",
  "entertainment",
  "general",
  "health",
  "science",
  "sports",
  "technology",
];

/// Sort orders accepted by the everything endpoint
pub const SORT_ORDERS: &[&str] = &["relevancy", "popularity", "publishedAt"];
