use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::cache::PageRequest;
use crate::config::ApiConfig;
use crate::error::LoadError;
use crate::news::api_types::ApiNewsResponse;

const API_KEY_HEADER: &str = "X-Api-Key";

/// Filters for the top-headlines endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlineFilter {
  pub country: String,
  pub category: Option<String>,
}

/// Filters for the everything endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
  pub query: String,
  pub sort_by: String,
}

/// News API client wrapper
#[derive(Clone)]
pub struct NewsClient {
  client: reqwest::Client,
  base_url: Url,
  api_key: String,
}

impl NewsClient {
  pub fn new(config: &ApiConfig, api_key: String) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let mut headers = HeaderMap::new();
    headers.insert(
      USER_AGENT,
      HeaderValue::from_static(concat!("newsflow/", env!("CARGO_PKG_VERSION"))),
    );

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .connect_timeout(config.timeout())
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      api_key,
    })
  }

  /// One page of top headlines
  pub async fn top_headlines(
    &self,
    filter: &HeadlineFilter,
    request: PageRequest,
  ) -> Result<ApiNewsResponse, LoadError> {
    let mut params = vec![("country", filter.country.clone())];
    if let Some(category) = &filter.category {
      params.push(("category", category.clone()));
    }
    let url = self.endpoint("v2/top-headlines", params, request)?;
    self.get(url).await
  }

  /// One page of full-text search results
  pub async fn everything(
    &self,
    filter: &SearchFilter,
    request: PageRequest,
  ) -> Result<ApiNewsResponse, LoadError> {
    let params = vec![
      ("q", filter.query.clone()),
      ("sortBy", filter.sort_by.clone()),
    ];
    let url = self.endpoint("v2/everything", params, request)?;
    self.get(url).await
  }

  fn endpoint(
    &self,
    path: &str,
    params: Vec<(&str, String)>,
    request: PageRequest,
  ) -> Result<Url, LoadError> {
    let mut url = self
      .base_url
      .join(path)
      .map_err(|e| LoadError::Transport(format!("invalid endpoint {}: {}", path, e)))?;

    url
      .query_pairs_mut()
      .extend_pairs(params)
      .append_pair("page", &request.page.to_string())
      .append_pair("pageSize", &request.page_size.to_string());

    Ok(url)
  }

  async fn get(&self, url: Url) -> Result<ApiNewsResponse, LoadError> {
    debug!(path = url.path(), query = url.query().unwrap_or(""), "GET");

    let response = self
      .client
      .get(url)
      .header(API_KEY_HEADER, &self.api_key)
      .send()
      .await
      .map_err(classify)?;

    let status = response.status();
    let body = response.text().await.map_err(classify)?;

    if !status.is_success() {
      return Err(upstream_error(status.as_u16(), &body));
    }

    let parsed: ApiNewsResponse =
      serde_json::from_str(&body).map_err(|e| LoadError::Data(e.to_string()))?;

    if parsed.is_error() {
      return Err(LoadError::Upstream {
        status: status.as_u16(),
        code: parsed.code,
        message: parsed.message,
      });
    }

    Ok(parsed)
  }
}

/// Map a reqwest failure onto the load taxonomy.
fn classify(e: reqwest::Error) -> LoadError {
  if e.is_decode() {
    LoadError::Data(e.to_string())
  } else if let Some(status) = e.status() {
    LoadError::upstream(status.as_u16())
  } else {
    // Connect, timeout, body and redirect failures
    LoadError::Transport(e.to_string())
  }
}

/// Build an upstream error, keeping the machine-readable code when the body
/// is the usual error envelope.
fn upstream_error(status: u16, body: &str) -> LoadError {
  match serde_json::from_str::<ApiNewsResponse>(body) {
    Ok(envelope) => LoadError::Upstream {
      status,
      code: envelope.code,
      message: envelope.message,
    },
    Err(_) => LoadError::upstream(status),
  }
}
