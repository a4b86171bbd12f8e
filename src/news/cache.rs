//! Cache integration for news types.

use crate::cache::Cacheable;

use super::types::Article;

impl Cacheable for Article {
  fn cache_key(&self) -> String {
    self.url.clone()
  }

  fn sort_key(&self) -> Option<&str> {
    // Normalised to UTC on the way in, so string order is time order.
    Some(&self.published_at)
  }
}
