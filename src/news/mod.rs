pub mod api_types;
mod cache;
pub mod client;
pub mod feeds;
pub mod types;

pub use client::{HeadlineFilter, NewsClient, SearchFilter};
pub use feeds::{HeadlinesFetcher, SearchFetcher};
pub use types::Article;
