//! Network-only search: debounced input, latest-wins queries and
//! single-flight paging. Nothing here touches the cache store.

mod debounce;
mod network_pager;
mod session;

pub use session::{FetcherFactory, QueryFetcher, SearchEvent, SearchSession};
