//! News trend lookups.
pub mod fetcher;

pub use fetcher::{Article, NewsClient, NewsResponse, TrendsQuery};
