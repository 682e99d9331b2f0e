//! Search API client
//!
//! Counts pull requests per agent through the code-hosting search API
//! (`GET /search/issues`). Only `total_count` is needed, so every query asks
//! for a single one-item page: the count is exact on the first page even
//! though result listings are capped.
//!
//! ## Failure handling
//!
//! - Rate-limit responses (403 with exhausted quota, any 429) sleep until the
//!   advertised reset and then retry
//! - 5xx, timeouts, and connection errors retry with exponential backoff
//! - Once the retry budget is spent the fetch fails with
//!   [`Error::TransientFetch`](crate::Error::TransientFetch) and the pipeline
//!   keeps the agent's previous data

mod client;

pub use client::{BlockingSearchClient, SearchClient, SearchResponse};

use crate::agents::AgentMeta;
use crate::error::Result;
use crate::types::AgentCounts;

/// Source of per-agent PR counts.
///
/// The pipeline only depends on this trait, so tests can substitute a
/// canned implementation for the HTTP client.
pub trait PrCounter {
    /// Fetch total and merged counts for one agent.
    fn fetch(&self, agent: &AgentMeta) -> Result<AgentCounts>;
}
