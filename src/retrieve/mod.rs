//! Query-time retrieval: auto-merging needle search and summary search.

mod auto_merge;
pub mod merge;
pub mod rerank;
mod summary;

pub use auto_merge::AutoMergeRetriever;
pub use merge::merge_adjacent;
pub use rerank::{promote_section, promote_time_matches};
pub use summary::SummaryRetriever;

use std::sync::Arc;

use chrono::TimeDelta;

use crate::deadline::Deadline;
use crate::error::{ClaimtrailError, Result};
use crate::types::{RetrievalRequest, TextEmbedder};

fn ensure_query(request: &RetrievalRequest) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(ClaimtrailError::InvalidQuery {
            reason: "query is empty".into(),
        });
    }
    if request.top_k == 0 {
        return Err(ClaimtrailError::InvalidQuery {
            reason: "top_k must be positive".into(),
        });
    }
    Ok(())
}

fn embed_query(
    embedder: &Arc<dyn TextEmbedder>,
    query: &str,
    deadline: &Deadline,
) -> Result<Vec<f32>> {
    let embedder = Arc::clone(embedder);
    let query = query.to_string();
    deadline.run("embed_query", move || embedder.embed_query(&query))
}

fn tolerance(seconds: u64) -> TimeDelta {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
