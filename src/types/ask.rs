use serde::{Deserialize, Serialize};

use super::search::{ContextItem, SummaryHit};
use crate::Result;

/// Retrieval path chosen for a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryRoute {
    /// Precise fact lookup over small spans with auto-merge.
    Needle,
    /// Broad question answered from summaries.
    #[default]
    Summary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Keyword rules.
    Rules,
    /// A text-generation model.
    Model,
    /// Model output was unusable; rules decided instead.
    Fallback,
}

/// Outcome of query classification. `confidence` is a heuristic weight, not a probability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteDecision {
    pub route: QueryRoute,
    pub source: RouteSource,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

/// Context gathered for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum RetrievedContext {
    Spans(Vec<ContextItem>),
    Summaries(Vec<SummaryHit>),
}

impl RetrievedContext {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Spans(items) => items.len(),
            Self::Summaries(hits) => hits.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numbered context blocks in rank order, ready for a generator prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let blocks: Vec<String> = match self {
            Self::Spans(items) => items
                .iter()
                .map(|item| {
                    format!(
                        "[{}] {} (positions {}-{})\n{}",
                        item.rank, item.section_id, item.first_position, item.last_position, item.text
                    )
                })
                .collect(),
            Self::Summaries(hits) => hits
                .iter()
                .map(|hit| {
                    let scope = hit
                        .summary
                        .section_id
                        .as_deref()
                        .unwrap_or(hit.summary.document_id.as_str());
                    format!(
                        "[{}] {} summary of {}\n{}",
                        hit.rank,
                        hit.summary.summary_level.as_str(),
                        scope,
                        hit.summary.text
                    )
                })
                .collect(),
        };
        blocks.join("\n\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AskStats {
    /// Time spent classifying the query in milliseconds.
    pub routing_ms: u128,
    /// Time spent retrieving context in milliseconds.
    pub retrieval_ms: u128,
    /// Time spent synthesizing the answer in milliseconds.
    pub synthesis_ms: u128,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u128,
}

/// Response for `ask` containing the route, retrieval context, answer and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub decision: RouteDecision,
    pub context: RetrievedContext,
    /// `None` when no generator is configured and context was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub stats: AskStats,
}

pub trait TextEmbedder: Send + Sync {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_chunks(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_query(text)?);
        }
        Ok(embeddings)
    }

    fn embedding_dimension(&self) -> usize;
}

/// Natural-language generation used for answers, summaries and model routing.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, context: &str) -> Result<String>;
}
