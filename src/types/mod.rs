//! Public types exposed by the `claimtrail-core` crate.

pub mod ask;
pub mod options;
pub mod search;
pub mod span;
pub mod summary;

pub use ask::{
    Answer, AskStats, QueryRoute, RetrievedContext, RouteDecision, RouteSource, TextEmbedder,
    TextGenerator,
};
pub use options::{ChunkingConfig, EngineConfig, EngineConfigBuilder, RetrievalConfig};
pub use search::{ContextItem, RetrievalRequest, SectionHint, SummaryHit, TimeHint};
pub use span::{ChunkRecord, Span, SpanLevel, span_id};
pub use summary::{Summary, SummaryLevel};
