//! Question answering over indexed spans and summaries.

use std::sync::Arc;
use std::time::Instant;

use crate::constants::INSUFFICIENT_INFORMATION;
use crate::error::Result;
use crate::retrieve::{AutoMergeRetriever, SummaryRetriever};
use crate::router::QueryRouter;
use crate::temporal::{PatternTimestampExtractor, TimestampExtractor};
use crate::types::{
    Answer, AskStats, QueryRoute, RetrievalRequest, RetrievedContext, SectionHint, TextGenerator,
    TimeHint,
};

const ANSWER_PROMPT: &str = "Answer the question using only the numbered context blocks. \
If they do not contain the answer, say that the document does not contain enough information.";

/// Routes a question, retrieves context and, when a generator is configured, answers it.
///
/// Summary-routed questions use span retrieval when no summary retriever is set.
pub struct QueryEngine {
    router: Arc<dyn QueryRouter>,
    spans: AutoMergeRetriever,
    summaries: Option<SummaryRetriever>,
    generator: Option<Arc<dyn TextGenerator>>,
    extractor: Arc<dyn TimestampExtractor>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(router: Arc<dyn QueryRouter>, spans: AutoMergeRetriever) -> Self {
        Self {
            router,
            spans,
            summaries: None,
            generator: None,
            extractor: Arc::new(PatternTimestampExtractor::new()),
        }
    }

    #[must_use]
    pub fn with_summaries(mut self, summaries: SummaryRetriever) -> Self {
        self.summaries = Some(summaries);
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_timestamp_extractor(mut self, extractor: Arc<dyn TimestampExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// The request `ask` would send for `query`, with hints extracted from its text.
    #[must_use]
    pub fn request_for(&self, query: &str) -> RetrievalRequest {
        let mut request = RetrievalRequest::new(query, self.spans.config().top_k)
            .with_section_hint(SectionHint::from_query(query));
        if let Some(hint) = TimeHint::from_query(query, self.extractor.as_ref()) {
            request = request.with_time_hint(hint);
        }
        request
    }

    #[tracing::instrument(skip(self))]
    pub fn ask(&self, query: &str) -> Result<Answer> {
        let total_start = Instant::now();

        let routing_start = Instant::now();
        let decision = self.router.classify(query)?;
        let routing_ms = routing_start.elapsed().as_millis();
        tracing::debug!(route = ?decision.route, source = ?decision.source, "routed query");

        let request = self.request_for(query);
        let retrieval_start = Instant::now();
        let context = match (decision.route, &self.summaries) {
            (QueryRoute::Summary, Some(summaries)) => {
                RetrievedContext::Summaries(summaries.retrieve(&request)?)
            }
            (QueryRoute::Summary, None) => {
                tracing::debug!("no summary retriever configured; using span retrieval");
                RetrievedContext::Spans(self.spans.retrieve(&request)?)
            }
            (QueryRoute::Needle, _) => RetrievedContext::Spans(self.spans.retrieve(&request)?),
        };
        let retrieval_ms = retrieval_start.elapsed().as_millis();

        let synthesis_start = Instant::now();
        let answer = if context.is_empty() {
            tracing::debug!("no relevant context; answering with insufficient information");
            Some(INSUFFICIENT_INFORMATION.to_string())
        } else if let Some(generator) = &self.generator {
            let prompt = format!("{ANSWER_PROMPT}\n\nQuestion: {}", query.trim());
            Some(generator.generate(&prompt, &context.render())?)
        } else {
            None
        };
        let synthesis_ms = synthesis_start.elapsed().as_millis();

        Ok(Answer {
            question: query.to_string(),
            decision,
            context,
            answer,
            stats: AskStats {
                routing_ms,
                retrieval_ms,
                synthesis_ms,
                latency_ms: total_start.elapsed().as_millis(),
            },
        })
    }
}
