//! Query classification into needle (span) or summary retrieval.

use std::sync::Arc;

use crate::error::{ClaimtrailError, Result};
use crate::types::{QueryRoute, RouteDecision, RouteSource, TextGenerator};

const SUMMARY_KEYWORDS: &[&str] = &[
    "overview",
    "summary",
    "summarize",
    "summarise",
    "high-level",
    "high level",
    "timeline",
    "what happened overall",
    "from incident to resolution",
    "big picture",
    "in general",
];

const NEEDLE_KEYWORDS: &[&str] = &[
    "exact",
    "registration",
    "policy number",
    "reference number",
    "claim number",
    "driver name",
    "what time",
    "time did",
    "timestamp",
    "amount",
    "£",
    "section ",
];

const KEYWORD_CONFIDENCE: f32 = 0.8;
const DEFAULT_CONFIDENCE: f32 = 0.6;
const MODEL_CONFIDENCE: f32 = 0.9;

const ROUTING_INSTRUCTIONS: &str = "You route questions about a long structured document.\n\
Answer with exactly one word.\n\
'needle': the question asks for an exact value, identifier, time, amount or single fact.\n\
'summary': the question asks for an overview, explanation, timeline or summary.\n\
Do not answer the question itself.";

/// Decides which retriever answers a query.
pub trait QueryRouter: Send + Sync {
    fn classify(&self, query: &str) -> Result<RouteDecision>;
}

fn ensure_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ClaimtrailError::InvalidQuery {
            reason: "cannot route an empty query".into(),
        });
    }
    Ok(query)
}

/// Keyword rules: summary words win over needle words; anything else goes to summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedRouter;

impl RuleBasedRouter {
    fn decide(query: &str, source: RouteSource, raw_output: Option<String>) -> RouteDecision {
        let lowered = query.to_lowercase();
        let (route, confidence) = if SUMMARY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            (QueryRoute::Summary, KEYWORD_CONFIDENCE)
        } else if NEEDLE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            (QueryRoute::Needle, KEYWORD_CONFIDENCE)
        } else {
            (QueryRoute::Summary, DEFAULT_CONFIDENCE)
        };
        RouteDecision {
            route,
            source,
            confidence,
            raw_output,
        }
    }
}

impl QueryRouter for RuleBasedRouter {
    fn classify(&self, query: &str) -> Result<RouteDecision> {
        let query = ensure_query(query)?;
        Ok(Self::decide(query, RouteSource::Rules, None))
    }
}

/// Asks a text generator for a one-word route and falls back to the keyword rules
/// when the reply names both routes, neither, or the call fails.
pub struct ModelRouter {
    generator: Arc<dyn TextGenerator>,
}

impl ModelRouter {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

fn parse_route(output: &str) -> Option<QueryRoute> {
    let lowered = output.trim().to_lowercase();
    match (lowered.contains("summary"), lowered.contains("needle")) {
        (true, false) => Some(QueryRoute::Summary),
        (false, true) => Some(QueryRoute::Needle),
        _ => None,
    }
}

impl QueryRouter for ModelRouter {
    fn classify(&self, query: &str) -> Result<RouteDecision> {
        let query = ensure_query(query)?;
        let prompt = format!("{ROUTING_INSTRUCTIONS}\n\nQuestion:\n{query}\n\nRoute:");
        match self.generator.generate(&prompt, "") {
            Ok(output) => match parse_route(&output) {
                Some(route) => Ok(RouteDecision {
                    route,
                    source: RouteSource::Model,
                    confidence: MODEL_CONFIDENCE,
                    raw_output: Some(output),
                }),
                None => {
                    tracing::warn!(output = %output, "ambiguous routing output; using keyword rules");
                    Ok(RuleBasedRouter::decide(query, RouteSource::Fallback, Some(output)))
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "model routing failed; using keyword rules");
                Ok(RuleBasedRouter::decide(
                    query,
                    RouteSource::Fallback,
                    Some(err.to_string()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(std::result::Result<&'static str, &'static str>);

    impl TextGenerator for Fixed {
        fn generate(&self, _prompt: &str, _context: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|reason| ClaimtrailError::Generation {
                    reason: reason.into(),
                })
        }
    }

    #[test]
    fn rules_prefer_summary_keywords() {
        let router = RuleBasedRouter;
        let summary = router.classify("Give me a timeline of the claim").unwrap();
        assert_eq!(summary.route, QueryRoute::Summary);
        assert!((summary.confidence - 0.8).abs() < f32::EPSILON);

        let needle = router.classify("What is the registration of the van?").unwrap();
        assert_eq!(needle.route, QueryRoute::Needle);

        let both = router.classify("Summarize the amount paid").unwrap();
        assert_eq!(both.route, QueryRoute::Summary);

        let default = router.classify("Who was involved?").unwrap();
        assert_eq!(default.route, QueryRoute::Summary);
        assert!((default.confidence - 0.6).abs() < f32::EPSILON);
        assert_eq!(default.source, RouteSource::Rules);
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(matches!(
            RuleBasedRouter.classify("   "),
            Err(ClaimtrailError::InvalidQuery { .. })
        ));
        let router = ModelRouter::new(Arc::new(Fixed(Ok("needle"))));
        assert!(router.classify("").is_err());
    }

    #[test]
    fn model_reply_decides_when_unambiguous() {
        let router = ModelRouter::new(Arc::new(Fixed(Ok(" Needle\n"))));
        let decision = router.classify("Tell me about the claim").unwrap();
        assert_eq!(decision.route, QueryRoute::Needle);
        assert_eq!(decision.source, RouteSource::Model);
        assert!((decision.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn ambiguous_or_failed_model_falls_back_to_rules() {
        let router = ModelRouter::new(Arc::new(Fixed(Ok("needle or summary"))));
        let decision = router.classify("What is the policy number?").unwrap();
        assert_eq!(decision.route, QueryRoute::Needle);
        assert_eq!(decision.source, RouteSource::Fallback);

        let router = ModelRouter::new(Arc::new(Fixed(Err("rate limited"))));
        let decision = router.classify("Give an overview").unwrap();
        assert_eq!(decision.route, QueryRoute::Summary);
        assert_eq!(decision.source, RouteSource::Fallback);
        assert!(decision.raw_output.unwrap().contains("rate limited"));
    }
}
