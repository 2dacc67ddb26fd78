//! Query intent classification
//!
//! Pure and total: every string maps to exactly one intent.

use serde::Serialize;

/// What kind of search a query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// `*`, `all` or an empty query: summarize the graph
    Wildcard,
    /// No alphabetic characters (ids, ports, version numbers)
    ExactSearch,
    /// Natural language
    SemanticSearch,
}

/// Classified query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIntent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub normalized_query: String,
    /// Informative only; never used for ranking
    pub confidence: f32,
}

/// Classify a raw query string
pub fn classify(query: &str) -> QueryIntent {
    let normalized = query.trim();

    let (intent_type, confidence) =
        if normalized.is_empty() || normalized == "*" || normalized.eq_ignore_ascii_case("all") {
            (IntentType::Wildcard, 1.0)
        } else if !normalized.chars().any(char::is_alphabetic) {
            (IntentType::ExactSearch, 0.9)
        } else {
            (IntentType::SemanticSearch, 0.8)
        };

    QueryIntent {
        intent_type,
        normalized_query: normalized.to_string(),
        confidence,
    }
}
