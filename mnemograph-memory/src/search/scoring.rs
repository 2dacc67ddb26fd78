//! Candidate aggregation and composite scoring
//!
//! Pure functions: channel outputs and materialized records in, ranked
//! candidates out. Nothing here touches the store.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::{MemoryError, Result};
use crate::graph::ScoredId;
use crate::node::{MemoryId, MemoryRecord};

use super::metadata::MetadataHits;
use super::tags::{TagHit, TagMatchMode};

/// Per-signal weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub vector: f32,
    pub exact: f32,
    pub fulltext: f32,
    pub tags: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            vector: 0.5,
            exact: 0.25,
            fulltext: 0.15,
            tags: 0.10,
        }
    }
}

impl ScoringWeights {
    fn all(&self) -> [f32; 4] {
        [self.vector, self.exact, self.fulltext, self.tags]
    }
}

/// Bonuses computed from the materialized record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringBonuses {
    /// Name equals the query (case-insensitive)
    pub name_exact: f32,
    /// Name contains the query (case-insensitive)
    pub name_contains: f32,
    /// Per observation containing the query
    pub observation: f32,
    /// Cap on the summed observation bonus
    pub observation_cap: f32,
}

impl Default for ScoringBonuses {
    fn default() -> Self {
        Self {
            name_exact: 0.2,
            name_contains: 0.1,
            observation: 0.05,
            observation_cap: 0.15,
        }
    }
}

impl ScoringBonuses {
    fn all(&self) -> [f32; 4] {
        [
            self.name_exact,
            self.name_contains,
            self.observation,
            self.observation_cap,
        ]
    }
}

/// Check that weights and bonuses are finite and non-negative
pub(crate) fn validate_weights(weights: &ScoringWeights, bonuses: &ScoringBonuses) -> Result<()> {
    let valid = |v: &f32| v.is_finite() && *v >= 0.0;
    if !weights.all().iter().all(valid) {
        return Err(MemoryError::invalid_argument(
            "scoring weights must be finite and non-negative",
        ));
    }
    if !bonuses.all().iter().all(valid) {
        return Err(MemoryError::invalid_argument(
            "scoring bonuses must be finite and non-negative",
        ));
    }
    Ok(())
}

/// Why a result matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Exact metadata, fulltext or keyword tag hit
    Exact,
    /// Only similarity signals
    Semantic,
}

/// Everything the channels returned for one request
#[derive(Debug, Clone, Default)]
pub struct ChannelOutputs {
    pub vector: Vec<ScoredId>,
    pub metadata: MetadataHits,
    pub tags: Vec<TagHit>,
}

/// Merged per-memory signals
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub id: MemoryId,
    /// Name similarity from the vector channel
    pub vector: Option<f32>,
    pub exact: bool,
    /// Raw fulltext relevance
    pub fulltext: Option<f32>,
    pub tag: Option<(TagMatchMode, f32)>,
    pub score: f32,
    pub match_type: MatchType,
}

impl SearchCandidate {
    fn new(id: MemoryId) -> Self {
        Self {
            id,
            vector: None,
            exact: false,
            fulltext: None,
            tag: None,
            score: 0.0,
            match_type: MatchType::Semantic,
        }
    }

    fn is_exact_match(&self) -> bool {
        self.exact
            || self.fulltext.is_some()
            || matches!(self.tag, Some((TagMatchMode::Keyword, _)))
    }

    /// Σ weight × signal strength
    pub fn base_score(&self, weights: &ScoringWeights) -> f32 {
        let mut score = 0.0;
        if let Some(similarity) = self.vector {
            score += weights.vector * unit(similarity);
        }
        if self.exact {
            score += weights.exact;
        }
        if self.fulltext.is_some() {
            score += weights.fulltext;
        }
        match self.tag {
            Some((TagMatchMode::Keyword, _)) => score += weights.tags,
            Some((TagMatchMode::Semantic, similarity)) => score += weights.tags * unit(similarity),
            None => {}
        }
        score
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Merge channel outputs into one candidate per memory, in id order
pub fn merge(outputs: &ChannelOutputs) -> Vec<SearchCandidate> {
    let mut candidates: BTreeMap<MemoryId, SearchCandidate> = BTreeMap::new();

    for hit in &outputs.vector {
        let candidate = candidates
            .entry(hit.id)
            .or_insert_with(|| SearchCandidate::new(hit.id));
        candidate.vector = Some(candidate.vector.map_or(hit.score, |s| s.max(hit.score)));
    }
    for id in &outputs.metadata.exact {
        candidates
            .entry(*id)
            .or_insert_with(|| SearchCandidate::new(*id))
            .exact = true;
    }
    for hit in &outputs.metadata.fulltext {
        let candidate = candidates
            .entry(hit.id)
            .or_insert_with(|| SearchCandidate::new(hit.id));
        candidate.fulltext = Some(candidate.fulltext.map_or(hit.score, |s| s.max(hit.score)));
    }
    for hit in &outputs.tags {
        candidates
            .entry(hit.id)
            .or_insert_with(|| SearchCandidate::new(hit.id))
            .tag = Some((hit.mode, hit.score));
    }

    candidates
        .into_values()
        .map(|mut candidate| {
            candidate.match_type = if candidate.is_exact_match() {
                MatchType::Exact
            } else {
                MatchType::Semantic
            };
            candidate
        })
        .collect()
}

/// Name and observation bonuses for `record` against the normalized query
pub fn record_bonus(record: &MemoryRecord, query: &str, bonuses: &ScoringBonuses) -> f32 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }

    let name = record.name.to_lowercase();
    let name_bonus = if name == query {
        bonuses.name_exact
    } else if name.contains(&query) {
        bonuses.name_contains
    } else {
        0.0
    };

    let containing = record
        .observations
        .iter()
        .filter(|o| o.content.to_lowercase().contains(&query))
        .count();
    let observation_bonus = (containing as f32 * bonuses.observation).min(bonuses.observation_cap);

    name_bonus + observation_bonus
}

/// Score, threshold, sort and truncate
///
/// Candidates without a materialized record are dropped. A non-finite score
/// is a pipeline failure.
pub fn rank(
    candidates: Vec<SearchCandidate>,
    records: &HashMap<MemoryId, MemoryRecord>,
    query: &str,
    weights: &ScoringWeights,
    bonuses: &ScoringBonuses,
    threshold: f32,
    limit: usize,
) -> Result<Vec<SearchCandidate>> {
    let mut ranked = Vec::with_capacity(candidates.len());

    for mut candidate in candidates {
        let Some(record) = records.get(&candidate.id) else {
            log::debug!("Candidate {} vanished before ranking", candidate.id);
            continue;
        };
        let raw = candidate.base_score(weights) + record_bonus(record, query, bonuses);
        if !raw.is_finite() {
            return Err(MemoryError::pipeline(format!(
                "non-finite score for candidate {}",
                candidate.id
            )));
        }
        candidate.score = raw.clamp(0.0, 1.0);
        if candidate.score >= threshold {
            ranked.push(candidate);
        }
    }

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    Ok(ranked)
}
