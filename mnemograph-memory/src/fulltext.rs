//! BM25 fulltext index
//!
//! In-memory inverted index over each memory's metadata values and
//! observation content. Maintained incrementally by the store.

use std::collections::{HashMap, HashSet};

use crate::graph::ScoredId;
use crate::node::MemoryId;

/// Per-document term statistics
#[derive(Debug, Default)]
struct Document {
    term_freqs: HashMap<String, usize>,
    length: usize,
}

/// BM25 index for text search
#[derive(Debug)]
pub struct FulltextIndex {
    /// Inverted index: term -> documents containing it
    inverted: HashMap<String, HashSet<MemoryId>>,
    documents: HashMap<MemoryId, Document>,
    total_length: usize,
    /// BM25 k1 parameter
    k1: f32,
    /// BM25 b parameter
    b: f32,
}

impl Default for FulltextIndex {
    fn default() -> Self {
        Self {
            inverted: HashMap::new(),
            documents: HashMap::new(),
            total_length: 0,
            k1: 1.2,
            b: 0.75,
        }
    }
}

impl FulltextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize text into terms
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() > 1)
            .map(String::from)
            .collect()
    }

    /// Index (or re-index) a document
    pub fn upsert(&mut self, id: MemoryId, text: &str) {
        self.remove(&id);

        let tokens = Self::tokenize(text);
        let mut doc = Document {
            length: tokens.len(),
            ..Default::default()
        };
        for token in tokens {
            *doc.term_freqs.entry(token).or_insert(0) += 1;
        }
        for term in doc.term_freqs.keys() {
            self.inverted.entry(term.clone()).or_default().insert(id);
        }
        self.total_length += doc.length;
        self.documents.insert(id, doc);
    }

    /// Drop a document
    pub fn remove(&mut self, id: &MemoryId) {
        let Some(doc) = self.documents.remove(id) else {
            return;
        };
        self.total_length -= doc.length;
        for term in doc.term_freqs.keys() {
            if let Some(postings) = self.inverted.get_mut(term) {
                postings.remove(id);
                if postings.is_empty() {
                    self.inverted.remove(term);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Search with BM25 scoring; ties broken by id
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredId> {
        let mut query_tokens = Self::tokenize(query);
        query_tokens.sort();
        query_tokens.dedup();

        let mut scores: HashMap<MemoryId, f32> = HashMap::new();
        for token in &query_tokens {
            let Some(postings) = self.inverted.get(token) else {
                continue;
            };
            let idf = self.idf(postings.len());
            for doc_id in postings {
                if let Some(doc) = self.documents.get(doc_id) {
                    let tf = doc.term_freqs.get(token).copied().unwrap_or(0) as f32;
                    *scores.entry(*doc_id).or_insert(0.0) +=
                        self.bm25_score(tf, doc.length as f32, idf);
                }
            }
        }

        let mut results: Vec<ScoredId> = scores
            .into_iter()
            .map(|(id, score)| ScoredId::new(id, score))
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);
        results
    }

    /// Calculate IDF
    fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.documents.len() as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Calculate BM25 score for a term
    fn bm25_score(&self, tf: f32, doc_length: f32, idf: f32) -> f32 {
        let avg = if self.documents.is_empty() {
            1.0
        } else {
            (self.total_length as f32 / self.documents.len() as f32).max(1.0)
        };
        let numerator = tf * (self.k1 + 1.0);
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * doc_length / avg);
        idf * numerator / denominator
    }
}
