//! In-memory similarity index over text documents.
//!
//! Documents are deduplicated by a SHA-256 fingerprint of their raw text and
//! ranked by cosine similarity of TF-IDF term vectors.
//!
//! Vectors are only valid for the vocabulary fitted at the last rebuild. Any
//! insertion or removal marks the index stale, and the next `search` refits
//! the whole corpus. A rebuild is O(corpus size); fine for the handful of
//! documents a research run ingests, not meant for large collections.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

pub const DEFAULT_DIMENSION: usize = 384;

/// Characters of content returned with each search match.
pub const PREVIEW_CHARS: usize = 500;

pub type Metadata = BTreeMap<String, String>;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub fingerprint: String,
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub id: String,
    pub score: f32,
    /// Content cut to `PREVIEW_CHARS`, with `...` appended when cut.
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub vector_count: usize,
    pub dimension: usize,
    pub is_fitted: bool,
}

/// Sparse term weights, sorted by term index.
#[derive(Debug, Clone, Default)]
struct TermVector(Vec<(usize, f32)>);

impl TermVector {
    fn dot(&self, other: &TermVector) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].0.cmp(&other.0[j].0) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    sum += self.0[i].1 * other.0[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    fn norm(&self) -> f32 {
        self.0.iter().map(|(_, w)| w * w).sum::<f32>().sqrt()
    }

    fn cosine(&self, other: &TermVector) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }
}

#[derive(Debug)]
pub struct SimilarityIndex {
    dimension: usize,
    documents: Vec<IndexedDocument>,
    fingerprints: HashSet<String>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    vectors: Vec<TermVector>,
    stale: bool,
    fitted: bool,
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl SimilarityIndex {
    /// `dimension` caps the vocabulary at the most frequent terms.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: Vec::new(),
            fingerprints: HashSet::new(),
            vocabulary: HashMap::new(),
            idf: Vec::new(),
            vectors: Vec::new(),
            stale: false,
            fitted: false,
        }
    }

    pub fn fingerprint(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Store a document. Returns false when identical content is already indexed.
    pub fn add_document(&mut self, id: &str, content: &str, metadata: Metadata) -> bool {
        let fingerprint = Self::fingerprint(content);
        if self.fingerprints.contains(&fingerprint) {
            info!("Document {} already exists, skipping", id);
            return false;
        }

        self.fingerprints.insert(fingerprint.clone());
        self.documents.push(IndexedDocument {
            fingerprint,
            id: id.to_string(),
            content: content.to_string(),
            metadata,
        });
        self.invalidate();
        debug!("Added document {} to similarity index", id);
        true
    }

    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(position) = self.documents.iter().position(|doc| doc.id == id) else {
            return false;
        };

        let removed = self.documents.remove(position);
        self.fingerprints.remove(&removed.fingerprint);
        self.invalidate();
        info!("Removed document {}", id);
        true
    }

    pub fn get_document(&self, id: &str) -> Option<&IndexedDocument> {
        self.documents.iter().find(|doc| doc.id == id)
    }

    /// Documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Top `top_k` documents by cosine similarity to `query`, best first.
    /// Equal scores keep insertion order.
    pub fn search(&mut self, query: &str, top_k: usize) -> Vec<SearchMatch> {
        if self.documents.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if self.stale {
            self.rebuild();
        }

        let query_vector = self.project(query);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, query_vector.cosine(vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| {
                let doc = &self.documents[i];
                SearchMatch {
                    id: doc.id.clone(),
                    score,
                    content: preview(&doc.content),
                    metadata: doc.metadata.clone(),
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.fingerprints.clear();
        self.vocabulary.clear();
        self.idf.clear();
        self.vectors.clear();
        self.stale = false;
        self.fitted = false;
        info!("Cleared similarity index");
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.documents.len(),
            vector_count: self.vectors.len(),
            dimension: self.dimension,
            is_fitted: self.fitted,
        }
    }

    fn invalidate(&mut self) {
        self.vectors.clear();
        self.stale = true;
        self.fitted = false;
    }

    /// Refit vocabulary and IDF on the full corpus and recompute every vector.
    fn rebuild(&mut self) {
        let tokenized: Vec<Vec<String>> = self
            .documents
            .iter()
            .map(|doc| tokenize(&doc.content))
            .collect();

        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            for token in tokens {
                *term_counts.entry(token.as_str()).or_insert(0) += 1;
            }
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.dimension);
        let mut terms: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort_unstable();

        let n = self.documents.len() as f32;
        self.idf = terms
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.to_string(), i))
            .collect();

        self.vectors = tokenized.iter().map(|tokens| self.weigh(tokens)).collect();
        self.stale = false;
        self.fitted = !self.documents.is_empty();
        debug!(
            "Rebuilt term vectors for {} documents over {} terms",
            self.documents.len(),
            self.vocabulary.len()
        );
    }

    fn project(&self, text: &str) -> TermVector {
        self.weigh(&tokenize(text))
    }

    /// L2-normalised TF-IDF weights for tokens in the fitted vocabulary.
    fn weigh(&self, tokens: &[String]) -> TermVector {
        let mut tf: BTreeMap<usize, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&index) = self.vocabulary.get(token) {
                *tf.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let weights: Vec<(usize, f32)> = tf
            .into_iter()
            .map(|(index, count)| (index, count * self.idf[index]))
            .collect();
        let norm = weights.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm == 0.0 {
            return TermVector(weights);
        }
        TermVector(weights.into_iter().map(|(i, w)| (i, w / norm)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 1 && !STOP_WORDS.contains(s))
        .map(String::from)
        .collect()
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}
