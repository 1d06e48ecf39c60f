//! Passage retrieval.
//!
//! The [`Retriever`] asks the [`IndexBackend`] for semantic hits first. When
//! the backend is the lexical fallback, holds no vectors, or fails at
//! runtime, it scans the metadata store instead:
//!
//! 1. The query is lowercased and split on whitespace; punctuation at the
//!    edges of each word is dropped (`"filter?"` → `"filter"`).
//! 2. A document matches when any query word is a substring of its
//!    lowercased text.
//! 3. Each match contributes one passage: the first
//!    `fallback_snippet_chars` characters of its text.
//! 4. Matches keep store order (oldest upload first) and are cut to `k`.
//!
//! There is no ranking in the lexical path beyond match / no match.

use std::sync::Arc;

use crate::error::DocumentError;
use crate::index::IndexBackend;
use crate::models::{DocumentRecord, Passage, RetrievalMode};
use crate::store::MetadataStore;

pub struct Retriever {
    store: Arc<dyn MetadataStore>,
    index: Arc<IndexBackend>,
    snippet_chars: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        index: Arc<IndexBackend>,
        snippet_chars: usize,
    ) -> Self {
        Self {
            store,
            index,
            snippet_chars,
        }
    }

    /// Top `k` passage texts for `query`, most relevant first.
    ///
    /// An empty result means no context was found; it is never an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, DocumentError> {
        Ok(self
            .retrieve_passages(query, k)
            .await?
            .into_iter()
            .map(|p| p.content)
            .collect())
    }

    /// Like [`Retriever::retrieve`], keeping provenance and scores.
    pub async fn retrieve_passages(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, DocumentError> {
        if k == 0 {
            return Err(DocumentError::InvalidArgument("k must be at least 1".into()));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let hits = self.index.search(query, k).await;
        if !hits.is_empty() {
            tracing::debug!(hits = hits.len(), "semantic retrieval");
            return Ok(hits);
        }

        let records = self.store.list().await?;
        let passages = lexical_scan(&records, query, k, self.snippet_chars);
        tracing::debug!(
            scanned = records.len(),
            hits = passages.len(),
            "lexical retrieval"
        );
        Ok(passages)
    }
}

/// Lowercased query words with surrounding punctuation removed.
pub fn query_words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Match/no-match scan over `records` in the order given.
pub fn lexical_scan(
    records: &[DocumentRecord],
    query: &str,
    k: usize,
    snippet_chars: usize,
) -> Vec<Passage> {
    let words = query_words(query);
    if words.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .filter(|r| {
            let text = r.text.to_lowercase();
            words.iter().any(|w| text.contains(w.as_str()))
        })
        .take(k)
        .map(|r| Passage {
            document_id: r.id.clone(),
            position: None,
            content: r.text.chars().take(snippet_chars).collect(),
            score: None,
            mode: RetrievalMode::Lexical,
        })
        .collect()
}
