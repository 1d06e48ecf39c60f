//! Embedding-backed vector index and the retrieval backend selector.
//!
//! [`VectorIndex`] keeps every chunk vector in memory and answers queries by
//! brute-force cosine similarity, which is plenty for a corpus of a few
//! hundred documents. After each mutation the whole index is written to a
//! JSON snapshot:
//!
//! ```json
//! { "model": "text-embedding-3-small", "dims": 1536,
//!   "chunks": [ { "document_id": "…", "position": 0, "content": "…",
//!                 "vector": "<base64 of little-endian f32>" } ] }
//! ```
//!
//! [`IndexBackend`] is chosen once at startup. `EmbeddingBacked` wraps a
//! working index; `LexicalFallback` is used when no provider is configured
//! or it could not be constructed. Runtime failures of the embedding-backed
//! variant are logged and reported as "nothing indexed" or "no hits", never
//! returned to callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::embedding::{
    blob_to_vec, cosine_similarity, create_embedding_provider, embed_query, vec_to_blob,
    EmbeddingProvider,
};
use crate::error::{DocumentError, ProviderError};
use crate::models::{Chunk, Passage, RetrievalMode};
use crate::store::write_atomic;

/// Internal index failures. Never surfaced past [`IndexBackend`].
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("embedding has {actual} dimensions, index expects {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("failed to persist vector index: {0}")]
    Persist(#[from] DocumentError),
}

/// A chunk hit with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub document_id: String,
    pub position: usize,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    document_id: String,
    position: usize,
    content: String,
    vector: Vec<f32>,
}

#[derive(Default)]
struct IndexState {
    dims: Option<usize>,
    entries: Vec<IndexedChunk>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    model: String,
    dims: usize,
    chunks: Vec<SnapshotChunk>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotChunk {
    document_id: String,
    position: usize,
    content: String,
    vector: String,
}

/// In-memory cosine index persisted as a JSON snapshot.
pub struct VectorIndex {
    path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Open the index at `path`, loading a previous snapshot if one exists.
    ///
    /// A snapshot built with a different model, or one that cannot be
    /// decoded, is discarded with a warning and the index starts empty.
    pub async fn open(
        path: impl Into<PathBuf>,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DocumentError::storage(parent, e))?;
            }
        }

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => load_snapshot(&path, &bytes, provider.as_ref()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexState::default(),
            Err(e) => return Err(DocumentError::storage(&path, e).into()),
        };
        tracing::info!(
            path = %path.display(),
            model = provider.model_name(),
            chunks = state.entries.len(),
            "vector index loaded"
        );

        Ok(Self {
            path,
            provider,
            batch_size: batch_size.max(1),
            state: RwLock::new(state),
        })
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Embed and add `chunks`, then persist the snapshot.
    ///
    /// Embedding happens before the index lock is taken, so concurrent
    /// uploads only serialize on the in-memory push and the file write.
    /// If persisting fails, the new entries are removed again.
    pub async fn insert(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            vectors.extend(self.provider.embed(&texts).await?);
        }
        if vectors.len() != chunks.len() {
            return Err(ProviderError::invalid(
                "embedding",
                format!("{} embeddings for {} chunks", vectors.len(), chunks.len()),
            )
            .into());
        }

        let mut state = self.state.write().await;
        let expected = state
            .dims
            .or_else(|| nonzero(self.provider.dims()))
            .unwrap_or_else(|| vectors.first().map(Vec::len).unwrap_or(0));
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected || v.is_empty()) {
            return Err(IndexError::Dimension {
                expected,
                actual: bad.len(),
            });
        }

        let before = state.entries.len();
        let had_dims = state.dims.is_some();
        state.dims = Some(expected);
        state
            .entries
            .extend(chunks.iter().zip(vectors).map(|(c, vector)| IndexedChunk {
                document_id: c.document_id.clone(),
                position: c.position,
                content: c.content.clone(),
                vector,
            }));

        if let Err(e) = self.persist(&state).await {
            state.entries.truncate(before);
            if !had_dims {
                state.dims = None;
            }
            return Err(e);
        }
        Ok(chunks.len())
    }

    /// Return up to `k` chunks ordered by descending similarity to `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.provider.as_ref(), query).await?;

        let state = self.state.read().await;
        if let Some(dims) = state.dims {
            if query_vec.len() != dims {
                return Err(IndexError::Dimension {
                    expected: dims,
                    actual: query_vec.len(),
                });
            }
        }

        let mut hits: Vec<ScoredChunk> = state
            .entries
            .iter()
            .map(|e| ScoredChunk {
                document_id: e.document_id.clone(),
                position: e.position,
                content: e.content.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Drop every vector belonging to `document_id`. Returns how many were removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize, IndexError> {
        let mut state = self.state.write().await;
        let before = state.entries.clone();
        state.entries.retain(|e| e.document_id != document_id);
        let removed = before.len() - state.entries.len();
        if removed == 0 {
            return Ok(0);
        }
        if let Err(e) = self.persist(&state).await {
            state.entries = before;
            return Err(e);
        }
        Ok(removed)
    }

    async fn persist(&self, state: &IndexState) -> Result<(), IndexError> {
        let snapshot = Snapshot {
            model: self.provider.model_name().to_string(),
            dims: state.dims.unwrap_or(0),
            chunks: state
                .entries
                .iter()
                .map(|e| SnapshotChunk {
                    document_id: e.document_id.clone(),
                    position: e.position,
                    content: e.content.clone(),
                    vector: STANDARD.encode(vec_to_blob(&e.vector)),
                })
                .collect(),
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(DocumentError::from)?;
        write_atomic(&self.path, &bytes).await?;
        Ok(())
    }
}

fn nonzero(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

fn load_snapshot(path: &Path, bytes: &[u8], provider: &dyn EmbeddingProvider) -> IndexState {
    let snapshot: Snapshot = match serde_json::from_slice(bytes) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "vector index snapshot is unreadable, starting empty");
            return IndexState::default();
        }
    };

    if snapshot.model != provider.model_name() {
        tracing::warn!(
            path = %path.display(),
            snapshot_model = %snapshot.model,
            model = provider.model_name(),
            "vector index was built with another model, starting empty"
        );
        return IndexState::default();
    }
    if let Some(dims) = nonzero(provider.dims()) {
        if snapshot.dims != 0 && snapshot.dims != dims {
            tracing::warn!(
                path = %path.display(),
                snapshot_dims = snapshot.dims,
                dims,
                "vector index dimensions differ from provider, starting empty"
            );
            return IndexState::default();
        }
    }

    let mut entries = Vec::with_capacity(snapshot.chunks.len());
    for chunk in snapshot.chunks {
        let vector = match STANDARD.decode(chunk.vector.as_bytes()) {
            Ok(blob) => blob_to_vec(&blob),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt vector in snapshot, starting empty");
                return IndexState::default();
            }
        };
        if vector.len() != snapshot.dims {
            tracing::warn!(path = %path.display(), "vector length disagrees with snapshot dims, starting empty");
            return IndexState::default();
        }
        entries.push(IndexedChunk {
            document_id: chunk.document_id,
            position: chunk.position,
            content: chunk.content,
            vector,
        });
    }

    IndexState {
        dims: nonzero(snapshot.dims),
        entries,
    }
}

// ============ Backend selection ============

/// Retrieval capability, fixed at startup.
pub enum IndexBackend {
    EmbeddingBacked(VectorIndex),
    LexicalFallback,
}

impl IndexBackend {
    /// Select the backend from configuration.
    ///
    /// Any failure to construct the provider or open the index selects
    /// [`IndexBackend::LexicalFallback`] with a warning.
    pub async fn from_config(config: &Config) -> Self {
        let provider = match create_embedding_provider(&config.embedding) {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::info!("embeddings disabled, using lexical retrieval");
                return Self::LexicalFallback;
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider unavailable, using lexical retrieval");
                return Self::LexicalFallback;
            }
        };

        match VectorIndex::open(
            config.storage.vector_index_path(),
            provider,
            config.embedding.batch_size,
        )
        .await
        {
            Ok(index) => Self::EmbeddingBacked(index),
            Err(e) => {
                tracing::warn!(error = %e, "vector index unavailable, using lexical retrieval");
                Self::LexicalFallback
            }
        }
    }

    pub fn mode(&self) -> RetrievalMode {
        match self {
            Self::EmbeddingBacked(_) => RetrievalMode::Semantic,
            Self::LexicalFallback => RetrievalMode::Lexical,
        }
    }

    /// Index `chunks`, returning how many were stored (0 when disabled or on failure).
    pub async fn insert(&self, chunks: &[Chunk]) -> usize {
        let Self::EmbeddingBacked(index) = self else {
            return 0;
        };
        match index.insert(chunks).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    document_id = chunks.first().map(|c| c.document_id.as_str()).unwrap_or(""),
                    error = %e,
                    "indexing failed, document stored without vectors"
                );
                0
            }
        }
    }

    /// Semantic passages for `query`; empty when disabled, empty, or failing.
    pub async fn search(&self, query: &str, k: usize) -> Vec<Passage> {
        let Self::EmbeddingBacked(index) = self else {
            return Vec::new();
        };
        match index.search(query, k).await {
            Ok(hits) => hits
                .into_iter()
                .map(|h| Passage {
                    document_id: h.document_id,
                    position: Some(h.position),
                    content: h.content,
                    score: Some(h.score),
                    mode: RetrievalMode::Semantic,
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed, falling back to lexical scan");
                Vec::new()
            }
        }
    }

    /// Best-effort removal of a document's vectors.
    pub async fn remove_document(&self, document_id: &str) {
        if let Self::EmbeddingBacked(index) = self {
            match index.remove_document(document_id).await {
                Ok(n) if n > 0 => {
                    tracing::debug!(document_id, removed = n, "removed document vectors")
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(document_id, error = %e, "failed to remove document vectors")
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        match self {
            Self::EmbeddingBacked(index) => index.len().await,
            Self::LexicalFallback => 0,
        }
    }
}
