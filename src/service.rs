//! Document service: the upload, delete, list and retrieval entry points.
//!
//! # Upload pipeline
//!
//! ```text
//! bytes ─▶ size check ─▶ format check ─▶ extract ─▶ chunk ─▶ index ─▶ store
//! ```
//!
//! Size, format and extraction failures abort the upload before anything is
//! written. Indexing never aborts an upload: when the backend is lexical or
//! the embedding call fails, the record is stored with `chunk_count = 0`.
//! A failed metadata write is returned to the caller and any vectors already
//! indexed for the new id are removed again.
//!
//! Extraction and embedding run outside every lock, so independent uploads
//! proceed concurrently and only serialize on the final store and index
//! writes.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::error::DocumentError;
use crate::extract::{detect_format, extract_blocking};
use crate::index::IndexBackend;
use crate::models::{DocumentRecord, DocumentSummary, Passage, UploadSummary};
use crate::search::Retriever;
use crate::store::{JsonFileStore, MetadataStore};

pub struct DocumentService {
    store: Arc<dyn MetadataStore>,
    index: Arc<IndexBackend>,
    retriever: Retriever,
    chunking: ChunkingConfig,
    max_upload_bytes: usize,
    default_top_k: usize,
}

impl DocumentService {
    /// Open the on-disk store and select the index backend from `config`.
    pub async fn open(config: &Config) -> Result<Self, DocumentError> {
        let store = JsonFileStore::open(config.storage.documents_path()).await?;
        let index = IndexBackend::from_config(config).await;
        Ok(Self::new(Arc::new(store), Arc::new(index), config))
    }

    /// Assemble a service from explicit parts.
    pub fn new(store: Arc<dyn MetadataStore>, index: Arc<IndexBackend>, config: &Config) -> Self {
        let retriever = Retriever::new(
            store.clone(),
            index.clone(),
            config.retrieval.fallback_snippet_chars,
        );
        Self {
            store,
            index,
            retriever,
            chunking: config.chunking.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
            default_top_k: config.retrieval.top_k,
        }
    }

    pub fn index(&self) -> &IndexBackend {
        &self.index
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Extract, chunk, index and store a file.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadSummary, DocumentError> {
        if bytes.len() > self.max_upload_bytes {
            return Err(DocumentError::TooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }
        let format = detect_format(filename)?;

        let size_bytes = bytes.len();
        let content_hash = hex::encode(Sha256::digest(&bytes));
        let extracted = extract_blocking(bytes, format).await?;

        if let Some(existing) = self.find_by_hash(&content_hash).await? {
            tracing::info!(
                filename,
                existing_id = %existing,
                "identical content already uploaded, storing as a new document"
            );
        }

        let id = Uuid::new_v4().to_string();
        let chunks = chunk_text(
            &id,
            &extracted.text,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        );
        let chunk_count = self.index.insert(&chunks).await;

        let record = DocumentRecord {
            id: id.clone(),
            filename: filename.to_string(),
            format,
            text: extracted.text,
            pages: extracted.pages,
            chunk_count,
            size_bytes,
            content_hash,
            uploaded_at: Utc::now(),
        };
        let summary = UploadSummary {
            id: id.clone(),
            filename: record.filename.clone(),
            pages: record.pages,
            chunk_count,
            total_chars: record.text.chars().count(),
        };

        if let Err(e) = self.store.put(record).await {
            tracing::error!(document_id = %id, error = %e, "failed to store document");
            self.index.remove_document(&id).await;
            return Err(e);
        }

        tracing::info!(
            document_id = %id,
            filename,
            format = format.as_str(),
            pages = ?summary.pages,
            chunks = chunk_count,
            chars = summary.total_chars,
            "document uploaded"
        );
        Ok(summary)
    }

    /// Upload a file from disk. The extension is checked before the file is read.
    pub async fn upload_path(&self, path: &Path) -> Result<UploadSummary, DocumentError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        detect_format(&filename)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DocumentError::storage(path, e))?;
        self.upload(bytes, &filename).await
    }

    /// Remove a document and, best effort, its vectors.
    pub async fn delete(&self, id: &str) -> Result<(), DocumentError> {
        let removed = self.store.delete(id).await?;
        self.index.remove_document(id).await;
        tracing::info!(document_id = %id, filename = %removed.filename, "document deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<DocumentSummary>, DocumentError> {
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .map(DocumentRecord::summary)
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
        self.store.get(id).await
    }

    pub async fn get_text(&self, id: &str) -> Result<String, DocumentError> {
        Ok(self.store.get(id).await?.text)
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, DocumentError> {
        self.retriever.retrieve(query, k).await
    }

    pub async fn retrieve_passages(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, DocumentError> {
        self.retriever.retrieve_passages(query, k).await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<String>, DocumentError> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .find(|r| r.content_hash == hash)
            .map(|r| r.id))
    }
}
