//! Core data models used throughout AutoQuery.
//!
//! These types represent the documents, chunks, and passages that flow
//! through the upload and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::DocumentFormat;

/// An uploaded document as held by the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub text: String,
    pub pages: Option<u32>,
    pub chunk_count: usize,
    pub size_bytes: usize,
    /// SHA-256 hex digest of the uploaded bytes.
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            format: self.format,
            pages: self.pages,
            chunk_count: self.chunk_count,
            total_chars: self.text.chars().count(),
            size_bytes: self.size_bytes,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Document metadata without the body text, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub pages: Option<u32>,
    pub chunk_count: usize,
    pub total_chars: usize,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub id: String,
    pub filename: String,
    pub pages: Option<u32>,
    pub chunk_count: usize,
    pub total_chars: usize,
}

/// A contiguous slice of a document's text, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: String,
    /// Ordinal within the document's chunk sequence, starting at 0.
    pub position: usize,
    pub content: String,
    /// Byte offset of `content` within the document text.
    pub start: usize,
}

/// How a passage was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Semantic,
    Lexical,
}

/// A retrieved passage with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub document_id: String,
    /// Chunk position for semantic hits; lexical hits are whole-document prefixes.
    pub position: Option<usize>,
    pub content: String,
    /// Cosine similarity for semantic hits.
    pub score: Option<f32>,
    pub mode: RetrievalMode,
}
