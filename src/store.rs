//! Document metadata store.
//!
//! The [`MetadataStore`] trait is the only way the rest of the crate reads
//! or writes document records, so the backing format can change without
//! touching callers. Two implementations ship:
//!
//! - [`JsonFileStore`]: the whole mapping lives in memory and is rewritten
//!   to a single pretty-printed JSON file on every mutation. Writes go to a
//!   temporary file that is then renamed over the old one, so a reader never
//!   sees a half-written file. Suitable for hundreds of documents.
//! - [`InMemoryStore`]: no persistence; for tests and embedding.
//!
//! Mutations hold the write lock across the read-modify-write-persist
//! sequence, so concurrent uploads cannot lose each other's records.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DocumentError;
use crate::extract::DocumentFormat;
use crate::models::DocumentRecord;

/// Abstract storage for document records, keyed by document id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace a record. Durable once this returns.
    async fn put(&self, record: DocumentRecord) -> Result<(), DocumentError>;

    /// Fetch a record, or [`DocumentError::NotFound`].
    async fn get(&self, id: &str) -> Result<DocumentRecord, DocumentError>;

    /// Remove a record, returning it, or [`DocumentError::NotFound`].
    async fn delete(&self, id: &str) -> Result<DocumentRecord, DocumentError>;

    /// All records, oldest upload first (ties broken by id).
    async fn list(&self) -> Result<Vec<DocumentRecord>, DocumentError>;
}

fn sorted(mut records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    records.sort_by(|a, b| {
        a.uploaded_at
            .cmp(&b.uploaded_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

// ============ JSON file store ============

/// On-disk shape of one record; the id is the map key.
#[derive(Serialize, Deserialize)]
struct StoredDocument {
    filename: String,
    format: DocumentFormat,
    text: String,
    pages: Option<u32>,
    #[serde(default)]
    chunk_count: usize,
    #[serde(default)]
    size_bytes: usize,
    #[serde(default)]
    content_hash: String,
    uploaded_at: DateTime<Utc>,
}

impl StoredDocument {
    fn from_record(r: &DocumentRecord) -> Self {
        Self {
            filename: r.filename.clone(),
            format: r.format,
            text: r.text.clone(),
            pages: r.pages,
            chunk_count: r.chunk_count,
            size_bytes: r.size_bytes,
            content_hash: r.content_hash.clone(),
            uploaded_at: r.uploaded_at,
        }
    }

    fn into_record(self, id: String) -> DocumentRecord {
        DocumentRecord {
            id,
            filename: self.filename,
            format: self.format,
            text: self.text,
            pages: self.pages,
            chunk_count: self.chunk_count,
            size_bytes: self.size_bytes,
            content_hash: self.content_hash,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Metadata store persisted as one JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing records.
    ///
    /// A missing file gives an empty store. A file that cannot be parsed is
    /// logged and ignored (the store starts empty); it is overwritten by the
    /// next mutation. Other I/O failures are returned.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DocumentError::storage(parent, e))?;
            }
        }

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => parse_snapshot(&path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(DocumentError::storage(&path, e)),
        };
        tracing::info!(path = %path.display(), documents = records.len(), "metadata store loaded");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &HashMap<String, DocumentRecord>) -> Result<(), DocumentError> {
        let snapshot: BTreeMap<&str, StoredDocument> = records
            .iter()
            .map(|(id, r)| (id.as_str(), StoredDocument::from_record(r)))
            .collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(&self.path, &bytes).await
    }
}

fn parse_snapshot(path: &Path, bytes: &[u8]) -> HashMap<String, DocumentRecord> {
    match serde_json::from_slice::<HashMap<String, StoredDocument>>(bytes) {
        Ok(map) => map
            .into_iter()
            .map(|(id, doc)| (id.clone(), doc.into_record(id)))
            .collect(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "metadata file is unreadable, starting with an empty store"
            );
            HashMap::new()
        }
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| DocumentError::storage(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| DocumentError::storage(path, e))
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn put(&self, record: DocumentRecord) -> Result<(), DocumentError> {
        let mut records = self.records.write().await;
        let id = record.id.clone();
        let previous = records.insert(id.clone(), record);
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(prev) => records.insert(id, prev),
                None => records.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
        let mut records = self.records.write().await;
        let removed = records
            .remove(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        if let Err(e) = self.persist(&records).await {
            records.insert(id.to_string(), removed);
            return Err(e);
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, DocumentError> {
        Ok(sorted(self.records.read().await.values().cloned().collect()))
    }
}

// ============ In-memory store ============

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn put(&self, record: DocumentRecord) -> Result<(), DocumentError> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<DocumentRecord, DocumentError> {
        self.records
            .write()
            .await
            .remove(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, DocumentError> {
        Ok(sorted(self.records.read().await.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str, secs: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            format: DocumentFormat::Txt,
            text: format!("text of {}", id),
            pages: None,
            chunk_count: 1,
            size_bytes: 10,
            content_hash: "abc".to_string(),
            uploaded_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::open(tmp.path().join("documents.json"))
            .await
            .unwrap();

        store.put(record("a", 1)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().filename, "a.txt");

        store.delete("a").await.unwrap();
        assert!(matches!(
            store.get("a").await,
            Err(DocumentError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("a").await,
            Err(DocumentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("documents.json");
        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.put(record("a", 1)).await.unwrap();
            store.put(record("b", 2)).await.unwrap();
            store.delete("a").await.unwrap();
        }
        let store = JsonFileStore::open(&path).await.unwrap();
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(store.get("b").await.unwrap(), record("b", 2));
    }

    #[tokio::test]
    async fn file_is_a_readable_id_keyed_mapping() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("documents.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.put(record("doc-1", 1)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["doc-1"]["filename"], "doc-1.txt");
        assert_eq!(raw["doc-1"]["chunk_count"], 1);
        assert!(raw["doc-1"]["pages"].is_null());
        assert!(!tmp.path().join("documents.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("documents.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        store.put(record("a", 1)).await.unwrap();
        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_ordered_by_upload_time() {
        let store = InMemoryStore::new();
        store.put(record("late", 30)).await.unwrap();
        store.put(record("early", 10)).await.unwrap();
        store.put(record("middle", 20)).await.unwrap();
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn failed_persist_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let store = JsonFileStore::open(dir.join("documents.json")).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(
            store.put(record("a", 1)).await,
            Err(DocumentError::Storage { .. })
        ));
        assert!(matches!(
            store.get("a").await,
            Err(DocumentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_puts_are_not_lost() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("documents.json");
        let store = std::sync::Arc::new(JsonFileStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(record(&format!("doc{}", i), i)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap().len(), 16);
    }
}
