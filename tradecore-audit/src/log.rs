use crate::error::AuditError;
use crate::record::{AuditRecord, NewAuditRecord, GENESIS_HASH};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::error;

/// Append-only, hash-chained event stream (§4.K). Implementors guarantee a
/// single writer per stream at a time (serialized appends) and snapshot
/// reads for everything else.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append `record` to `stream`, chaining it from the stream's current
    /// tip hash (or [`GENESIS_HASH`] if the stream is empty).
    async fn append(&self, stream: &str, record: NewAuditRecord) -> Result<AuditRecord, AuditError>;

    /// Return every record on `stream`, oldest first.
    async fn records(&self, stream: &str) -> Vec<AuditRecord>;

    /// Walk `stream` from genesis, recomputing each record's hash and
    /// checking `prev_hash` linkage. Returns the first broken link found
    /// (§7: "audit verifications return the first broken link"), `Ok(())`
    /// if the chain is intact.
    async fn verify(&self, stream: &str) -> Result<(), AuditError> {
        let records = self.records(stream).await;
        let mut expected_prev = GENESIS_HASH.to_string();
        for (index, record) in records.iter().enumerate() {
            if record.prev_hash != expected_prev {
                return Err(AuditError::BrokenChain {
                    stream: stream.to_string(),
                    index,
                    expected: expected_prev,
                    found: record.prev_hash.clone(),
                });
            }
            if record.recomputed_hash() != record.hash {
                return Err(AuditError::TamperedRecord { stream: stream.to_string(), index });
            }
            expected_prev = record.hash.clone();
        }
        Ok(())
    }
}

/// Per-stream vector of records behind its own lock, keyed by a top-level
/// map lock — the same single-flight-map idiom `tradecore-data`'s hub uses
/// for its in-flight fetch slots, applied here to serialize appends within
/// a stream without serializing unrelated streams against each other.
#[derive(Default)]
pub struct InMemoryAuditLog {
    streams: AsyncMutex<HashMap<String, Arc<AsyncMutex<Vec<AuditRecord>>>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn stream_lock(&self, stream: &str) -> Arc<AsyncMutex<Vec<AuditRecord>>> {
        self.streams
            .lock()
            .await
            .entry(stream.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, stream: &str, record: NewAuditRecord) -> Result<AuditRecord, AuditError> {
        let lock = self.stream_lock(stream).await;
        let mut records = lock.lock().await;
        let prev_hash = records.last().map(|r| r.hash.clone()).unwrap_or_else(|| GENESIS_HASH.to_string());
        let appended = AuditRecord::next(&prev_hash, Utc::now(), record);
        records.push(appended.clone());
        Ok(appended)
    }

    async fn records(&self, stream: &str) -> Vec<AuditRecord> {
        let lock = self.stream_lock(stream).await;
        lock.lock().await.clone()
    }
}

/// Durable JSONL-backed log: one line per `(stream, record)`, appended and
/// `fsync`-ed before `append` returns (§5: "Audit Log appends
/// (fsync-serialized)"). An in-memory mirror, rebuilt from the file at
/// [`FileAuditLog::open`], serves reads without re-scanning disk.
pub struct FileAuditLog {
    path: PathBuf,
    write_lock: AsyncMutex<()>,
    mirror: AsyncMutex<HashMap<String, Vec<AuditRecord>>>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Line {
    stream: String,
    record: AuditRecord,
}

impl FileAuditLog {
    /// Open (creating if absent) the JSONL file at `path` and replay it
    /// into the in-memory mirror.
    pub async fn open(path: PathBuf) -> Result<Self, AuditError> {
        let mirror = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            let mut mirror: HashMap<String, Vec<AuditRecord>> = HashMap::new();
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let parsed: Line = serde_json::from_str(line)?;
                mirror.entry(parsed.stream).or_default().push(parsed.record);
            }
            mirror
        } else {
            tokio::fs::File::create(&path).await?;
            HashMap::new()
        };
        Ok(Self {
            path,
            write_lock: AsyncMutex::new(()),
            mirror: AsyncMutex::new(mirror),
        })
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn append(&self, stream: &str, record: NewAuditRecord) -> Result<AuditRecord, AuditError> {
        let _guard = self.write_lock.lock().await;
        let mut mirror = self.mirror.lock().await;
        let existing = mirror.entry(stream.to_string()).or_default();
        let prev_hash = existing.last().map(|r| r.hash.clone()).unwrap_or_else(|| GENESIS_HASH.to_string());
        let appended = AuditRecord::next(&prev_hash, Utc::now(), record);

        let line = serde_json::to_string(&Line { stream: stream.to_string(), record: appended.clone() })?;
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&self.path).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        if let Err(err) = file.sync_data().await {
            error!(%err, "audit log fsync failed");
            return Err(AuditError::Io(err));
        }

        existing.push(appended.clone());
        Ok(appended)
    }

    async fn records(&self, stream: &str) -> Vec<AuditRecord> {
        self.mirror.lock().await.get(stream).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_log_chains_records_on_the_same_stream() {
        let log = InMemoryAuditLog::new();
        log.append("portfolio-1", NewAuditRecord::new("system", "apply_fill", "portfolio", "portfolio-1")).await.unwrap();
        log.append("portfolio-1", NewAuditRecord::new("system", "apply_fill", "portfolio", "portfolio-1")).await.unwrap();
        let records = log.records("portfolio-1").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].prev_hash, records[0].hash);
        assert!(log.verify("portfolio-1").await.is_ok());
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let log = InMemoryAuditLog::new();
        log.append("p-1", NewAuditRecord::new("system", "create", "order", "o-1").with_new_values(json!({"qty": 10}))).await.unwrap();
        {
            let lock = log.stream_lock("p-1").await;
            let mut records = lock.lock().await;
            records[0].new_values = Some(json!({"qty": 999}));
        }
        let err = log.verify("p-1").await.unwrap_err();
        assert!(matches!(err, AuditError::TamperedRecord { .. }));
    }

    #[tokio::test]
    async fn verify_detects_broken_prev_hash_link() {
        let log = InMemoryAuditLog::new();
        log.append("p-1", NewAuditRecord::new("system", "create", "order", "o-1")).await.unwrap();
        log.append("p-1", NewAuditRecord::new("system", "fill", "order", "o-1")).await.unwrap();
        {
            let lock = log.stream_lock("p-1").await;
            let mut records = lock.lock().await;
            records[1].prev_hash = "deadbeef".to_string();
        }
        let err = log.verify("p-1").await.unwrap_err();
        assert!(matches!(err, AuditError::BrokenChain { .. }));
    }

    #[tokio::test]
    async fn file_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = FileAuditLog::open(path.clone()).await.unwrap();
            log.append("p-1", NewAuditRecord::new("system", "create", "order", "o-1")).await.unwrap();
            log.append("p-1", NewAuditRecord::new("system", "fill", "order", "o-1")).await.unwrap();
        }
        let reopened = FileAuditLog::open(path).await.unwrap();
        let records = reopened.records("p-1").await;
        assert_eq!(records.len(), 2);
        assert!(reopened.verify("p-1").await.is_ok());
    }
}
