use thiserror::Error;

/// `ErrIntegrity` from §7: audit-chain verification failed. Fatal for the
/// affected stream; manual intervention required.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit chain broken on stream {stream} at index {index}: expected prev_hash {expected}, found {found}")]
    BrokenChain {
        stream: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("audit record at index {index} on stream {stream} has been tampered with: hash mismatch")]
    TamperedRecord { stream: String, index: usize },

    #[error("audit log i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit log manifest corrupt: {0}")]
    Codec(#[from] serde_json::Error),
}
