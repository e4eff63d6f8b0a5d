use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The hash chain's root: the `prev_hash` of the first record on any stream.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000";

/// An append-only, hash-chained record of a mutating operation on a
/// Portfolio, Order, RiskLimit or Predictor (§3/§4.K). `hash` is computed
/// over `prev_hash` and the canonical JSON encoding of every other field,
/// so any record's integrity can be re-derived from its neighbours alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub prev_values: Option<Value>,
    pub new_values: Option<Value>,
    pub prev_hash: String,
    pub hash: String,
}

/// Everything needed to append a new [`AuditRecord`]; the stream supplies
/// `ts`, `prev_hash` and the resulting `hash`.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub prev_values: Option<Value>,
    pub new_values: Option<Value>,
}

impl NewAuditRecord {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            prev_values: None,
            new_values: None,
        }
    }

    pub fn with_prev_values(mut self, value: Value) -> Self {
        self.prev_values = Some(value);
        self
    }

    pub fn with_new_values(mut self, value: Value) -> Self {
        self.new_values = Some(value);
        self
    }
}

/// The subset of [`AuditRecord`] fields that feed the hash, serialized with
/// a fixed field order (struct field order, not a sorted map) so the
/// encoding is deterministic independent of `serde_json`'s map ordering.
#[derive(Serialize)]
struct HashPayload<'a> {
    ts: &'a DateTime<Utc>,
    actor: &'a str,
    action: &'a str,
    resource_type: &'a str,
    resource_id: &'a str,
    prev_values: &'a Option<Value>,
    new_values: &'a Option<Value>,
    prev_hash: &'a str,
}

/// `hash = H(prev_hash || canonical_json(record\{hash}))` (§3).
pub fn compute_hash(
    prev_hash: &str,
    ts: DateTime<Utc>,
    actor: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    prev_values: &Option<Value>,
    new_values: &Option<Value>,
) -> String {
    let payload = HashPayload {
        ts: &ts,
        actor,
        action,
        resource_type,
        resource_id,
        prev_values,
        new_values,
        prev_hash,
    };
    let canonical = serde_json::to_vec(&payload).expect("HashPayload always serializes");
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

impl AuditRecord {
    /// Build the next record on a chain whose current tip hash is `prev_hash`.
    pub fn next(prev_hash: &str, ts: DateTime<Utc>, new: NewAuditRecord) -> Self {
        let hash = compute_hash(
            prev_hash,
            ts,
            &new.actor,
            &new.action,
            &new.resource_type,
            &new.resource_id,
            &new.prev_values,
            &new.new_values,
        );
        Self {
            ts,
            actor: new.actor,
            action: new.action,
            resource_type: new.resource_type,
            resource_id: new.resource_id,
            prev_values: new.prev_values,
            new_values: new.new_values,
            prev_hash: prev_hash.to_string(),
            hash,
        }
    }

    /// Recompute this record's hash from its own fields, independent of
    /// whatever is stored in `self.hash`. Used by [`crate::AuditLog::verify`]
    /// to detect tampering.
    pub fn recomputed_hash(&self) -> String {
        compute_hash(
            &self.prev_hash,
            self.ts,
            &self.actor,
            &self.action,
            &self.resource_type,
            &self.resource_id,
            &self.prev_values,
            &self.new_values,
        )
    }
}
