use derive_more::{Constructor, From};
use serde::{Deserialize, Serialize};

/// Wraps a value to mark it as a point-in-time snapshot rather than a live
/// reference — used wherever a component hands out a read of otherwise
/// mutable state (Portfolio reads, Order-book reads) so callers can't
/// mistake it for something that updates in place.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor, From,
)]
pub struct Snapshot<T>(pub T);

impl<T> Snapshot<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn as_ref(&self) -> Snapshot<&T> {
        Snapshot(&self.0)
    }

    pub fn map<F, N>(self, op: F) -> Snapshot<N>
    where
        F: FnOnce(T) -> N,
    {
        Snapshot(op(self.0))
    }
}
