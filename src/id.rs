//! Identifiers for exported objects and in-flight calls.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

static OBJECT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A process-unique identifier for an exported object.
///
/// Ids are assigned in export order and stay stable for the object's exported lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generates a new `ObjectId` from an atomic counter shared by every registry in the process.
    pub fn generate() -> Self {
        ObjectId(OBJECT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the sequential part of the id.
    pub fn sequence_id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// An opaque token linking a request to its eventual reply.
///
/// Tokens are unique among the outstanding calls of the registry that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wraps a raw token.
    pub fn new(token: u64) -> Self {
        CorrelationId(token)
    }

    /// Returns the raw token.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
