//! Correlation of outstanding calls with their replies.
//!
//! Each blocking proxy call registers a one-shot slot keyed by a fresh correlation token. The
//! reply loop completes the slot when a reply carrying the token arrives; the caller evicts it
//! on timeout. Replies for evicted or unknown tokens are dropped.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use tokio::sync::oneshot;

use crate::{error::RemoteError, id::CorrelationId, wire::Outcome};

/// The table of calls awaiting a reply.
#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    next_token: AtomicU64,
    table: Mutex<PendingTable>,
}

#[derive(Debug, Default)]
struct PendingTable {
    calls: HashMap<CorrelationId, oneshot::Sender<Outcome>>,
    closed: Option<String>,
}

/// A registered call.
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub(crate) correlation: CorrelationId,
    pub(crate) reply: oneshot::Receiver<Outcome>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        PendingCalls::default()
    }

    /// Mints a token which is unique among live calls.
    pub(crate) fn next_token(&self) -> CorrelationId {
        CorrelationId::new(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a new call awaiting a reply.
    pub(crate) fn register(&self) -> Result<PendingCall, RemoteError> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.table();
        if let Some(reason) = &table.closed {
            return Err(RemoteError::TransportUnavailable(reason.clone()));
        }
        let correlation = self.next_token();
        table.calls.insert(correlation, tx);
        Ok(PendingCall {
            correlation,
            reply: rx,
        })
    }

    /// Delivers a reply to the call waiting on `correlation`.
    ///
    /// Returns `false` if no such call is waiting.
    pub(crate) fn complete(&self, correlation: CorrelationId, outcome: Outcome) -> bool {
        let Some(tx) = self.table().calls.remove(&correlation) else {
            return false;
        };
        // The caller may have given up between eviction checks.
        tx.send(outcome).is_ok()
    }

    /// Forgets a call, so that a late reply is dropped.
    pub(crate) fn evict(&self, correlation: CorrelationId) {
        self.table().calls.remove(&correlation);
    }

    /// Fails every outstanding call and rejects new registrations.
    ///
    /// Returns the number of calls failed.
    pub(crate) fn fail_all(&self, reason: &str) -> usize {
        let calls = {
            let mut table = self.table();
            table.closed.get_or_insert_with(|| reason.to_string());
            std::mem::take(&mut table.calls)
        };
        let count = calls.len();
        for (_, tx) in calls {
            let _ = tx.send(Outcome::Failed(RemoteError::TransportUnavailable(
                reason.to_string(),
            )));
        }
        count
    }

    /// The number of calls awaiting a reply.
    pub(crate) fn len(&self) -> usize {
        self.table().calls.len()
    }

    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
