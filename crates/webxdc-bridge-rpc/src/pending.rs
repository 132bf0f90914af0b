// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pending-request table.
//
// Maps each outstanding request id to the one-shot channel that completes
// its caller. The lock is only ever held for a single insert, lookup or
// removal; it is never held across a sender call or an await point.
//
// Once closed the table stays empty: pending callers fail and new requests
// are refused.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use webxdc_bridge_core::types::{PendingRequest, RequestId, RequestState};

use crate::envelope::Outcome;

/// What a waiting caller is woken with.
#[derive(Debug)]
pub(crate) enum Settlement {
    Response(Outcome),
    Cancelled,
    Closed,
}

/// One outstanding request.
#[derive(Debug)]
pub(crate) struct PendingEntry {
    pub(crate) method: String,
    pub(crate) issued_at: DateTime<Utc>,
    pub(crate) state: RequestState,
    pub(crate) tx: oneshot::Sender<Settlement>,
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<RequestId, PendingEntry>,
    closed: bool,
}

/// Outstanding requests keyed by id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<Entries>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request and return the receiver its caller waits on.
    ///
    /// `None` once the table has been closed.
    pub(crate) fn insert(
        &self,
        id: RequestId,
        method: &str,
    ) -> Option<oneshot::Receiver<Settlement>> {
        let mut entries = self.lock();
        if entries.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            method: method.to_owned(),
            issued_at: Utc::now(),
            state: RequestState::Created,
            tx,
        };
        entries.by_id.insert(id, entry);
        Some(rx)
    }

    /// Refuse further inserts and hand back every outstanding entry.
    pub(crate) fn close(&self) -> Vec<(RequestId, PendingEntry)> {
        let mut entries = self.lock();
        entries.closed = true;
        let mut drained: Vec<_> = entries.by_id.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Record that the request left through the sender.
    ///
    /// A no-op when the entry is already gone (a synchronous sender may have
    /// delivered the response before returning).
    pub(crate) fn mark_sent(&self, id: RequestId) {
        if let Some(entry) = self.lock().by_id.get_mut(&id) {
            entry.state = RequestState::Sent;
        }
    }

    /// Take an entry out of the table.
    pub(crate) fn remove(&self, id: RequestId) -> Option<PendingEntry> {
        self.lock().by_id.remove(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    /// Snapshot of all outstanding requests, ordered by id.
    pub fn snapshot(&self) -> Vec<PendingRequest> {
        let mut requests: Vec<PendingRequest> = self
            .lock()
            .by_id
            .iter()
            .map(|(id, entry)| PendingRequest {
                id: *id,
                method: entry.method.clone(),
                state: entry.state,
                issued_at: entry.issued_at,
            })
            .collect();
        requests.sort_by_key(|r| r.id);
        requests
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().expect("pending table lock poisoned")
    }
}
