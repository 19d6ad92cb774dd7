//! Side-channel call log.
//!
//! An optional in-memory record of every completed gateway call, keyed by a
//! monotonically increasing counter. The log is a passive observer: writing
//! to it never changes a call's return value or control flow. There is no
//! ambient "current logger" — components that want tracing hold the same
//! `Arc<CallLog>` the gateway was built with.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use super::gateway::ChatMessage;

/// One completed gateway call.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    /// Position in the global call order.
    pub seq: u64,
    /// Label of the phase that issued the call (`perceive`, `plan`, ...).
    pub caller: String,
    pub request: Vec<ChatMessage>,
    pub response: String,
    pub elapsed_ms: u64,
    /// Optional annotation (e.g. the retrieval context behind the call).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Concurrent collector of [`CallRecord`]s.
#[derive(Debug, Default)]
pub struct CallLog {
    seq: AtomicU64,
    records: DashMap<u64, CallRecord>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call and return its sequence number.
    pub(crate) fn record(
        &self,
        caller: &str,
        request: &[ChatMessage],
        response: &str,
        elapsed_ms: u64,
        context: Option<&str>,
    ) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.records.insert(
            seq,
            CallRecord {
                seq,
                caller: caller.to_string(),
                request: request.to_vec(),
                response: response.to_string(),
                elapsed_ms,
                context: context.map(|c| c.to_string()),
            },
        );
        seq
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, seq: u64) -> Option<CallRecord> {
        self.records.get(&seq).map(|r| r.clone())
    }

    /// All records in call order.
    pub fn snapshot(&self) -> Vec<CallRecord> {
        let mut records: Vec<CallRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}
