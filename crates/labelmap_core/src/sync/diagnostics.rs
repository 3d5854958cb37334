//! Structured record of inbound notification handling.
//!
//! Failures while reconciling engine notifications are recovered, never
//! propagated. They are kept here so applications can observe them without
//! scraping logs.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// One recovered failure while handling an engine notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiagnostic {
    /// Segmentation the notification concerned.
    pub segmentation_id: String,
    /// Notification name (`data-modified`, `metadata-modified`).
    pub notification: &'static str,
    /// Rendered error.
    pub error: String,
}

/// Counters for inbound notification handling.
#[derive(Debug, Default)]
pub(crate) struct SyncCounters {
    received: AtomicU64,
    dropped: AtomicU64,
    forwarded: AtomicU64,
    reconciled: AtomicU64,
    failed: AtomicU64,
}

impl SyncCounters {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconciled(&self) {
        self.reconciled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SyncStats {
        SyncStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            reconciled: self.reconciled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of inbound notification counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    /// Notifications received from the engine.
    pub received: u64,
    /// Notifications for segmentations the store does not hold.
    pub dropped: u64,
    /// Data-modified notifications re-broadcast.
    pub forwarded: u64,
    /// Metadata-modified notifications merged into the store.
    pub reconciled: u64,
    /// Reconciliations that failed and were recovered.
    pub failed: u64,
}

/// Bounded history of diagnostics; the oldest entry goes first when full.
#[derive(Debug)]
pub(crate) struct DiagnosticLog {
    capacity: usize,
    entries: Mutex<VecDeque<SyncDiagnostic>>,
}

impl DiagnosticLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub(crate) fn push(&self, diagnostic: SyncDiagnostic) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(diagnostic);
    }

    pub(crate) fn entries(&self) -> Vec<SyncDiagnostic> {
        self.entries.lock().iter().cloned().collect()
    }

    pub(crate) fn drain(&self) -> Vec<SyncDiagnostic> {
        self.entries.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic(id: &str) -> SyncDiagnostic {
        SyncDiagnostic {
            segmentation_id: id.to_string(),
            notification: "metadata-modified",
            error: "boom".to_string(),
        }
    }

    #[test]
    fn log_drops_oldest_when_full() {
        let log = DiagnosticLog::new(2);
        log.push(diagnostic("a"));
        log.push(diagnostic("b"));
        log.push(diagnostic("c"));

        let ids: Vec<_> = log.entries().into_iter().map(|d| d.segmentation_id).collect();
        assert_eq!(ids, vec!["b", "c"]);

        assert_eq!(log.drain().len(), 2);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let log = DiagnosticLog::new(0);
        log.push(diagnostic("a"));
        assert!(log.entries().is_empty());
    }

    #[test]
    fn counters_snapshot() {
        let counters = SyncCounters::default();
        counters.record_received();
        counters.record_received();
        counters.record_dropped();
        counters.record_failed();

        let stats = counters.snapshot();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.reconciled, 0);
    }
}
