use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the producer and the writer threads
#[derive(Default)]
pub struct RunStats {
    pub records_extracted: AtomicU64,
    pub records_cleaned: AtomicU64,
    pub records_rejected: AtomicU64,
    pub records_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub batches_dispatched: AtomicU64,
    pub batches_written: AtomicU64,
    pub batches_failed: AtomicU64,
}

/// Point-in-time copy of [`RunStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub records_extracted: u64,
    pub records_cleaned: u64,
    pub records_rejected: u64,
    pub records_written: u64,
    pub bytes_written: u64,
    pub batches_dispatched: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_extracted(&self) {
        self.records_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cleaned(&self) {
        self.records_cleaned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// One batch landed in the output file.
    pub fn add_written(&self, records: u64, bytes: u64) {
        self.records_written.fetch_add(records, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn extracted(&self) -> u64 {
        self.records_extracted.load(Ordering::Relaxed)
    }

    pub fn cleaned(&self) -> u64 {
        self.records_cleaned.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.records_rejected.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.batches_dispatched.load(Ordering::Relaxed)
    }

    pub fn batches_ok(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    pub fn batches_err(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_extracted: self.extracted(),
            records_cleaned: self.cleaned(),
            records_rejected: self.rejected(),
            records_written: self.written(),
            bytes_written: self.bytes(),
            batches_dispatched: self.dispatched(),
            batches_written: self.batches_ok(),
            batches_failed: self.batches_err(),
        }
    }
}
