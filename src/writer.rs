//! Bounded writer pool.
//!
//! Batches are rendered and appended by a dedicated rayon pool. The producer
//! keeps at most `max_in_flight` batches queued or running; [`WriterPool::submit`]
//! blocks on completions beyond that, and [`WriterPool::drain`] is the barrier
//! at the end of a run.

use crate::error::WriteError;
use crate::models::Batch;
use crate::report::FailureLog;
use crate::stats::RunStats;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// The output file. Every append holds the lock for exactly one batch.
pub struct AppendTarget {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AppendTarget {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empties the file, creating it if needed.
    pub fn truncate(&self) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        File::create(&self.path).map(|_| ())
    }

    /// Opens in append mode, writes the whole buffer, flushes and closes.
    pub fn append(&self, buf: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf)?;
        file.flush()
    }
}

/// Renders a batch as `=== {title} ===\n{text}\n\n` sections.
pub fn render_batch(batch: &Batch) -> String {
    let capacity = batch
        .records
        .iter()
        .map(|r| r.title.len() + r.text.len() + 10)
        .sum();
    let mut out = String::with_capacity(capacity);
    for record in &batch.records {
        out.push_str("=== ");
        out.push_str(&record.title);
        out.push_str(" ===\n");
        out.push_str(&record.text);
        out.push_str("\n\n");
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches_written: u64,
    pub batches_failed: u64,
}

struct Outcome {
    batch: u64,
    result: Result<(), WriteError>,
}

pub struct WriterPool {
    pool: ThreadPool,
    target: Arc<AppendTarget>,
    stats: Arc<RunStats>,
    max_in_flight: usize,
    in_flight: usize,
    tx: Sender<Outcome>,
    rx: Receiver<Outcome>,
    report: DrainReport,
}

impl WriterPool {
    pub fn new(
        target: Arc<AppendTarget>,
        workers: usize,
        max_in_flight: usize,
        stats: Arc<RunStats>,
    ) -> Result<Self, WriteError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("wikiplain-writer-{}", i))
            .build()?;
        let (tx, rx) = mpsc::channel();

        debug!(workers, max_in_flight, output = %target.path().display(), "Writer pool started");

        Ok(Self {
            pool,
            target,
            stats,
            max_in_flight: max_in_flight.max(1),
            in_flight: 0,
            tx,
            rx,
            report: DrainReport::default(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Queues a batch, first waiting for completions while the pool is full.
    pub fn submit(&mut self, batch: Batch, failures: &FailureLog) {
        while self.in_flight >= self.max_in_flight {
            self.wait_one(failures);
        }

        self.stats.inc_dispatched();
        self.in_flight += 1;

        let target = Arc::clone(&self.target);
        let stats = Arc::clone(&self.stats);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let outcome = write_batch(&target, &stats, batch);
            // The receiver only goes away once the pool is dropped.
            let _ = tx.send(outcome);
        });
    }

    /// Blocks until every submitted batch has finished.
    pub fn drain(mut self, failures: &FailureLog) -> DrainReport {
        while self.in_flight > 0 {
            self.wait_one(failures);
        }
        info!(
            written = self.report.batches_written,
            failed = self.report.batches_failed,
            "Writer pool drained"
        );
        self.report
    }

    fn wait_one(&mut self, failures: &FailureLog) {
        match self.rx.recv() {
            Ok(outcome) => {
                self.in_flight -= 1;
                self.settle(outcome, failures);
            }
            Err(_) => self.in_flight = 0,
        }
    }

    fn settle(&mut self, outcome: Outcome, failures: &FailureLog) {
        match outcome.result {
            Ok(()) => self.report.batches_written += 1,
            Err(WriteError::Io { source, .. }) => {
                self.report.batches_failed += 1;
                failures.write_local(outcome.batch, &source);
            }
            Err(e) => {
                self.report.batches_failed += 1;
                failures.write_local(outcome.batch, &e);
            }
        }
    }
}

fn write_batch(target: &AppendTarget, stats: &RunStats, batch: Batch) -> Outcome {
    let rendered = render_batch(&batch);
    let result = target
        .append(rendered.as_bytes())
        .map_err(|source| WriteError::Io {
            batch: batch.id,
            source,
        });

    match result {
        Ok(()) => {
            stats.add_written(batch.len() as u64, rendered.len() as u64);
            debug!(batch = batch.id, records = batch.len(), bytes = rendered.len(), "Batch written");
        }
        Err(_) => stats.inc_batch_failed(),
    }

    Outcome {
        batch: batch.id,
        result,
    }
}
