//! Run driver: one sequential producer (read, extract, strip, batch) feeding
//! the bounded [`WriterPool`].

use crate::config::{PipelineConfig, PROGRESS_INTERVAL};
use crate::error::StreamError;
use crate::extract::{Extracted, Extractor, RecordFailure};
use crate::markup::{Stripper, WikitextStripper};
use crate::models::{Batcher, CleanRecord};
use crate::parser::DumpReader;
use crate::report::FailureLog;
use crate::stats::{RunStats, StatsSnapshot};
use crate::writer::{AppendTarget, WriterPool};
use anyhow::{ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Terminated { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: RunOutcome,
    pub stats: StatsSnapshot,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Terminal line for the failure log.
    pub fn message(&self) -> String {
        match &self.outcome {
            RunOutcome::Completed => format!(
                "Processing completed successfully: {} records written, {} records skipped, {} batches failed",
                self.stats.records_written, self.stats.records_rejected, self.stats.batches_failed
            ),
            RunOutcome::Terminated { reason } => {
                format!("Processing terminated early: {}", reason)
            }
        }
    }
}

pub struct Pipeline<S: Stripper = WikitextStripper> {
    config: PipelineConfig,
    stripper: S,
}

impl<S: Stripper> Pipeline<S> {
    pub fn new(config: PipelineConfig, stripper: S) -> Self {
        Self { config, stripper }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs to completion or to the first stream error.
    ///
    /// Only setup problems (bad settings, an output that cannot be truncated, a pool
    /// that cannot start) are returned as errors. Everything else is reported to
    /// `failures` and reflected in the summary outcome.
    pub fn run(&self, failures: &FailureLog) -> Result<RunSummary> {
        let start = Instant::now();
        ensure!(self.config.batch_size > 0, "batch size must be at least 1");
        ensure!(self.config.workers > 0, "worker count must be at least 1");

        let stats = Arc::new(RunStats::new());
        let input = self.config.input.display().to_string();

        info!(input = %input, output = %self.config.output.display(), "Starting run");

        let reader = match DumpReader::open(&self.config.input, self.extractor()) {
            Ok(reader) => reader,
            Err(e) => {
                failures.stream_fatal(&input, &e);
                let outcome = RunOutcome::Terminated {
                    reason: e.to_string(),
                };
                return Ok(self.summarize(&stats, outcome, start));
            }
        };

        let target = Arc::new(AppendTarget::new(&self.config.output));
        if self.config.fresh {
            target.truncate().with_context(|| {
                format!("Failed to truncate output: {}", self.config.output.display())
            })?;
            debug!(output = %self.config.output.display(), "Output truncated");
        }

        let mut pool = WriterPool::new(
            target,
            self.config.workers,
            self.config.in_flight_bound(),
            Arc::clone(&stats),
        )?;

        let outcome = self.feed(reader, &mut pool, &stats, &input, failures);
        pool.drain(failures);

        Ok(self.summarize(&stats, outcome, start))
    }

    fn extractor(&self) -> Extractor {
        Extractor::new(self.config.elements.clone()).with_max_body_bytes(self.config.max_body_bytes)
    }

    fn feed<I>(
        &self,
        mut items: I,
        pool: &mut WriterPool,
        stats: &RunStats,
        input: &str,
        failures: &FailureLog,
    ) -> RunOutcome
    where
        I: Iterator<Item = Result<Extracted, StreamError>>,
    {
        let pb = spinner(self.config.progress);
        let mut batcher = Batcher::new(self.config.batch_size);
        let mut outcome = RunOutcome::Completed;

        loop {
            if self.config.limit.is_some_and(|limit| stats.extracted() >= limit) {
                info!(limit = stats.extracted(), "Record limit reached");
                break;
            }
            let Some(item) = items.next() else {
                break;
            };

            match item {
                Ok(Extracted::Record(raw)) => {
                    stats.inc_extracted();
                    match self.stripper.strip(&raw.body) {
                        Ok(text) => {
                            stats.inc_cleaned();
                            let record = CleanRecord {
                                title: raw.title,
                                text,
                            };
                            if let Some(batch) = batcher.push(record) {
                                pool.submit(batch, failures);
                            }
                        }
                        Err(e) => {
                            stats.inc_rejected();
                            let failure = RecordFailure {
                                title: raw.title,
                                error: e.into(),
                            };
                            failures.record_local(failure.context(), &failure.error);
                        }
                    }
                }
                Ok(Extracted::Rejected(failure)) => {
                    stats.inc_extracted();
                    stats.inc_rejected();
                    failures.record_local(failure.context(), &failure.error);
                }
                Err(e) => {
                    failures.stream_fatal(input, &e);
                    outcome = RunOutcome::Terminated {
                        reason: e.to_string(),
                    };
                    break;
                }
            }

            let extracted = stats.extracted();
            if extracted > 0 && extracted % PROGRESS_INTERVAL == 0 {
                pb.set_message(format!(
                    "{} records, {} batches dispatched",
                    extracted,
                    stats.dispatched()
                ));
                pb.tick();
            }
        }

        // Records already cleaned are still written after a stream error.
        if let Some(batch) = batcher.finish() {
            pool.submit(batch, failures);
        }

        pb.finish_and_clear();
        outcome
    }

    fn summarize(&self, stats: &RunStats, outcome: RunOutcome, start: Instant) -> RunSummary {
        let summary = RunSummary {
            input: self.config.input.clone(),
            output: self.config.output.clone(),
            outcome,
            stats: stats.snapshot(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            extracted = summary.stats.records_extracted,
            written = summary.stats.records_written,
            rejected = summary.stats.records_rejected,
            completed = summary.is_completed(),
            elapsed_secs = summary.elapsed_secs,
            "Run finished"
        );
        summary
    }
}

fn spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed}] {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Reading dump...");
    pb
}
