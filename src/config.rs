use std::path::{Path, PathBuf};

/// Records per batch handed to the writer pool
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Upper bound on writer threads picked by [`default_workers`]
pub const MAX_DEFAULT_WORKERS: usize = 32;

/// Progress update interval (tick every N records)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Buffer size for the input stream (1MB)
pub const READ_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Default path of the failure log
pub const DEFAULT_LOG_FILE: &str = "wikiplain.log";

/// Title used in failure reports when a record has none
pub const UNKNOWN_TITLE: &str = "unknown";

/// Writer threads: one per core plus four for I/O stalls, capped at [`MAX_DEFAULT_WORKERS`].
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores + 4).min(MAX_DEFAULT_WORKERS)
}

/// Element names that drive the record extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNames {
    /// Element whose end completes a record
    pub record: String,
    pub title: String,
    pub body: String,
}

impl Default for ElementNames {
    fn default() -> Self {
        Self {
            record: "page".to_string(),
            title: "title".to_string(),
            body: "text".to_string(),
        }
    }
}

/// Everything the pipeline driver needs for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub batch_size: usize,
    pub workers: usize,
    /// Batches allowed to be queued or running at once (defaults to twice the workers)
    pub max_in_flight: Option<usize>,
    /// Records whose body grows past this many bytes are rejected
    pub max_body_bytes: Option<usize>,
    /// Stop after this many extracted records
    pub limit: Option<u64>,
    /// Truncate the output file before the run instead of appending
    pub fresh: bool,
    pub progress: bool,
    pub elements: ElementNames,
}

impl PipelineConfig {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_workers(),
            max_in_flight: None,
            max_body_bytes: None,
            limit: None,
            fresh: false,
            progress: false,
            elements: ElementNames::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = Some(max_in_flight);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = Some(max_body_bytes);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_elements(mut self, elements: ElementNames) -> Self {
        self.elements = elements;
        self
    }

    pub fn in_flight_bound(&self) -> usize {
        self.max_in_flight
            .unwrap_or(self.workers.saturating_mul(2))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workers_in_range() {
        let workers = default_workers();
        assert!(workers >= 5);
        assert!(workers <= MAX_DEFAULT_WORKERS);
    }

    #[test]
    fn default_element_names() {
        let names = ElementNames::default();
        assert_eq!(names.record, "page");
        assert_eq!(names.title, "title");
        assert_eq!(names.body, "text");
    }

    #[test]
    fn new_config_uses_defaults() {
        let config = PipelineConfig::new("dump.xml", "out.txt");
        assert_eq!(config.input, PathBuf::from("dump.xml"));
        assert_eq!(config.output, PathBuf::from("out.txt"));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.limit.is_none());
        assert!(!config.fresh);
    }

    #[test]
    fn in_flight_defaults_to_twice_workers() {
        let config = PipelineConfig::new("a", "b").with_workers(3);
        assert_eq!(config.in_flight_bound(), 6);
    }

    #[test]
    fn in_flight_override_and_floor() {
        let config = PipelineConfig::new("a", "b").with_max_in_flight(5);
        assert_eq!(config.in_flight_bound(), 5);

        let config = PipelineConfig::new("a", "b").with_max_in_flight(0);
        assert_eq!(config.in_flight_bound(), 1);
    }
}
