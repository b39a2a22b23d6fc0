//! Failure taxonomy for a run.
//!
//! - [`StreamError`] ends extraction: the input could not be opened or its XML is broken.
//! - [`RecordError`] drops one record and the run continues.
//! - [`WriteError`] loses one batch; the remaining batches are still written.

use std::io;
use std::path::PathBuf;
use std::str::Utf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open input {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("invalid UTF-8 at byte {position}: {source}")]
    Encoding {
        position: u64,
        #[source]
        source: Utf8Error,
    },
    #[error("input ended inside an unclosed <{element}> element")]
    Truncated { element: String },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("undecodable character data: {0}")]
    Unescape(String),
    #[error("body exceeds {limit} bytes")]
    Oversized { limit: usize },
    #[error(transparent)]
    Strip(#[from] StripError),
}

#[derive(Debug, Error)]
pub enum StripError {
    #[error("markup rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("batch {batch}: {source}")]
    Io {
        batch: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to start writer pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
