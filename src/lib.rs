//! Wikiplain: MediaWiki XML dump to plain-text corpus
//!
//! This crate streams a MediaWiki XML dump (plain or bzip2-compressed), pulls the
//! title and wikitext body out of every `<page>`, strips the markup down to prose
//! and appends the result to a single output file as
//!
//! ```text
//! === {title} ===
//! {cleaned text}
//!
//! ```
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- The dump is never loaded into memory; quick-xml
//!   events drive a small tag-driven state machine
//! - **Sequential producer** -- One thread reads, extracts, strips and batches records
//! - **Bounded writer pool** -- A rayon pool appends whole batches; at most
//!   `max_in_flight` batches are queued or running at once
//! - **One lock per batch** -- Sections from different batches never interleave
//! - **Failure isolation** -- A bad record or a failed batch write is logged and skipped;
//!   broken XML stops extraction but everything already cleaned is still written
//! - **Atomic operations** -- Lock-free counters shared with the writer threads
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming XML reader with BZ2 decompression
//! - [`extract`] -- Record extractor state machine
//! - [`markup`] -- Wikitext to plain text
//! - [`pipeline`] -- Run driver and summary
//! - [`writer`] -- Bounded writer pool and append target
//! - [`report`] -- Failure log
//! - [`models`] -- Records, batches and the batcher
//! - [`error`] -- Failure taxonomy
//! - [`stats`] -- Thread-safe atomic counters
//! - [`config`] -- Constants and run configuration
//!
//! # Example Usage
//!
//! ```bash
//! # Convert a compressed dump, starting from an empty output file
//! wikiplain -i enwiki-latest-pages-articles.xml.bz2 -o corpus.txt --fresh
//!
//! # Try the first 1000 pages with verbose logging
//! wikiplain -i dump.xml -o sample.txt --limit 1000 -vv
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod markup;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod writer;
