//! Stackstream: StackExchange dump reader for text-annotation pipelines
//!
//! This crate streams the XML files of a StackExchange data dump (`Posts.xml`,
//! `Comments.xml`, `Tags.xml`) and yields one normalized record per usable row:
//!
//! 1. **Walk** -- Read the dump element by element; only the current row is in memory
//! 2. **Cross-reference** -- Join answers to the tags and title of their question using a
//!    tracker that forgets a question once all of its answers have been seen
//! 3. **Filter** -- Optionally keep only posts carrying one of a set of tags, and skip rows
//!    before a resume checkpoint
//! 4. **Normalize** -- Strip HTML from the selected text fields and collapse newlines
//!
//! # Key Modules
//!
//! - [`stream`] -- The record pipeline, exposed as an iterator
//! - [`parser`] -- Streaming XML walk over dump rows
//! - [`tracker`] -- Question-to-answer join state with eviction
//! - [`crossref`] -- Preloaded lookups into a second dump file
//! - [`html`] -- Markup stripping and newline collapsing
//! - [`tags`] -- Tag list decoding
//! - [`resume`] -- Resume-by-id and resume-by-date filters
//! - [`checkpoint`] -- Persisting the last emitted id between runs
//! - [`models`] -- Content types and the output record shape
//! - [`stats`] -- Seen/parsed/dropped counters
//! - [`config`] -- Stream options and constants
//!
//! # Example Usage
//!
//! ```no_run
//! use stackstream::config::StreamConfig;
//! use stackstream::models::ContentType;
//! use stackstream::stream::RecordStream;
//!
//! let config = StreamConfig::new(ContentType::PostBoth).with_only_tags(["python"]);
//! let stream = RecordStream::open("ai.stackexchange.com/Posts.xml", "ai.stackexchange.com", config)?;
//! for record in stream {
//!     println!("{}", record.text);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ```bash
//! stackstream stream -i ai.stackexchange.com/Posts.xml -c post_both --only-tags python -o out.jsonl
//! ```

pub mod checkpoint;
pub mod config;
pub mod crossref;
pub mod html;
pub mod models;
pub mod parser;
pub mod resume;
pub mod stats;
pub mod stream;
pub mod tags;
pub mod tracker;
