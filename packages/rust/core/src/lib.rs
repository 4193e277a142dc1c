//! Core domain logic and pipeline orchestration for policytag.
//!
//! This crate ties together document parsing, page reconstruction, metadata
//! enrichment, hybrid tagging, and artifact output into end-to-end workflows
//! (e.g., [`pipeline::run_document`]).

pub mod chunker;
pub mod enrichment;
pub mod heartbeat;
pub mod parse;
pub mod pipeline;
pub mod summary;
pub mod tagger;
