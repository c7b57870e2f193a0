//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Populating the store from a directory walk
//! - Hashing only files whose size collides with another file
//! - Querying and summarizing duplicate groups

pub mod finder;
pub mod groups;

pub use finder::{
    DuplicateFinder, DuplicatePipeline, FinderConfig, FinderError, PipelineState, ScanReport,
    ScanSummary, DEFAULT_BATCH_SIZE, DEFAULT_IO_THREADS,
};
pub use groups::{collect_groups, reclaimable_space, DuplicateGroup};
