//! Duplicate group summaries.
//!
//! The store returns duplicates as a flat, ordered list of records. This
//! module folds that list into [`DuplicateGroup`]s, one per shared digest,
//! for counting groups and reclaimable bytes.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use dupreport::duplicates::collect_groups;
//! use dupreport::scanner::Digest;
//! use dupreport::store::FileRecord;
//!
//! let digest = Digest::of_bytes(b"hello");
//! let records = vec![
//!     FileRecord::new("a.txt", 5, Utc::now()).unwrap().with_content_hash(digest.clone()),
//!     FileRecord::new("b.txt", 5, Utc::now()).unwrap().with_content_hash(digest),
//! ];
//!
//! let groups = collect_groups(&records);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].wasted_space(), 5);
//! ```

use std::collections::BTreeMap;

use crate::scanner::Digest;
use crate::store::FileRecord;

/// Files sharing one digest and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Shared content digest
    pub digest: Digest,
    /// File size in bytes, shared by every member
    pub size: u64,
    /// Member locations, ascending
    pub locations: Vec<String>,
}

impl DuplicateGroup {
    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Total size of all files in this group.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size.saturating_mul(self.locations.len() as u64)
    }

    /// Total wasted space (all copies minus one).
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size.saturating_mul(self.duplicate_count() as u64)
    }

    /// Number of duplicate copies (total - 1 original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.locations.len().saturating_sub(1)
    }
}

/// Fold records into groups keyed by digest and size.
///
/// Records without a digest are ignored, as are digests held by a single
/// record. Groups come back ordered by digest regardless of input order.
#[must_use]
pub fn collect_groups(records: &[FileRecord]) -> Vec<DuplicateGroup> {
    let mut by_key: BTreeMap<(&Digest, u64), Vec<String>> = BTreeMap::new();
    for record in records {
        if let Some(digest) = record.content_hash() {
            by_key
                .entry((digest, record.size()))
                .or_default()
                .push(record.location().to_string());
        }
    }

    by_key
        .into_iter()
        .filter(|(_, locations)| locations.len() > 1)
        .map(|((digest, size), mut locations)| {
            locations.sort();
            DuplicateGroup {
                digest: digest.clone(),
                size,
                locations,
            }
        })
        .collect()
}

/// Sum of [`DuplicateGroup::wasted_space`] over all groups.
#[must_use]
pub fn reclaimable_space(groups: &[DuplicateGroup]) -> u64 {
    groups
        .iter()
        .fold(0u64, |acc, g| acc.saturating_add(g.wasted_space()))
}
