//! Ordered textual report of a consistency run.

use serde::Serialize;
use std::fmt;

/// Report lines plus per-category repair counters.
///
/// Lines are collected in emission order and printed verbatim by the
/// caller; the counters summarize what a run found without reparsing
/// the text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    lines: Vec<String>,
    /// Superblock fields patched to their canonical values.
    pub superblock_repairs: u32,
    /// Inode bitmap bits flipped to match inode liveness.
    pub inode_bitmap_repairs: u32,
    /// Out-of-range pointers zeroed by the walker.
    pub bad_block_repairs: u32,
    /// Data bitmap bits set by the walker or cleared by the final pass.
    pub data_bitmap_repairs: u32,
    /// Multiply-referenced data blocks (reported, never repaired).
    pub duplicate_blocks: u32,
}

impl CheckReport {
    pub(crate) fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// All report lines in emission order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// True if the run found nothing to repair or report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.superblock_repairs == 0
            && self.inode_bitmap_repairs == 0
            && self.bad_block_repairs == 0
            && self.data_bitmap_repairs == 0
            && self.duplicate_blocks == 0
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "superblock={} inode_bitmap={} bad_blocks={} data_bitmap={} duplicates={}",
            self.superblock_repairs,
            self.inode_bitmap_repairs,
            self.bad_block_repairs,
            self.data_bitmap_repairs,
            self.duplicate_blocks,
        )
    }
}
