//! Recursive traversal of direct and indirect block trees.
//!
//! For every non-zero pointer reachable from a live inode the walker
//! range-checks it, zeroes it in its container when it points outside
//! the data region, records a reference, repairs a missing data-bitmap
//! bit, and recurses while indirection levels remain. Indirection
//! blocks are written back after their entries are processed, children
//! before parents, so zeroed entries always reach the image.
//!
//! VSFS has exactly three indirect levels, so recursion depth is fixed
//! by the tree kind and a crafted self-referential indirection block
//! cannot cause unbounded descent.

use crate::bitmap::Bitmap;
use crate::refs::RefTracker;
use crate::report::CheckReport;
use tracing::{debug, trace};
use vsfs_block::{ByteBlockDevice, ByteDevice};
use vsfs_error::{Result, VsfsError};
use vsfs_ondisk::{Inode, decode_pointers, encode_pointers};
use vsfs_types::{BlockNumber, InodeIndex, NUM_DIRECT, POINTERS_PER_BLOCK};

/// Which indirect tree of an inode is being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeKind {
    Single,
    Double,
    Triple,
}

impl TreeKind {
    fn name(self) -> &'static str {
        match self {
            Self::Single => "single indirect",
            Self::Double => "double indirect",
            Self::Triple => "triple indirect",
        }
    }

    /// Indirection levels in this tree (entries at the deepest level
    /// are terminal data pointers).
    fn depth(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

/// Walks one inode at a time, accumulating repairs into the shared
/// bitmap, reference tracker, and report.
pub(crate) struct Walker<'a, D: ByteDevice> {
    dev: &'a ByteBlockDevice<D>,
    first_data_block: u32,
    total_blocks: u32,
    data_bitmap: &'a mut Bitmap,
    refs: &'a mut RefTracker,
    report: &'a mut CheckReport,
    /// Any out-of-range pointer was zeroed.
    pub bad_blocks: bool,
    /// Any data-bitmap bit was set inline.
    pub data_bitmap_dirty: bool,
}

impl<'a, D: ByteDevice> Walker<'a, D> {
    pub fn new(
        dev: &'a ByteBlockDevice<D>,
        first_data_block: u32,
        total_blocks: u32,
        data_bitmap: &'a mut Bitmap,
        refs: &'a mut RefTracker,
        report: &'a mut CheckReport,
    ) -> Self {
        Self {
            dev,
            first_data_block,
            total_blocks,
            data_bitmap,
            refs,
            report,
            bad_blocks: false,
            data_bitmap_dirty: false,
        }
    }

    fn in_range(&self, block: u32) -> bool {
        BlockNumber(block).in_data_region(self.first_data_block, self.total_blocks)
    }

    /// Visit every pointer of a live inode in fixed order: direct slots
    /// 0..11, then the single, double, and triple indirect trees.
    /// Returns true if any pointer in the inode record itself was
    /// zeroed.
    pub fn walk_inode(&mut self, idx: InodeIndex, inode: &mut Inode) -> Result<bool> {
        trace!(target: "vsfs::check", event = "walk_inode", inode = idx.0);
        let mut inode_modified = false;

        for slot in 0..NUM_DIRECT {
            let block = inode.direct[slot];
            if block == 0 {
                continue;
            }
            if !self.in_range(block) {
                self.report.line(format!(
                    "Bad block error: Inode {idx} direct pointer {block} out of range. Clearing pointer..."
                ));
                inode.direct[slot] = 0;
                self.note_bad_block();
                inode_modified = true;
                continue;
            }
            self.refs.note(block);
            if !self.data_bitmap.is_set(block) {
                self.report.line(format!(
                    "Data Bitmap error: Inode {idx} direct pointer references block {block} which is not marked used. Fixing..."
                ));
                self.set_bitmap(block);
            }
        }

        for tree in [TreeKind::Single, TreeKind::Double, TreeKind::Triple] {
            let root = match tree {
                TreeKind::Single => &mut inode.single_indirect,
                TreeKind::Double => &mut inode.double_indirect,
                TreeKind::Triple => &mut inode.triple_indirect,
            };
            let block = *root;
            if block == 0 {
                continue;
            }
            if !self.in_range(block) {
                self.report.line(format!(
                    "Bad block error: Inode {idx} {} pointer {block} out of range. Clearing pointer...",
                    tree.name()
                ));
                *root = 0;
                self.note_bad_block();
                inode_modified = true;
                continue;
            }
            self.refs.note(block);
            if !self.data_bitmap.is_set(block) {
                self.report.line(format!(
                    "Data Bitmap error: Inode {idx} {} block {block} not marked used. Fixing...",
                    tree.name()
                ));
                self.set_bitmap(block);
            }
            self.walk_indirect(idx, tree, 1, block)?;
        }

        Ok(inode_modified)
    }

    /// Process one indirection block at `level` of `tree` and write it
    /// back. A failed read is a non-fatal anomaly: one diagnostic line,
    /// then the block is processed as all zeroes. Write failures are
    /// fatal.
    fn walk_indirect(
        &mut self,
        idx: InodeIndex,
        tree: TreeKind,
        level: u32,
        block: u32,
    ) -> Result<()> {
        debug!(
            target: "vsfs::check",
            event = "walk_indirect",
            inode = idx.0,
            tree = tree.name(),
            level,
            block
        );

        let mut entries = match self.dev.read_block(BlockNumber(block)) {
            Ok(bytes) => {
                decode_pointers(&bytes).map_err(|err| VsfsError::Format(err.to_string()))?
            }
            Err(_) => {
                self.report.line(read_error_line(idx, tree, level));
                vec![0_u32; POINTERS_PER_BLOCK]
            }
        };

        for slot in 0..entries.len() {
            let entry = entries[slot];
            if entry == 0 {
                continue;
            }
            if !self.in_range(entry) {
                self.report.line(bad_entry_line(idx, tree, level, entry));
                entries[slot] = 0;
                self.note_bad_block();
                continue;
            }
            self.refs.note(entry);
            if !self.data_bitmap.is_set(entry) {
                self.report.line(bitmap_entry_line(idx, tree, level, entry));
                self.set_bitmap(entry);
            }
            if level < tree.depth() {
                self.walk_indirect(idx, tree, level + 1, entry)?;
            }
        }

        let bytes = encode_pointers(&entries).map_err(|err| VsfsError::Format(err.to_string()))?;
        self.dev.write_block(BlockNumber(block), &bytes)
    }

    fn note_bad_block(&mut self) {
        self.bad_blocks = true;
        self.report.bad_block_repairs += 1;
    }

    fn set_bitmap(&mut self, block: u32) {
        self.data_bitmap.set(block);
        self.data_bitmap_dirty = true;
        self.report.data_bitmap_repairs += 1;
    }
}

fn bad_entry_line(idx: InodeIndex, tree: TreeKind, level: u32, entry: u32) -> String {
    match tree {
        TreeKind::Single => format!(
            "Bad block error: Inode {idx} single indirect entry {entry} out of range. Clearing entry..."
        ),
        TreeKind::Double | TreeKind::Triple => format!(
            "Bad block error: Inode {idx} {} level {level} pointer {entry} out of range. Clearing entry...",
            tree.name()
        ),
    }
}

fn bitmap_entry_line(idx: InodeIndex, tree: TreeKind, level: u32, entry: u32) -> String {
    // Entries at the deepest level of a tree are data blocks; shallower
    // entries are further indirection blocks named by their level.
    if level == tree.depth() {
        format!(
            "Data Bitmap error: Inode {idx} {} data block {entry} not marked used. Fixing...",
            tree.name()
        )
    } else {
        format!(
            "Data Bitmap error: Inode {idx} {} level {level} block {entry} not marked used. Fixing...",
            tree.name()
        )
    }
}

fn read_error_line(idx: InodeIndex, tree: TreeKind, level: u32) -> String {
    match tree {
        TreeKind::Single => format!("Error reading single indirect block for inode {idx}"),
        TreeKind::Double | TreeKind::Triple => {
            format!(
                "Error reading {} (level {level}) block for inode {idx}",
                tree.name()
            )
        }
    }
}
