//! Phase driver for a consistency run.

use crate::bitmap::Bitmap;
use crate::reconcile;
use crate::refs::RefTracker;
use crate::report::CheckReport;
use crate::superblock;
use crate::walker::Walker;
use std::path::Path;
use tracing::debug;
use vsfs_block::{ByteBlockDevice, ByteDevice, FileByteDevice};
use vsfs_error::{Result, VsfsError};
use vsfs_ondisk::{INODE_RECORD_SIZE, Inode, Superblock};
use vsfs_types::{BLOCK_SIZE, BlockNumber, InodeIndex, SUPERBLOCK_BLOCK};

/// A consistency check over one image.
///
/// All run state (superblock, bitmaps, inode table, reference counts,
/// dirty flags) is local to [`Fsck::run`]; nothing outlives a single
/// invocation, and running twice on the same device is exactly two
/// independent runs.
pub struct Fsck<D: ByteDevice> {
    dev: ByteBlockDevice<D>,
}

impl Fsck<FileByteDevice> {
    /// Open the image file at `path` for a read+write run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dev = FileByteDevice::open(path)?;
        Ok(Self::new(ByteBlockDevice::new(dev, BLOCK_SIZE)?))
    }
}

impl<D: ByteDevice> Fsck<D> {
    #[must_use]
    pub fn new(dev: ByteBlockDevice<D>) -> Self {
        Self { dev }
    }

    #[must_use]
    pub fn device(&self) -> &ByteBlockDevice<D> {
        &self.dev
    }

    /// Execute all phases in order and write repairs back.
    ///
    /// Recoverable structural findings become report lines; an `Err`
    /// here is a fatal I/O or format failure and the image may not have
    /// been written back.
    pub fn run(&mut self) -> Result<CheckReport> {
        let mut report = CheckReport::default();

        // Superblock: read, validate, patch in memory.
        let sb_block = self.dev.read_block(BlockNumber(SUPERBLOCK_BLOCK))?;
        let mut sb = Superblock::parse_from_bytes(&sb_block)
            .map_err(|err| VsfsError::Format(err.to_string()))?;
        let sb_dirty = superblock::validate(&mut sb, &mut report);

        // Bitmaps and inode table, using the patched geometry.
        let mut inode_bitmap =
            Bitmap::from_block(self.dev.read_block(BlockNumber(sb.inode_bitmap_block))?);
        let mut data_bitmap =
            Bitmap::from_block(self.dev.read_block(BlockNumber(sb.data_bitmap_block))?);
        let mut inodes = self.read_inode_table(&sb)?;
        debug!(
            target: "vsfs::check",
            event = "image_loaded",
            inode_count = inodes.len(),
            live = inodes.iter().filter(|inode| inode.is_live()).count()
        );

        // Inode bitmap against liveness.
        let inode_bitmap_dirty =
            reconcile::reconcile_inode_bitmap(&inodes, &mut inode_bitmap, &mut report);

        // Walk every live inode, counting references and repairing bad
        // pointers and missing bitmap bits inline.
        let mut refs = RefTracker::new(sb.first_data_block, sb.total_blocks);
        let mut walker = Walker::new(
            &self.dev,
            sb.first_data_block,
            sb.total_blocks,
            &mut data_bitmap,
            &mut refs,
            &mut report,
        );
        for (i, inode) in inodes.iter_mut().enumerate() {
            if !inode.is_live() {
                continue;
            }
            walker.walk_inode(InodeIndex(i as u32), inode)?;
        }
        let bad_blocks = walker.bad_blocks;
        let mut data_bitmap_dirty = walker.data_bitmap_dirty;

        // Data-region final passes.
        reconcile::report_duplicates(&refs, sb.first_data_block, sb.total_blocks, &mut report);
        report.line(if bad_blocks {
            "Bad block errors found and fixed."
        } else {
            "Bad block check passed."
        });
        data_bitmap_dirty |= reconcile::clear_unreferenced(
            &mut data_bitmap,
            &refs,
            sb.first_data_block,
            sb.total_blocks,
            &mut report,
        );

        // Write-back: superblock, bitmaps (each only if dirty), then
        // the inode table unconditionally (any pointer may have been
        // zeroed).
        if sb_dirty {
            let bytes = sb
                .encode()
                .map_err(|err| VsfsError::Format(err.to_string()))?;
            self.dev
                .inner()
                .write_all_at(BlockNumber(SUPERBLOCK_BLOCK).to_byte_offset(), &bytes)?;
        }
        if inode_bitmap_dirty {
            self.dev
                .write_block(BlockNumber(sb.inode_bitmap_block), inode_bitmap.as_bytes())?;
        }
        if data_bitmap_dirty {
            self.dev
                .write_block(BlockNumber(sb.data_bitmap_block), data_bitmap.as_bytes())?;
        }
        self.write_inode_table(&sb, &inodes)?;
        self.dev.sync()?;

        debug!(
            target: "vsfs::check",
            event = "run_complete",
            sb_dirty,
            inode_bitmap_dirty,
            data_bitmap_dirty,
            summary = %report
        );

        report.line("VSFS consistency check complete.");
        Ok(report)
    }

    fn read_inode_table(&self, sb: &Superblock) -> Result<Vec<Inode>> {
        let count = sb.inode_count as usize;
        let mut table = vec![0_u8; count * INODE_RECORD_SIZE];
        self.dev
            .inner()
            .read_exact_at(BlockNumber(sb.inode_table_start).to_byte_offset(), &mut table)?;

        table
            .chunks_exact(INODE_RECORD_SIZE)
            .map(|record| {
                Inode::parse_from_bytes(record).map_err(|err| VsfsError::Format(err.to_string()))
            })
            .collect()
    }

    fn write_inode_table(&self, sb: &Superblock, inodes: &[Inode]) -> Result<()> {
        let mut table = Vec::with_capacity(inodes.len() * INODE_RECORD_SIZE);
        for inode in inodes {
            table.extend_from_slice(
                &inode
                    .encode()
                    .map_err(|err| VsfsError::Format(err.to_string()))?,
            );
        }
        self.dev
            .inner()
            .write_all_at(BlockNumber(sb.inode_table_start).to_byte_offset(), &table)
    }
}
