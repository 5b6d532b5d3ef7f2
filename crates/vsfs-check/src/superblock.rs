//! Superblock validation against the canonical VSFS layout.

use crate::report::CheckReport;
use tracing::debug;
use vsfs_ondisk::Superblock;
use vsfs_types::{
    BLOCK_SIZE, DATA_BITMAP_BLOCK, FIRST_DATA_BLOCK, INODE_BITMAP_BLOCK, INODE_SIZE,
    INODE_TABLE_START, TOTAL_BLOCKS, VSFS_MAGIC,
};

/// Compare every superblock field to its canonical constant, patching
/// mismatches in memory and reporting each one. Returns true if any
/// field was patched (the caller must then write the superblock back).
///
/// Fields are checked in on-disk order, so `block_size` and
/// `inode_size` are already corrected by the time the dynamic
/// `inode_count` bound is computed.
pub(crate) fn validate(sb: &mut Superblock, report: &mut CheckReport) -> bool {
    let mut patched = false;

    if sb.magic != VSFS_MAGIC {
        report.line(format!(
            "Superblock error: Magic number incorrect. Expected 0x{VSFS_MAGIC:x}, got 0x{:x}. Fixing...",
            sb.magic
        ));
        sb.magic = VSFS_MAGIC;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.block_size != BLOCK_SIZE {
        report.line(format!(
            "Superblock error: Block size incorrect. Expected {BLOCK_SIZE}, got {}. Fixing...",
            sb.block_size
        ));
        sb.block_size = BLOCK_SIZE;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.total_blocks != TOTAL_BLOCKS {
        report.line(format!(
            "Superblock error: Total blocks incorrect. Expected {TOTAL_BLOCKS}, got {}. Fixing...",
            sb.total_blocks
        ));
        sb.total_blocks = TOTAL_BLOCKS;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.inode_bitmap_block != INODE_BITMAP_BLOCK {
        report.line(format!(
            "Superblock error: Inode bitmap block incorrect. Expected {INODE_BITMAP_BLOCK}, got {}. Fixing...",
            sb.inode_bitmap_block
        ));
        sb.inode_bitmap_block = INODE_BITMAP_BLOCK;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.data_bitmap_block != DATA_BITMAP_BLOCK {
        report.line(format!(
            "Superblock error: Data bitmap block incorrect. Expected {DATA_BITMAP_BLOCK}, got {}. Fixing...",
            sb.data_bitmap_block
        ));
        sb.data_bitmap_block = DATA_BITMAP_BLOCK;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.inode_table_start != INODE_TABLE_START {
        report.line(format!(
            "Superblock error: Inode table start incorrect. Expected {INODE_TABLE_START}, got {}. Fixing...",
            sb.inode_table_start
        ));
        sb.inode_table_start = INODE_TABLE_START;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.first_data_block != FIRST_DATA_BLOCK {
        report.line(format!(
            "Superblock error: First data block incorrect. Expected {FIRST_DATA_BLOCK}, got {}. Fixing...",
            sb.first_data_block
        ));
        sb.first_data_block = FIRST_DATA_BLOCK;
        patched = true;
        report.superblock_repairs += 1;
    }
    if sb.inode_size != INODE_SIZE {
        report.line(format!(
            "Superblock error: Inode size incorrect. Expected {INODE_SIZE}, got {}. Fixing...",
            sb.inode_size
        ));
        sb.inode_size = INODE_SIZE;
        patched = true;
        report.superblock_repairs += 1;
    }

    let max_inodes = sb.max_inode_count();
    if sb.inode_count > max_inodes {
        report.line(format!(
            "Superblock error: inode count ({}) exceeds maximum possible ({max_inodes}). Fixing...",
            sb.inode_count
        ));
        sb.inode_count = max_inodes;
        patched = true;
        report.superblock_repairs += 1;
    }

    debug!(
        target: "vsfs::check",
        event = "superblock_validated",
        patched,
        inode_count = sb.inode_count
    );

    report.line(if patched {
        "Superblock errors fixed."
    } else {
        "Superblock validated successfully."
    });

    patched
}
