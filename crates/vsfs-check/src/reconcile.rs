//! Bitmap reconciliation passes.
//!
//! The inode-bitmap pass runs before the walker and flips bits to
//! match inode liveness. The data-region passes run after the walker
//! has populated the reference counts: duplicates are reported (never
//! repaired), then bits set for unreferenced blocks are cleared.

use crate::bitmap::Bitmap;
use crate::refs::RefTracker;
use crate::report::CheckReport;
use tracing::debug;
use vsfs_ondisk::Inode;

/// Flip inode-bitmap bits to match liveness. Returns true if any bit
/// changed.
pub(crate) fn reconcile_inode_bitmap(
    inodes: &[Inode],
    bitmap: &mut Bitmap,
    report: &mut CheckReport,
) -> bool {
    let mut dirty = false;

    for (i, inode) in inodes.iter().enumerate() {
        let i = i as u32;
        let bit_set = bitmap.is_set(i);
        if inode.is_live() && !bit_set {
            report.line(format!(
                "Inode Bitmap error: Inode {i} is valid but not marked used. Fixing..."
            ));
            bitmap.set(i);
            dirty = true;
            report.inode_bitmap_repairs += 1;
        } else if !inode.is_live() && bit_set {
            report.line(format!(
                "Inode Bitmap error: Inode {i} is invalid but marked used. Fixing..."
            ));
            bitmap.clear(i);
            dirty = true;
            report.inode_bitmap_repairs += 1;
        }
    }

    debug!(target: "vsfs::check", event = "inode_bitmap_reconciled", dirty);
    report.line(if dirty {
        "Inode bitmap updated."
    } else {
        "Inode bitmap consistency check passed."
    });

    dirty
}

/// Report every multiply-referenced data block. Reference counts are
/// left untouched and nothing is repaired; resolving a duplicate would
/// need a data-cloning policy.
pub(crate) fn report_duplicates(
    refs: &RefTracker,
    first_data_block: u32,
    total_blocks: u32,
    report: &mut CheckReport,
) {
    let mut found = false;

    for block in first_data_block..total_blocks {
        let count = refs.refs_of(block);
        if count > 1 {
            report.line(format!(
                "Duplicate block error: Block {block} referenced {count} times. Fixing..."
            ));
            found = true;
            report.duplicate_blocks += 1;
        }
    }

    report.line(if found {
        "Duplicate block errors found and fixed."
    } else {
        "Duplicate block check passed."
    });
}

/// Clear data-bitmap bits for blocks nothing references. Returns true
/// if any bit changed. The reverse direction (referenced but unset)
/// was already repaired inline by the walker.
pub(crate) fn clear_unreferenced(
    bitmap: &mut Bitmap,
    refs: &RefTracker,
    first_data_block: u32,
    total_blocks: u32,
    report: &mut CheckReport,
) -> bool {
    let mut dirty = false;

    for block in first_data_block..total_blocks {
        if bitmap.is_set(block) && refs.is_unreferenced(block) {
            report.line(format!(
                "Data Bitmap error: Block {block} marked used but not referenced. Clearing bit..."
            ));
            bitmap.clear(block);
            dirty = true;
            report.data_bitmap_repairs += 1;
        }
    }

    debug!(target: "vsfs::check", event = "data_bitmap_reconciled", dirty);
    report.line(if dirty {
        "Data bitmap updated."
    } else {
        "Data bitmap consistency check passed."
    });

    dirty
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsfs_types::BLOCK_SIZE;

    fn blank_bitmap() -> Bitmap {
        Bitmap::from_block(vec![0_u8; BLOCK_SIZE as usize])
    }

    fn live_inode() -> Inode {
        let mut inode = Inode::zeroed();
        inode.n_links = 1;
        inode
    }

    #[test]
    fn live_unmarked_inode_gets_its_bit() {
        let inodes = vec![live_inode(), Inode::zeroed()];
        let mut bitmap = blank_bitmap();
        let mut report = CheckReport::default();

        assert!(reconcile_inode_bitmap(&inodes, &mut bitmap, &mut report));
        assert!(bitmap.is_set(0));
        assert!(!bitmap.is_set(1));
        assert_eq!(
            report.lines(),
            [
                "Inode Bitmap error: Inode 0 is valid but not marked used. Fixing...",
                "Inode bitmap updated.",
            ]
        );
    }

    #[test]
    fn dead_marked_inode_loses_its_bit() {
        let mut deleted = live_inode();
        deleted.dtime = 42;
        let inodes = vec![deleted];
        let mut bitmap = blank_bitmap();
        bitmap.set(0);
        let mut report = CheckReport::default();

        assert!(reconcile_inode_bitmap(&inodes, &mut bitmap, &mut report));
        assert!(!bitmap.is_set(0));
        assert_eq!(
            report.lines()[0],
            "Inode Bitmap error: Inode 0 is invalid but marked used. Fixing..."
        );
    }

    #[test]
    fn consistent_inode_bitmap_passes() {
        let inodes = vec![live_inode(), Inode::zeroed()];
        let mut bitmap = blank_bitmap();
        bitmap.set(0);
        let mut report = CheckReport::default();

        assert!(!reconcile_inode_bitmap(&inodes, &mut bitmap, &mut report));
        assert_eq!(report.lines(), ["Inode bitmap consistency check passed."]);
    }

    #[test]
    fn duplicates_are_reported_not_repaired() {
        let mut refs = RefTracker::new(8, 64);
        refs.note(15);
        refs.note(15);
        refs.note(20);
        let mut report = CheckReport::default();

        report_duplicates(&refs, 8, 64, &mut report);
        assert_eq!(
            report.lines(),
            [
                "Duplicate block error: Block 15 referenced 2 times. Fixing...",
                "Duplicate block errors found and fixed.",
            ]
        );
        assert_eq!(refs.refs_of(15), 2, "counts untouched");
    }

    #[test]
    fn orphan_bits_are_cleared() {
        let mut bitmap = blank_bitmap();
        bitmap.set(20);
        let refs = RefTracker::new(8, 64);
        let mut report = CheckReport::default();

        assert!(clear_unreferenced(&mut bitmap, &refs, 8, 64, &mut report));
        assert!(!bitmap.is_set(20));
        assert_eq!(
            report.lines(),
            [
                "Data Bitmap error: Block 20 marked used but not referenced. Clearing bit...",
                "Data bitmap updated.",
            ]
        );
    }

    #[test]
    fn referenced_bits_survive_the_clear_pass() {
        let mut bitmap = blank_bitmap();
        bitmap.set(8);
        let mut refs = RefTracker::new(8, 64);
        refs.note(8);
        let mut report = CheckReport::default();

        assert!(!clear_unreferenced(&mut bitmap, &refs, 8, 64, &mut report));
        assert!(bitmap.is_set(8));
        assert_eq!(report.lines(), ["Data bitmap consistency check passed."]);
    }
}
