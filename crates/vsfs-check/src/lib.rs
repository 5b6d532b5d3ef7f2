#![forbid(unsafe_code)]
//! Consistency checking and in-place repair for VSFS images.
//!
//! The engine validates the superblock against its canonical layout,
//! reconciles the inode bitmap with inode liveness, walks every live
//! inode's direct and indirect block trees while counting references
//! and repairing bad pointers in place, and finally reconciles the data
//! bitmap against the collected reference counts. Repairs are written
//! back to the image at the end of a run; the ordered textual report is
//! collected into a [`CheckReport`].
//!
//! Phase order is part of the external contract: superblock, bitmap and
//! inode-table load, inode-bitmap pass, walk, duplicate scan, bad-block
//! summary, unreferenced-clear pass, write-back.

pub mod bitmap;
pub mod refs;
pub mod report;

mod fsck;
mod reconcile;
mod superblock;
mod walker;

pub use bitmap::Bitmap;
pub use fsck::Fsck;
pub use refs::RefTracker;
pub use report::CheckReport;
