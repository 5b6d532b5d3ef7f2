#![forbid(unsafe_code)]
//! Image I/O layer.
//!
//! Provides the `ByteDevice` trait for fixed-offset reads and writes,
//! a file-backed implementation, and `ByteBlockDevice` for
//! block-granular access on top of any byte device.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::Path;
use tracing::trace;
use vsfs_error::{Result, VsfsError};
use vsfs_types::{BlockNumber, ByteOffset};

/// Byte-addressed device for fixed-offset I/O (pread/pwrite semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`.
    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

/// File-backed byte device using `pread`/`pwrite` style I/O.
///
/// Uses `std::os::unix::fs::FileExt`, which does not require a shared
/// seek position. The file is opened read+write and held for the
/// lifetime of the device.
#[derive(Debug)]
pub struct FileByteDevice {
    file: File,
    len: u64,
}

impl FileByteDevice {
    /// Open `path` for read+write random access.
    ///
    /// A failure to open surfaces as `VsfsError::ImageUnavailable` so
    /// the caller can distinguish "no image" from mid-run I/O faults.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| VsfsError::ImageUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        let len = file.metadata()?.len();
        trace!(target: "vsfs::block", event = "image_open", path = %path.display(), len_bytes = len);
        Ok(Self { file, len })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;

        let mut done = 0_usize;
        while done < buf.len() {
            let at = offset.0 + done as u64;
            match self.file.read_at(&mut buf[done..], at) {
                Ok(0) => {
                    return Err(VsfsError::ShortRead {
                        offset: offset.0,
                        expected: buf.len(),
                        got: done,
                    });
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;

        let mut done = 0_usize;
        while done < buf.len() {
            let at = offset.0 + done as u64;
            match self.file.write_at(&buf[done..], at) {
                Ok(0) => {
                    return Err(VsfsError::ShortWrite {
                        offset: offset.0,
                        expected: buf.len(),
                        got: done,
                    });
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

fn check_range(offset: ByteOffset, len: usize, device_len: u64) -> Result<()> {
    let end = offset
        .0
        .checked_add(len as u64)
        .ok_or_else(|| VsfsError::Format("byte range overflows u64".to_owned()))?;
    if end > device_len {
        return Err(VsfsError::Format(format!(
            "access out of bounds: offset={offset} len={len} device_len={device_len}"
        )));
    }
    Ok(())
}

/// Block-granular view over a byte device.
///
/// Invariant: the device length is a whole number of blocks.
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_size: u32,
    block_count: u32,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D, block_size: u32) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(VsfsError::Format(format!(
                "invalid block_size={block_size} (must be power of two)"
            )));
        }

        let len = inner.len_bytes();
        let remainder = len % u64::from(block_size);
        if remainder != 0 {
            return Err(VsfsError::Format(format!(
                "image length is not block-aligned: len_bytes={len} block_size={block_size} remainder={remainder}"
            )));
        }
        let block_count = u32::try_from(len / u64::from(block_size))
            .map_err(|_| VsfsError::Format("block count does not fit u32".to_owned()))?;
        Ok(Self {
            inner,
            block_size,
            block_count,
        })
    }

    /// Byte-granular access to the underlying device.
    ///
    /// The inode table write-back is `inode_count * 256` bytes and is
    /// not block-aligned, so the driver needs both granularities.
    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn read_block(&self, block: BlockNumber) -> Result<Vec<u8>> {
        self.check_block(block)?;
        let mut buf = vec![0_u8; self.block_size as usize];
        self.inner.read_exact_at(block.to_byte_offset(), &mut buf)?;
        trace!(target: "vsfs::block", event = "block_read", block = block.0);
        Ok(buf)
    }

    pub fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()> {
        self.check_block(block)?;
        if data.len() != self.block_size as usize {
            return Err(VsfsError::Format(format!(
                "write_block data size mismatch: got={} expected={}",
                data.len(),
                self.block_size
            )));
        }
        self.inner.write_all_at(block.to_byte_offset(), data)?;
        trace!(target: "vsfs::block", event = "block_write", block = block.0);
        Ok(())
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.sync()
    }

    fn check_block(&self, block: BlockNumber) -> Result<()> {
        if block.0 >= self.block_count {
            return Err(VsfsError::Format(format!(
                "block out of range: block={} block_count={}",
                block.0, self.block_count
            )));
        }
        Ok(())
    }
}
