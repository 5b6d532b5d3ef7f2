#![forbid(unsafe_code)]
//! Packed on-disk record codecs.
//!
//! Decodes and re-encodes the VSFS superblock and inode records with
//! explicit little-endian field access. Reserved padding is carried
//! through both directions so that encoding an unmodified record
//! reproduces its input byte-for-byte. Pointer blocks are handled as
//! raw arrays of 1024 little-endian u32 entries.

use serde::{Deserialize, Serialize};
use vsfs_types::{
    BLOCK_SIZE, INODE_SIZE, INODE_TABLE_BLOCKS, NUM_DIRECT, POINTERS_PER_BLOCK, ParseError,
    ensure_slice, read_le_u16, read_le_u32, write_bytes, write_le_u16, write_le_u32,
};

/// On-disk size of the packed superblock record.
///
/// One u16 plus eight u32 fields plus 4058 reserved bytes: 4092, four
/// bytes short of a full block. The trailing bytes of block 0 are
/// never read or written.
pub const SUPERBLOCK_RECORD_SIZE: usize = 4092;

/// Reserved tail of the superblock record.
pub const SUPERBLOCK_RESERVED: usize = 4058;

/// On-disk size of a packed inode record.
pub const INODE_RECORD_SIZE: usize = INODE_SIZE as usize;

/// Reserved tail of an inode record.
pub const INODE_RESERVED: usize = 156;

// Superblock field offsets.
const SB_MAGIC: usize = 0x00;
const SB_BLOCK_SIZE: usize = 0x02;
const SB_TOTAL_BLOCKS: usize = 0x06;
const SB_INODE_BITMAP_BLOCK: usize = 0x0A;
const SB_DATA_BITMAP_BLOCK: usize = 0x0E;
const SB_INODE_TABLE_START: usize = 0x12;
const SB_FIRST_DATA_BLOCK: usize = 0x16;
const SB_INODE_SIZE: usize = 0x1A;
const SB_INODE_COUNT: usize = 0x1E;
const SB_RESERVED: usize = 0x22;

// Inode field offsets.
const IN_MODE: usize = 0x00;
const IN_UID: usize = 0x04;
const IN_GID: usize = 0x08;
const IN_FILE_SIZE: usize = 0x0C;
const IN_ATIME: usize = 0x10;
const IN_CTIME: usize = 0x14;
const IN_MTIME: usize = 0x18;
const IN_DTIME: usize = 0x1C;
const IN_N_LINKS: usize = 0x20;
const IN_BLOCK_COUNT: usize = 0x24;
const IN_DIRECT: usize = 0x28;
const IN_SINGLE_INDIRECT: usize = 0x58;
const IN_DOUBLE_INDIRECT: usize = 0x5C;
const IN_TRIPLE_INDIRECT: usize = 0x60;
const IN_RESERVED: usize = 0x64;

/// Decoded superblock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub magic: u16,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_bitmap_block: u32,
    pub data_bitmap_block: u32,
    pub inode_table_start: u32,
    pub first_data_block: u32,
    pub inode_size: u32,
    pub inode_count: u32,
    /// Reserved padding, preserved verbatim for byte-exact re-encoding.
    pub reserved: Vec<u8>,
}

impl Superblock {
    /// Parse a superblock record from the start of block 0.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < SUPERBLOCK_RECORD_SIZE {
            return Err(ParseError::InsufficientData {
                needed: SUPERBLOCK_RECORD_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            magic: read_le_u16(bytes, SB_MAGIC)?,
            block_size: read_le_u32(bytes, SB_BLOCK_SIZE)?,
            total_blocks: read_le_u32(bytes, SB_TOTAL_BLOCKS)?,
            inode_bitmap_block: read_le_u32(bytes, SB_INODE_BITMAP_BLOCK)?,
            data_bitmap_block: read_le_u32(bytes, SB_DATA_BITMAP_BLOCK)?,
            inode_table_start: read_le_u32(bytes, SB_INODE_TABLE_START)?,
            first_data_block: read_le_u32(bytes, SB_FIRST_DATA_BLOCK)?,
            inode_size: read_le_u32(bytes, SB_INODE_SIZE)?,
            inode_count: read_le_u32(bytes, SB_INODE_COUNT)?,
            reserved: ensure_slice(bytes, SB_RESERVED, SUPERBLOCK_RESERVED)?.to_vec(),
        })
    }

    /// Encode this record into a fresh `SUPERBLOCK_RECORD_SIZE` buffer.
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        if self.reserved.len() != SUPERBLOCK_RESERVED {
            return Err(ParseError::InvalidField {
                field: "reserved",
                reason: "superblock reserved area must be 4058 bytes",
            });
        }

        let mut bytes = vec![0_u8; SUPERBLOCK_RECORD_SIZE];
        write_le_u16(&mut bytes, SB_MAGIC, self.magic)?;
        write_le_u32(&mut bytes, SB_BLOCK_SIZE, self.block_size)?;
        write_le_u32(&mut bytes, SB_TOTAL_BLOCKS, self.total_blocks)?;
        write_le_u32(&mut bytes, SB_INODE_BITMAP_BLOCK, self.inode_bitmap_block)?;
        write_le_u32(&mut bytes, SB_DATA_BITMAP_BLOCK, self.data_bitmap_block)?;
        write_le_u32(&mut bytes, SB_INODE_TABLE_START, self.inode_table_start)?;
        write_le_u32(&mut bytes, SB_FIRST_DATA_BLOCK, self.first_data_block)?;
        write_le_u32(&mut bytes, SB_INODE_SIZE, self.inode_size)?;
        write_le_u32(&mut bytes, SB_INODE_COUNT, self.inode_count)?;
        write_bytes(&mut bytes, SB_RESERVED, &self.reserved)?;
        Ok(bytes)
    }

    /// Maximum inode count the inode table can physically hold, given
    /// the (possibly corrected) `block_size` and `inode_size`.
    #[must_use]
    pub fn max_inode_count(&self) -> u32 {
        let per_block = self.block_size.checked_div(self.inode_size).unwrap_or(0);
        INODE_TABLE_BLOCKS.saturating_mul(per_block)
    }
}

/// Decoded inode record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub file_size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub n_links: u32,
    pub block_count: u32,
    pub direct: [u32; NUM_DIRECT],
    pub single_indirect: u32,
    pub double_indirect: u32,
    pub triple_indirect: u32,
    /// Reserved padding, preserved verbatim for byte-exact re-encoding.
    pub reserved: Vec<u8>,
}

impl Inode {
    /// Parse one inode record from raw bytes.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < INODE_RECORD_SIZE {
            return Err(ParseError::InsufficientData {
                needed: INODE_RECORD_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let mut direct = [0_u32; NUM_DIRECT];
        for (slot, value) in direct.iter_mut().enumerate() {
            *value = read_le_u32(bytes, IN_DIRECT + slot * 4)?;
        }

        Ok(Self {
            mode: read_le_u32(bytes, IN_MODE)?,
            uid: read_le_u32(bytes, IN_UID)?,
            gid: read_le_u32(bytes, IN_GID)?,
            file_size: read_le_u32(bytes, IN_FILE_SIZE)?,
            atime: read_le_u32(bytes, IN_ATIME)?,
            ctime: read_le_u32(bytes, IN_CTIME)?,
            mtime: read_le_u32(bytes, IN_MTIME)?,
            dtime: read_le_u32(bytes, IN_DTIME)?,
            n_links: read_le_u32(bytes, IN_N_LINKS)?,
            block_count: read_le_u32(bytes, IN_BLOCK_COUNT)?,
            direct,
            single_indirect: read_le_u32(bytes, IN_SINGLE_INDIRECT)?,
            double_indirect: read_le_u32(bytes, IN_DOUBLE_INDIRECT)?,
            triple_indirect: read_le_u32(bytes, IN_TRIPLE_INDIRECT)?,
            reserved: ensure_slice(bytes, IN_RESERVED, INODE_RESERVED)?.to_vec(),
        })
    }

    /// Encode this record into a fresh `INODE_RECORD_SIZE` buffer.
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        if self.reserved.len() != INODE_RESERVED {
            return Err(ParseError::InvalidField {
                field: "reserved",
                reason: "inode reserved area must be 156 bytes",
            });
        }

        let mut bytes = vec![0_u8; INODE_RECORD_SIZE];
        write_le_u32(&mut bytes, IN_MODE, self.mode)?;
        write_le_u32(&mut bytes, IN_UID, self.uid)?;
        write_le_u32(&mut bytes, IN_GID, self.gid)?;
        write_le_u32(&mut bytes, IN_FILE_SIZE, self.file_size)?;
        write_le_u32(&mut bytes, IN_ATIME, self.atime)?;
        write_le_u32(&mut bytes, IN_CTIME, self.ctime)?;
        write_le_u32(&mut bytes, IN_MTIME, self.mtime)?;
        write_le_u32(&mut bytes, IN_DTIME, self.dtime)?;
        write_le_u32(&mut bytes, IN_N_LINKS, self.n_links)?;
        write_le_u32(&mut bytes, IN_BLOCK_COUNT, self.block_count)?;
        for (slot, value) in self.direct.iter().enumerate() {
            write_le_u32(&mut bytes, IN_DIRECT + slot * 4, *value)?;
        }
        write_le_u32(&mut bytes, IN_SINGLE_INDIRECT, self.single_indirect)?;
        write_le_u32(&mut bytes, IN_DOUBLE_INDIRECT, self.double_indirect)?;
        write_le_u32(&mut bytes, IN_TRIPLE_INDIRECT, self.triple_indirect)?;
        write_bytes(&mut bytes, IN_RESERVED, &self.reserved)?;
        Ok(bytes)
    }

    /// A live inode has at least one hard link and no deletion time.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.n_links > 0 && self.dtime == 0
    }

    /// An all-zero record with a well-formed reserved area.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            mode: 0,
            uid: 0,
            gid: 0,
            file_size: 0,
            atime: 0,
            ctime: 0,
            mtime: 0,
            dtime: 0,
            n_links: 0,
            block_count: 0,
            direct: [0; NUM_DIRECT],
            single_indirect: 0,
            double_indirect: 0,
            triple_indirect: 0,
            reserved: vec![0; INODE_RESERVED],
        }
    }
}

/// Decode a pointer block: `POINTERS_PER_BLOCK` little-endian u32 entries.
pub fn decode_pointers(bytes: &[u8]) -> Result<Vec<u32>, ParseError> {
    if bytes.len() < BLOCK_SIZE as usize {
        return Err(ParseError::InsufficientData {
            needed: BLOCK_SIZE as usize,
            offset: 0,
            actual: bytes.len(),
        });
    }

    Ok(bytes[..BLOCK_SIZE as usize]
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Encode a pointer block back to its raw byte form.
pub fn encode_pointers(pointers: &[u32]) -> Result<Vec<u8>, ParseError> {
    if pointers.len() != POINTERS_PER_BLOCK {
        return Err(ParseError::InvalidField {
            field: "pointers",
            reason: "pointer block must hold exactly 1024 entries",
        });
    }

    let mut bytes = Vec::with_capacity(BLOCK_SIZE as usize);
    for pointer in pointers {
        bytes.extend_from_slice(&pointer.to_le_bytes());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_superblock_bytes() -> Vec<u8> {
        let mut bytes = vec![0_u8; SUPERBLOCK_RECORD_SIZE];
        bytes[0] = 0x4D;
        bytes[1] = 0xD3;
        write_le_u32(&mut bytes, SB_BLOCK_SIZE, 4096).expect("block_size");
        write_le_u32(&mut bytes, SB_TOTAL_BLOCKS, 64).expect("total_blocks");
        write_le_u32(&mut bytes, SB_INODE_BITMAP_BLOCK, 1).expect("inode bitmap");
        write_le_u32(&mut bytes, SB_DATA_BITMAP_BLOCK, 2).expect("data bitmap");
        write_le_u32(&mut bytes, SB_INODE_TABLE_START, 3).expect("table start");
        write_le_u32(&mut bytes, SB_FIRST_DATA_BLOCK, 8).expect("first data");
        write_le_u32(&mut bytes, SB_INODE_SIZE, 256).expect("inode size");
        write_le_u32(&mut bytes, SB_INODE_COUNT, 80).expect("inode count");
        // Non-zero reserved area so round-trip failures are visible.
        bytes[SB_RESERVED + 7] = 0x5A;
        bytes
    }

    #[test]
    fn superblock_fields_decode() {
        let sb = Superblock::parse_from_bytes(&sample_superblock_bytes()).expect("parse");
        assert_eq!(sb.magic, 0xD34D);
        assert_eq!(sb.block_size, 4096);
        assert_eq!(sb.total_blocks, 64);
        assert_eq!(sb.inode_bitmap_block, 1);
        assert_eq!(sb.data_bitmap_block, 2);
        assert_eq!(sb.inode_table_start, 3);
        assert_eq!(sb.first_data_block, 8);
        assert_eq!(sb.inode_size, 256);
        assert_eq!(sb.inode_count, 80);
    }

    #[test]
    fn superblock_round_trip_is_byte_exact() {
        let bytes = sample_superblock_bytes();
        let sb = Superblock::parse_from_bytes(&bytes).expect("parse");
        assert_eq!(sb.encode().expect("encode"), bytes);
    }

    #[test]
    fn superblock_short_buffer_is_rejected() {
        let err = Superblock::parse_from_bytes(&[0_u8; 100]).expect_err("short");
        assert!(matches!(err, ParseError::InsufficientData { .. }));
    }

    #[test]
    fn max_inode_count_uses_corrected_geometry() {
        let mut sb = Superblock::parse_from_bytes(&sample_superblock_bytes()).expect("parse");
        assert_eq!(sb.max_inode_count(), 80);
        sb.inode_size = 0;
        assert_eq!(sb.max_inode_count(), 0, "division by zero saturates");
    }

    fn sample_inode_bytes() -> Vec<u8> {
        let mut bytes = vec![0_u8; INODE_RECORD_SIZE];
        write_le_u32(&mut bytes, IN_MODE, 0o100644).expect("mode");
        write_le_u32(&mut bytes, IN_FILE_SIZE, 5000).expect("size");
        write_le_u32(&mut bytes, IN_N_LINKS, 1).expect("links");
        write_le_u32(&mut bytes, IN_BLOCK_COUNT, 2).expect("count");
        write_le_u32(&mut bytes, IN_DIRECT, 8).expect("direct 0");
        write_le_u32(&mut bytes, IN_DIRECT + 4, 9).expect("direct 1");
        write_le_u32(&mut bytes, IN_SINGLE_INDIRECT, 10).expect("single");
        bytes[IN_RESERVED + 3] = 0xEE;
        bytes
    }

    #[test]
    fn inode_fields_decode() {
        let inode = Inode::parse_from_bytes(&sample_inode_bytes()).expect("parse");
        assert_eq!(inode.mode, 0o100644);
        assert_eq!(inode.file_size, 5000);
        assert_eq!(inode.n_links, 1);
        assert_eq!(inode.direct[0], 8);
        assert_eq!(inode.direct[1], 9);
        assert_eq!(inode.direct[2], 0);
        assert_eq!(inode.single_indirect, 10);
        assert_eq!(inode.triple_indirect, 0);
    }

    #[test]
    fn inode_round_trip_is_byte_exact() {
        let bytes = sample_inode_bytes();
        let inode = Inode::parse_from_bytes(&bytes).expect("parse");
        assert_eq!(inode.encode().expect("encode"), bytes);
    }

    #[test]
    fn liveness_requires_links_and_no_dtime() {
        let mut inode = Inode::parse_from_bytes(&sample_inode_bytes()).expect("parse");
        assert!(inode.is_live());
        inode.dtime = 1_700_000_000;
        assert!(!inode.is_live());
        inode.dtime = 0;
        inode.n_links = 0;
        assert!(!inode.is_live());
    }

    #[test]
    fn pointer_block_round_trip() {
        let mut pointers = vec![0_u32; POINTERS_PER_BLOCK];
        pointers[0] = 8;
        pointers[1023] = 63;
        let bytes = encode_pointers(&pointers).expect("encode");
        assert_eq!(bytes.len(), BLOCK_SIZE as usize);
        assert_eq!(decode_pointers(&bytes).expect("decode"), pointers);
    }

    #[test]
    fn pointer_block_length_is_enforced() {
        assert!(matches!(
            decode_pointers(&[0_u8; 512]),
            Err(ParseError::InsufficientData { .. })
        ));
        assert!(matches!(
            encode_pointers(&[0_u32; 10]),
            Err(ParseError::InvalidField { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn superblock_parse_never_panics_and_round_trips(
            bytes in proptest::collection::vec(any::<u8>(), 0..=SUPERBLOCK_RECORD_SIZE + 64),
        ) {
            if let Ok(sb) = Superblock::parse_from_bytes(&bytes) {
                prop_assert_eq!(sb.encode().expect("encode"), &bytes[..SUPERBLOCK_RECORD_SIZE]);
            }
        }

        #[test]
        fn inode_parse_never_panics_and_round_trips(
            bytes in proptest::collection::vec(any::<u8>(), 0..=INODE_RECORD_SIZE + 64),
        ) {
            if let Ok(inode) = Inode::parse_from_bytes(&bytes) {
                prop_assert_eq!(inode.encode().expect("encode"), &bytes[..INODE_RECORD_SIZE]);
            }
        }
    }
}
