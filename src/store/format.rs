//! Store file format constants and child-offset helpers.
//!
//! The layout follows the Ogawa scheme: a 16-byte header, size-prefixed data
//! blocks and groups that are plain lists of child offsets. The most
//! significant bit of a child offset tells data blocks from groups.

/// Magic bytes at the start of a store file.
pub const STORE_MAGIC: &[u8; 5] = b"GEOH5";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current store format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once the file has been completely written.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the file is being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// MSB set = data block, MSB clear = group.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the actual offset from a child pointer.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Offset of an empty data block (unallocated chunk).
pub const EMPTY_DATA: u64 = TYPE_FLAG_MASK;

/// Node header kinds, stored as the first byte of a node's header block.
pub const NODE_KIND_GROUP: u8 = 0;
pub const NODE_KIND_DATASET: u8 = 1;

/// Element type tags.
pub const ELEMENT_NUMERIC: u8 = 0;
pub const ELEMENT_FIXED_STRING: u8 = 1;
pub const ELEMENT_VAR_STRING: u8 = 2;

/// Attribute value tags.
pub const ATTR_INT: u8 = 0;
pub const ATTR_UINT: u8 = 1;
pub const ATTR_FLOAT: u8 = 2;
pub const ATTR_FIXED_TEXT: u8 = 3;
pub const ATTR_VAR_TEXT: u8 = 4;

/// Chunk payload encodings, stored as the first byte of a chunk block.
pub const CHUNK_RAW: u8 = 0;
pub const CHUNK_ZLIB: u8 = 1;

#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

/// Check if an offset is the "empty" marker for groups or data.
#[inline]
pub const fn is_empty_offset(offset: u64) -> bool {
    extract_offset(offset) == 0
}
