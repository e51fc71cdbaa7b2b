//! CRC32 checksum utilities for block trailers.

use crc32fast::Hasher;

/// Compute CRC32 checksum of multiple data slices.
pub fn crc32_multi(slices: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for slice in slices {
        hasher.update(slice);
    }
    hasher.finalize()
}

/// Mask a CRC value for storage.
///
/// This helps avoid problems with CRCs that happen to contain
/// the same bytes as common data patterns.
pub fn mask_crc(crc: u32) -> u32 {
    // Rotate right by 15 bits and add a constant.
    ((crc >> 15) | (crc << 17)).wrapping_add(0xa282ead8)
}

/// Masked checksum stored in a block trailer.
///
/// Covers the block contents followed by the compression type byte.
pub fn block_checksum(content: &[u8], compression: u8) -> u32 {
    mask_crc(crc32_multi(&[content, &[compression]]))
}
