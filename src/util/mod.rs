//! Shared helpers: varint coding, checksums and file naming.

pub mod coding;
pub mod crc;
pub mod filename;
