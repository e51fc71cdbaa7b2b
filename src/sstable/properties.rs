//! Table properties: statistics recorded once when a table is built.
//!
//! Properties are stored as a regular block whose entries map a property
//! name to its value, sorted by name. Built-in properties use names under
//! [`RESERVED_PROPERTY_PREFIX`] and varint values; user properties are
//! opaque blobs stored verbatim.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::util::coding::{decode_varint64_exact, encode_varint64};
use crate::{Error, Result};

use super::block::Block;
use super::block_builder::BlockBuilder;
use super::CompressionType;

/// Names starting with this prefix are reserved for built-in properties.
pub const RESERVED_PROPERTY_PREFIX: &str = "sst.";

const NUM_ENTRIES: &str = "sst.num.entries";
const RAW_KEY_SIZE: &str = "sst.raw.key.size";
const RAW_VALUE_SIZE: &str = "sst.raw.value.size";
const DATA_SIZE: &str = "sst.data.size";
const INDEX_SIZE: &str = "sst.index.size";
const FILTER_SIZE: &str = "sst.filter.size";
const NUM_DATA_BLOCKS: &str = "sst.num.data.blocks";
const COMPRESSION: &str = "sst.compression";
const SMALLEST_KEY: &str = "sst.smallest.key";
const LARGEST_KEY: &str = "sst.largest.key";

/// Immutable statistics attached to a table at build time.
///
/// Every reader of a table exposes the same decoded value; scans hand it to
/// their `table_filter` by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableProperties {
    /// Number of key-value entries.
    pub num_entries: u64,
    /// Total bytes of all keys.
    pub raw_key_size: u64,
    /// Total bytes of all values.
    pub raw_value_size: u64,
    /// On-disk size of all data blocks, trailers included.
    pub data_size: u64,
    /// On-disk size of the index block.
    pub index_size: u64,
    /// On-disk size of the filter block.
    pub filter_size: u64,
    /// Number of data blocks.
    pub num_data_blocks: u64,
    /// Compression requested for data blocks.
    pub compression: CompressionType,
    /// Smallest key in the table.
    pub smallest_key: Bytes,
    /// Largest key in the table.
    pub largest_key: Bytes,
    /// Pre-computed user statistics, by collector name.
    pub user_collected: BTreeMap<String, Bytes>,
}

impl TableProperties {
    /// Uncompressed size of all keys and values.
    pub fn raw_data_size(&self) -> u64 {
        self.raw_key_size + self.raw_value_size
    }

    /// Look up a user-collected property.
    pub fn user_property(&self, name: &str) -> Option<&Bytes> {
        self.user_collected.get(name)
    }

    /// Approximate heap memory held by this value.
    pub fn approximate_memory_usage(&self) -> usize {
        let user: usize = self
            .user_collected
            .iter()
            .map(|(name, value)| name.len() + value.len())
            .sum();
        std::mem::size_of::<Self>() + self.smallest_key.len() + self.largest_key.len() + user
    }

    /// Encode as a block (without trailer).
    pub(crate) fn encode_block(&self) -> Result<Bytes> {
        let mut entries: BTreeMap<&str, Bytes> = BTreeMap::new();

        for (name, value) in [
            (NUM_ENTRIES, self.num_entries),
            (RAW_KEY_SIZE, self.raw_key_size),
            (RAW_VALUE_SIZE, self.raw_value_size),
            (DATA_SIZE, self.data_size),
            (INDEX_SIZE, self.index_size),
            (FILTER_SIZE, self.filter_size),
            (NUM_DATA_BLOCKS, self.num_data_blocks),
            (COMPRESSION, self.compression.to_byte() as u64),
        ] {
            let mut buf = BytesMut::with_capacity(10);
            encode_varint64(&mut buf, value);
            entries.insert(name, buf.freeze());
        }
        entries.insert(SMALLEST_KEY, self.smallest_key.clone());
        entries.insert(LARGEST_KEY, self.largest_key.clone());

        for (name, value) in &self.user_collected {
            if name.starts_with(RESERVED_PROPERTY_PREFIX) {
                return Err(Error::InvalidArgument(format!(
                    "property name {:?} uses the reserved prefix {:?}",
                    name, RESERVED_PROPERTY_PREFIX
                )));
            }
            entries.insert(name.as_str(), value.clone());
        }

        let mut builder = BlockBuilder::new();
        for (name, value) in &entries {
            builder.add(name.as_bytes(), value);
        }
        Ok(builder.finish())
    }

    /// Decode from a properties block.
    ///
    /// Unknown reserved names are skipped so newer writers stay readable.
    pub(crate) fn decode_block(block: &Block) -> Result<Self> {
        let mut props = TableProperties::default();

        let mut iter = block.iter();
        iter.seek_to_first();
        while iter.valid() {
            let name = std::str::from_utf8(iter.key())
                .map_err(|_| Error::corruption("property name is not valid UTF-8"))?;
            let value = iter.value();

            let varint = || {
                decode_varint64_exact(value)
                    .ok_or_else(|| Error::corruption(format!("malformed property {}", name)))
            };

            match name {
                NUM_ENTRIES => props.num_entries = varint()?,
                RAW_KEY_SIZE => props.raw_key_size = varint()?,
                RAW_VALUE_SIZE => props.raw_value_size = varint()?,
                DATA_SIZE => props.data_size = varint()?,
                INDEX_SIZE => props.index_size = varint()?,
                FILTER_SIZE => props.filter_size = varint()?,
                NUM_DATA_BLOCKS => props.num_data_blocks = varint()?,
                COMPRESSION => {
                    props.compression = u8::try_from(varint()?)
                        .ok()
                        .and_then(CompressionType::from_byte)
                        .ok_or_else(|| Error::corruption("unknown compression property"))?;
                }
                SMALLEST_KEY => props.smallest_key = value.clone(),
                LARGEST_KEY => props.largest_key = value.clone(),
                _ if name.starts_with(RESERVED_PROPERTY_PREFIX) => {}
                _ => {
                    props.user_collected.insert(name.to_string(), value.clone());
                }
            }
            iter.next();
        }

        if iter.is_corrupted() {
            return Err(Error::corruption("malformed properties block"));
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableProperties {
        let mut props = TableProperties {
            num_entries: 3,
            raw_key_size: 3,
            raw_value_size: 300,
            data_size: 128,
            index_size: 40,
            filter_size: 9,
            num_data_blocks: 1,
            compression: CompressionType::Snappy,
            smallest_key: Bytes::from_static(b"d"),
            largest_key: Bytes::from_static(b"f"),
            user_collected: BTreeMap::new(),
        };
        props
            .user_collected
            .insert("max.timestamp".to_string(), Bytes::from_static(&[0, 0, 1, 0]));
        props
    }

    #[test]
    fn test_properties_block_roundtrip() {
        let props = sample();
        let block = Block::new(props.encode_block().unwrap()).unwrap();
        let decoded = TableProperties::decode_block(&block).unwrap();

        assert_eq!(decoded, props);
        assert_eq!(decoded.raw_data_size(), 303);
        assert_eq!(
            decoded.user_property("max.timestamp").map(|v| v.as_ref()),
            Some(&[0u8, 0, 1, 0][..])
        );
        assert!(decoded.user_property("missing").is_none());
    }

    #[test]
    fn test_properties_reject_reserved_user_name() {
        let mut props = sample();
        props
            .user_collected
            .insert("sst.num.entries".to_string(), Bytes::from_static(b"x"));
        assert!(matches!(
            props.encode_block(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_properties_skip_unknown_reserved_names() {
        let mut builder = BlockBuilder::new();
        builder.add(b"sst.future.thing", b"\x01");
        builder.add(b"sst.num.entries", b"\x07");
        let block = Block::new(builder.finish()).unwrap();

        let decoded = TableProperties::decode_block(&block).unwrap();
        assert_eq!(decoded.num_entries, 7);
        assert!(decoded.user_collected.is_empty());
    }

    #[test]
    fn test_properties_malformed_varint() {
        let mut builder = BlockBuilder::new();
        builder.add(b"sst.num.entries", b"\x80");
        let block = Block::new(builder.finish()).unwrap();

        let err = TableProperties::decode_block(&block).unwrap_err();
        assert!(err.is_corruption());
    }
}
