//! Wire framing
//!
//! Registry-framed messages start with a magic byte and the big-endian schema id:
//!
//! ```text
//! [0x00][schema id: u32 BE][payload]
//! ```
//!
//! Protobuf payloads are additionally prefixed with the index path of the message
//! type inside its schema file. The path is written as a zig-zag varint count
//! followed by that many zig-zag varint indexes, except for the first top-level
//! message (`[0]`), which is written as the single byte `0x00`.

use crate::velostream::schema::{SchemaId, NO_SCHEMA_ID};
use crate::velostream::serialization::{SerializationError, SerializationResult};

pub const MAGIC_BYTE: u8 = 0x0;

/// Registry envelope codec
pub struct WireFramer;

impl WireFramer {
    /// Magic byte plus four id bytes
    pub const PREFIX_LENGTH: usize = 5;

    /// Schema id of an enveloped message, [`NO_SCHEMA_ID`] when the magic byte is absent
    pub fn extract_id(data: &[u8]) -> SchemaId {
        match data {
            [MAGIC_BYTE, a, b, c, d, ..] => i32::from_be_bytes([*a, *b, *c, *d]),
            _ => NO_SCHEMA_ID,
        }
    }

    /// Schema id and payload offset, or `None` when `data` carries no usable envelope
    pub fn decode(data: &[u8]) -> Option<(SchemaId, usize)> {
        let schema_id = Self::extract_id(data);
        (schema_id > NO_SCHEMA_ID).then_some((schema_id, Self::PREFIX_LENGTH))
    }

    pub fn encode_prefix(schema_id: SchemaId, out: &mut Vec<u8>) {
        out.push(MAGIC_BYTE);
        out.extend_from_slice(&schema_id.to_be_bytes());
    }

    pub fn encode(schema_id: SchemaId, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PREFIX_LENGTH + payload.len());
        Self::encode_prefix(schema_id, &mut out);
        out.extend_from_slice(payload);
        out
    }
}

/// Location of a message type within a Protobuf schema file.
///
/// Holds the message indexes from the file root, without the count that
/// precedes them on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexPath(Vec<i32>);

impl IndexPath {
    /// The first top-level message
    pub fn canonical() -> Self {
        IndexPath(vec![0])
    }

    /// An empty index list addresses the first top-level message
    pub fn new(indexes: Vec<i32>) -> Self {
        if indexes.is_empty() {
            Self::canonical()
        } else {
            IndexPath(indexes)
        }
    }

    pub fn indexes(&self) -> &[i32] {
        &self.0
    }

    pub fn is_canonical(&self) -> bool {
        self.0 == [0]
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        if self.is_canonical() {
            out.push(0);
        } else {
            write_varint(zigzag_encode(self.0.len() as i32), out);
            for index in &self.0 {
                write_varint(zigzag_encode(*index), out);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }

    pub fn encoded_len(&self) -> usize {
        if self.is_canonical() {
            1
        } else {
            varint_len(zigzag_encode(self.0.len() as i32))
                + self
                    .0
                    .iter()
                    .map(|index| varint_len(zigzag_encode(*index)))
                    .sum::<usize>()
        }
    }

    /// Decode a path from the start of `data`, returning it with the bytes consumed
    pub fn decode(data: &[u8]) -> SerializationResult<(IndexPath, usize)> {
        let mut position = 0;
        let count = zigzag_decode(read_varint(data, &mut position)?);
        if count == 0 {
            return Ok((Self::canonical(), position));
        }
        if count < 0 || count as usize > data.len() - position {
            return Err(SerializationError::Framing {
                message: format!("invalid index path count {}", count),
            });
        }

        let mut indexes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = zigzag_decode(read_varint(data, &mut position)?);
            if index < 0 {
                return Err(SerializationError::Framing {
                    message: format!("negative message index {}", index),
                });
            }
            indexes.push(index);
        }
        Ok((IndexPath(indexes), position))
    }
}

fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn write_varint(mut value: u32, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        _ => 5,
    }
}

fn read_varint(data: &[u8], position: &mut usize) -> SerializationResult<u32> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = *data.get(*position).ok_or_else(|| SerializationError::Framing {
            message: "truncated index path".to_string(),
        })?;
        *position += 1;
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(SerializationError::Framing {
        message: "index path varint longer than 5 bytes".to_string(),
    })
}
