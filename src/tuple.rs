use std::fmt::{Display, Formatter};

use crate::{error::DecodeError, varint};

const CARDINALITY_SIZE: usize = 4;

/// An ordered sequence of opaque byte-string fields.
///
/// Encoded as a little-endian `u32` cardinality followed by every field as a
/// varint32 length and the raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Tuple {
    fields: Vec<Vec<u8>>,
}

impl From<Vec<Vec<u8>>> for Tuple {
    fn from(fields: Vec<Vec<u8>>) -> Self {
        Tuple { fields }
    }
}

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cardinality(&self) -> u32 {
        self.fields.len() as u32
    }

    pub fn field(&self, field_no: u32) -> Option<&[u8]> {
        self.fields.get(field_no as usize).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.fields.iter().map(Vec::as_slice)
    }

    /// Primary key, always the first field.
    pub fn key(&self) -> Option<&[u8]> {
        self.field(0)
    }

    pub fn push(&mut self, field: impl Into<Vec<u8>>) {
        self.fields.push(field.into());
    }

    pub(crate) fn field_mut(&mut self, field_no: u32) -> Option<&mut Vec<u8>> {
        self.fields.get_mut(field_no as usize)
    }

    pub(crate) fn remove(&mut self, field_no: u32) -> Vec<u8> {
        self.fields.remove(field_no as usize)
    }

    /// Size of the encoded field sequence, without the cardinality header.
    pub fn bsize(&self) -> usize {
        self.fields
            .iter()
            .map(|f| varint::size(f.len() as u32) + f.len())
            .sum()
    }

    pub fn size(&self) -> usize {
        CARDINALITY_SIZE + self.bsize()
    }

    pub fn serialize(&self) -> Box<[u8]> {
        let mut bytes = Vec::with_capacity(self.size());
        bytes.extend_from_slice(&self.cardinality().to_le_bytes());
        self.serialize_fields(&mut bytes);
        bytes.into()
    }

    pub fn serialize_fields(&self, buffer: &mut Vec<u8>) {
        for field in &self.fields {
            write_field(field, buffer);
        }
    }

    /// Decodes a whole buffer holding exactly one tuple.
    pub fn deserialize(bytes: &[u8]) -> Result<Tuple, DecodeError> {
        let (tuple, consumed) = Self::decode_prefix(bytes)?;
        if consumed != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - consumed));
        }
        Ok(tuple)
    }

    /// Decodes a tuple from the start of `bytes`, returning it together with
    /// the number of bytes consumed.
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Tuple, usize), DecodeError> {
        let cardinality = read_u32(bytes)?;
        let (tuple, consumed) = Self::decode_fields(&bytes[CARDINALITY_SIZE..], cardinality)?;
        Ok((tuple, CARDINALITY_SIZE + consumed))
    }

    /// Decodes `count` length-prefixed fields with no cardinality header.
    pub fn decode_fields(bytes: &[u8], count: u32) -> Result<(Tuple, usize), DecodeError> {
        // every field takes at least one byte, so a bogus count cannot
        // force a huge allocation
        let mut fields = Vec::with_capacity((count as usize).min(bytes.len()));
        let mut offset = 0;
        for _ in 0..count {
            let (field, consumed) = read_field(&bytes[offset..])?;
            fields.push(field.to_vec());
            offset += consumed;
        }
        Ok((Tuple { fields }, offset))
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", FieldDisplay(field))?;
        }
        write!(f, ")")
    }
}

/// Renders 4-byte fields as integers and everything else as text.
pub struct FieldDisplay<'a>(pub &'a [u8]);

impl Display for FieldDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match <[u8; 4]>::try_from(self.0) {
            Ok(bytes) => write!(f, "{}", i32::from_le_bytes(bytes)),
            Err(_) => write!(f, "'{}'", String::from_utf8_lossy(self.0)),
        }
    }
}

pub fn write_field(field: &[u8], buffer: &mut Vec<u8>) {
    varint::write(field.len() as u32, buffer);
    buffer.extend_from_slice(field);
}

/// Reads one varint-prefixed field, returning its payload and the total
/// number of bytes consumed.
pub fn read_field(bytes: &[u8]) -> Result<(&[u8], usize), DecodeError> {
    let (len, prefix) = varint::read(bytes)?;
    let len = len as usize;
    let remaining = bytes.len() - prefix;
    if len > remaining {
        return Err(DecodeError::Truncated {
            needed: len,
            remaining,
        });
    }
    Ok((&bytes[prefix..prefix + len], prefix + len))
}

pub fn read_u32(bytes: &[u8]) -> Result<u32, DecodeError> {
    let buffer: [u8; 4] = bytes
        .get(0..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(DecodeError::Truncated {
            needed: 4,
            remaining: bytes.len(),
        })?;
    Ok(u32::from_le_bytes(buffer))
}
