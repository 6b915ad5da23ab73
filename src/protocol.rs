//! Binary request/reply framing.
//!
//! Every message starts with a 12 byte header (`type`, `body_len`,
//! `request_id`, all u32 little endian) followed by `body_len` bytes of body.
//! Replies echo the type and request id of the request they answer.

use std::io::{ErrorKind, Read, Write};

use anyhow::{anyhow, Result};

use crate::{
    common::{Flags, RequestID, SpaceID},
    error::DecodeError,
    tuple::{read_u32, Tuple},
};

pub const HEADER_SIZE: usize = 12;
pub const MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Replace = 13,
    Select = 17,
    Update = 19,
    Delete = 21,
    Ping = 0xff00,
}

impl TryFrom<u32> for RequestType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, u32> {
        match value {
            13 => Ok(RequestType::Replace),
            17 => Ok(RequestType::Select),
            19 => Ok(RequestType::Update),
            21 => Ok(RequestType::Delete),
            0xff00 => Ok(RequestType::Ping),
            _ => Err(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_type: u32,
    pub request_id: RequestID,
    pub body: Vec<u8>,
}

/// Reads one frame. Returns `None` when the peer closed the connection
/// before a header arrived.
pub fn read_frame(reader: &mut impl Read) -> Result<Option<Frame>> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let request_type = read_u32(&header[0..4])?;
    let body_len = read_u32(&header[4..8])?;
    let request_id = RequestID(read_u32(&header[8..12])?);
    if body_len > MAX_BODY_SIZE {
        return Err(anyhow!("frame body too large: {} bytes", body_len));
    }
    // sized by the bytes received, not by the header
    let mut body = Vec::new();
    reader.by_ref().take(u64::from(body_len)).read_to_end(&mut body)?;
    if body.len() != body_len as usize {
        return Err(anyhow!(
            "connection closed after {} of {} body bytes",
            body.len(),
            body_len
        ));
    }
    Ok(Some(Frame {
        request_type,
        request_id,
        body,
    }))
}

pub fn write_frame(writer: &mut impl Write, frame: &Frame) -> Result<()> {
    let mut buffer = Vec::with_capacity(HEADER_SIZE + frame.body.len());
    buffer.extend_from_slice(&frame.request_type.to_le_bytes());
    buffer.extend_from_slice(&(frame.body.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&frame.request_id.0.to_le_bytes());
    buffer.extend_from_slice(&frame.body);
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Replace {
        space_id: SpaceID,
        flags: Flags,
        tuple: Tuple,
    },
    Select {
        space_id: SpaceID,
        index_no: u32,
        offset: u32,
        limit: u32,
        keys: Vec<Tuple>,
    },
    Update {
        space_id: SpaceID,
        flags: Flags,
        key: Tuple,
        op_count: u32,
        /// Encoded operations, validated when the update runs.
        ops: Vec<u8>,
    },
    Delete {
        space_id: SpaceID,
        flags: Flags,
        key: Tuple,
    },
    Ping,
}

impl Request {
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Replace { .. } => RequestType::Replace,
            Request::Select { .. } => RequestType::Select,
            Request::Update { .. } => RequestType::Update,
            Request::Delete { .. } => RequestType::Delete,
            Request::Ping => RequestType::Ping,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        match self {
            Request::Replace {
                space_id,
                flags,
                tuple,
            } => {
                buffer.extend_from_slice(&space_id.0.to_le_bytes());
                buffer.extend_from_slice(&flags.0.to_le_bytes());
                buffer.extend_from_slice(&tuple.serialize());
            }
            Request::Select {
                space_id,
                index_no,
                offset,
                limit,
                keys,
            } => {
                for value in [space_id.0, *index_no, *offset, *limit, keys.len() as u32] {
                    buffer.extend_from_slice(&value.to_le_bytes());
                }
                for key in keys {
                    buffer.extend_from_slice(&key.serialize());
                }
            }
            Request::Update {
                space_id,
                flags,
                key,
                op_count,
                ops,
            } => {
                buffer.extend_from_slice(&space_id.0.to_le_bytes());
                buffer.extend_from_slice(&flags.0.to_le_bytes());
                buffer.extend_from_slice(&key.serialize());
                buffer.extend_from_slice(&op_count.to_le_bytes());
                buffer.extend_from_slice(ops);
            }
            Request::Delete {
                space_id,
                flags,
                key,
            } => {
                buffer.extend_from_slice(&space_id.0.to_le_bytes());
                buffer.extend_from_slice(&flags.0.to_le_bytes());
                buffer.extend_from_slice(&key.serialize());
            }
            Request::Ping => {}
        }
        buffer
    }

    pub fn deserialize(request_type: RequestType, body: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BodyReader::new(body);
        let request = match request_type {
            RequestType::Replace => Request::Replace {
                space_id: SpaceID(reader.u32()?),
                flags: Flags(reader.u32()?),
                tuple: reader.tuple()?,
            },
            RequestType::Select => {
                let space_id = SpaceID(reader.u32()?);
                let index_no = reader.u32()?;
                let offset = reader.u32()?;
                let limit = reader.u32()?;
                let key_count = reader.u32()?;
                let keys = (0..key_count)
                    .map(|_| reader.tuple())
                    .collect::<Result<Vec<_>, _>>()?;
                Request::Select {
                    space_id,
                    index_no,
                    offset,
                    limit,
                    keys,
                }
            }
            RequestType::Update => Request::Update {
                space_id: SpaceID(reader.u32()?),
                flags: Flags(reader.u32()?),
                key: reader.tuple()?,
                op_count: reader.u32()?,
                ops: reader.rest().to_vec(),
            },
            RequestType::Delete => Request::Delete {
                space_id: SpaceID(reader.u32()?),
                flags: Flags(reader.u32()?),
                key: reader.tuple()?,
            },
            RequestType::Ping => Request::Ping,
        };
        reader.finish()?;
        Ok(request)
    }

    pub fn to_frame(&self, request_id: RequestID) -> Frame {
        Frame {
            request_type: self.request_type() as u32,
            request_id,
            body: self.serialize(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok { count: u32, tuples: Vec<Tuple> },
    Error { code: u32, message: String },
}

impl Reply {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        match self {
            Reply::Ok { count, tuples } => {
                buffer.extend_from_slice(&0u32.to_le_bytes());
                buffer.extend_from_slice(&count.to_le_bytes());
                for tuple in tuples {
                    buffer.extend_from_slice(&(tuple.bsize() as u32).to_le_bytes());
                    buffer.extend_from_slice(&tuple.serialize());
                }
            }
            Reply::Error { code, message } => {
                buffer.extend_from_slice(&code.to_le_bytes());
                buffer.extend_from_slice(message.as_bytes());
            }
        }
        buffer
    }

    pub fn deserialize(body: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BodyReader::new(body);
        let code = reader.u32()?;
        if code != 0 {
            let message = String::from_utf8_lossy(reader.rest()).into_owned();
            return Ok(Reply::Error { code, message });
        }
        let count = reader.u32()?;
        let mut tuples = vec![];
        if !reader.is_empty() {
            for _ in 0..count {
                let bsize = reader.u32()? as usize;
                let tuple = reader.tuple()?;
                if tuple.bsize() != bsize {
                    return Err(DecodeError::MalformedLength);
                }
                tuples.push(tuple);
            }
        }
        reader.finish()?;
        Ok(Reply::Ok { count, tuples })
    }
}

struct BodyReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BodyReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn is_empty(&self) -> bool {
        self.offset == self.bytes.len()
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let value = read_u32(&self.bytes[self.offset..])?;
        self.offset += 4;
        Ok(value)
    }

    fn tuple(&mut self) -> Result<Tuple, DecodeError> {
        let (tuple, consumed) = Tuple::decode_prefix(&self.bytes[self.offset..])?;
        self.offset += consumed;
        Ok(tuple)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        rest
    }

    fn finish(self) -> Result<(), DecodeError> {
        match self.bytes.len() - self.offset {
            0 => Ok(()),
            trailing => Err(DecodeError::TrailingBytes(trailing)),
        }
    }
}
