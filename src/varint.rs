use crate::error::DecodeError;

/// A u32 never takes more than five 7-bit groups.
pub const MAX_VARINT32_SIZE: usize = 5;

pub fn size(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Appends `value` as big-endian base-128 groups. Every byte but the last
/// has the continuation bit set.
pub fn write(value: u32, buffer: &mut Vec<u8>) {
    let size = size(value);
    for i in (1..size).rev() {
        buffer.push(((value >> (7 * i)) & 0x7f) as u8 | 0x80);
    }
    buffer.push((value & 0x7f) as u8);
}

pub fn encode(value: u32) -> Box<[u8]> {
    let mut buffer = Vec::with_capacity(size(value));
    write(value, &mut buffer);
    buffer.into()
}

/// Reads one varint from the start of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn read(bytes: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().take(MAX_VARINT32_SIZE).enumerate() {
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return u32::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| DecodeError::MalformedLength);
        }
    }
    if bytes.len() >= MAX_VARINT32_SIZE {
        return Err(DecodeError::MalformedLength);
    }
    Err(DecodeError::Truncated {
        needed: bytes.len() + 1,
        remaining: bytes.len(),
    })
}
