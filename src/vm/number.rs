use super::VmError;
use num_bigint::{BigInt, Sign};

/// Maximum byte length of a number consumed by arithmetic operations.
pub const MAXIMUM_NUMBER_LENGTH: usize = 8;

/// Minimal little-endian sign-magnitude encoding, zero is the empty array.
pub fn encode_big_int(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        return Vec::new();
    }
    let mut bytes = value.magnitude().to_bytes_le();
    let negative = value.sign() == Sign::Minus;
    match bytes.last_mut() {
        Some(last) if *last & 0x80 != 0 => bytes.push(if negative { 0x80 } else { 0x00 }),
        Some(last) if negative => *last |= 0x80,
        _ => {}
    }
    bytes
}

pub fn encode_number(value: i64) -> Vec<u8> {
    encode_big_int(&BigInt::from(value))
}

pub fn decode_number(bytes: &[u8], maximum_length: usize) -> Result<i64, VmError> {
    if bytes.len() > maximum_length {
        return Err(VmError::NumberTooLong {
            maximum: maximum_length,
        });
    }
    let Some((last, rest)) = bytes.split_last() else {
        return Ok(0);
    };
    let negative = last & 0x80 != 0;
    let magnitude = rest
        .iter()
        .copied()
        .chain(std::iter::once(last & 0x7f))
        .rev()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(byte));
    let magnitude = i64::try_from(magnitude).map_err(|_| VmError::Overflow)?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Any non-zero byte is true, except a lone sign bit in the final position.
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    bytes.iter().enumerate().any(|(i, byte)| {
        *byte != 0 && !(i == bytes.len() - 1 && *byte == 0x80)
    })
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    encode_number(i64::from(value))
}
