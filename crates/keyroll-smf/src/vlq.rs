//! Variable-length quantities (big-endian base-128 with continuation bits).

use crate::error::{Error, Result};

/// Largest value a 4-byte variable-length quantity can hold.
pub const MAX_DELTA_TIME: u32 = 0x0FFF_FFFF;

const MAX_VLQ_BYTES: usize = 4;

/// Decode a delta time from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_delta_time(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in bytes.iter().take(MAX_VLQ_BYTES).enumerate() {
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if bytes.len() >= MAX_VLQ_BYTES {
        Err(Error::malformed(
            MAX_VLQ_BYTES - 1,
            "variable-length quantity longer than 4 bytes",
        ))
    } else {
        Err(Error::malformed(bytes.len(), "variable-length quantity truncated"))
    }
}

/// Encode a delta time as its minimal variable-length form.
pub fn encode_delta_time(value: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(MAX_VLQ_BYTES);
    push_delta_time(&mut out, value)?;
    Ok(out)
}

pub(crate) fn push_delta_time(out: &mut Vec<u8>, value: u32) -> Result<()> {
    if value > MAX_DELTA_TIME {
        return Err(Error::DeltaTimeOverflow(value));
    }

    let mut buf = [0u8; MAX_VLQ_BYTES];
    let mut start = MAX_VLQ_BYTES - 1;
    let mut rest = value;
    buf[start] = (rest & 0x7F) as u8;
    rest >>= 7;
    while rest > 0 {
        start -= 1;
        buf[start] = (rest & 0x7F) as u8 | 0x80;
        rest >>= 7;
    }

    out.extend_from_slice(&buf[start..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_single_byte() {
        assert_eq!(encode_delta_time(0).unwrap(), vec![0x00]);
    }

    #[test]
    fn test_known_encodings() {
        // Reference values from the SMF 1.0 specification
        let cases: &[(u32, &[u8])] = &[
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x2000, &[0xC0, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x1F_FFFF, &[0xFF, 0xFF, 0x7F]),
            (0x20_0000, &[0x81, 0x80, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];

        for &(value, bytes) in cases {
            assert_eq!(encode_delta_time(value).unwrap(), bytes, "encode {:#x}", value);
            assert_eq!(
                decode_delta_time(bytes).unwrap(),
                (value, bytes.len()),
                "decode {:#x}",
                value
            );
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode_delta_time(&[0x81, 0x00, 0x90, 0x3C]).unwrap(), (0x80, 2));
    }

    #[test]
    fn test_truncated_is_malformed() {
        let err = decode_delta_time(&[0x81, 0x80]).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 2, .. }));

        let err = decode_delta_time(&[]).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 0, .. }));
    }

    #[test]
    fn test_five_byte_quantity_rejected() {
        let err = decode_delta_time(&[0x81, 0x80, 0x80, 0x80, 0x00]).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }

    #[test]
    fn test_overflow_rejected_on_encode() {
        assert!(matches!(
            encode_delta_time(MAX_DELTA_TIME + 1),
            Err(Error::DeltaTimeOverflow(_))
        ));
    }
}
