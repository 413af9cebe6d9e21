use crate::dex::error::DexError;

/// Longest valid encoding of a 32-bit LEB128 value
pub(crate) const MAX_LEB128_LEN: usize = 5;

#[cfg(test)]
pub(crate) fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    if remaining == 0 {
        result.push(0);
        return result;
    }

    while remaining != 0 {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        if remaining != 0 {
            byte |= 0x80;
        }

        result.push(byte);
    }

    result
}

/// Decodes an unsigned LEB128 value, returning the value and the number of bytes used.
///
/// Fails on an empty or truncated input and on a fifth byte that still has the
/// continuation bit set.
pub(crate) fn decode_uleb128(encoded: &[u8]) -> Result<(u32, usize), DexError> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().take(MAX_LEB128_LEN).enumerate() {
        let low = (byte & 0x7F) as u32;
        value |= low.wrapping_shl(shift);
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((value, count + 1));
        }
    }

    if encoded.len() < MAX_LEB128_LEN {
        fail!(Bounds, "uleb128 truncated after {} bytes", encoded.len());
    }
    fail!(Encoding, "uleb128 longer than 5 bytes")
}

#[cfg(test)]
pub(crate) fn encode_sleb128(value: i32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        let is_more =
            !((remaining == 0 && (byte & 0x40) == 0) || (remaining == -1 && (byte & 0x40) != 0));
        if is_more {
            byte |= 0x80;
        }

        result.push(byte);

        if !is_more {
            break;
        }
    }

    result
}

pub(crate) fn decode_sleb128(encoded: &[u8]) -> Result<(i32, usize), DexError> {
    let mut value: i32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().take(MAX_LEB128_LEN).enumerate() {
        let low = (byte & 0x7F) as i32;
        value |= low.wrapping_shl(shift);
        shift += 7;

        if byte & 0x80 == 0 {
            // Sign-extend if we didn't fill all 32 bits
            if (byte & 0x40) != 0 && shift < 32 {
                value |= (-1i32).wrapping_shl(shift);
            }
            return Ok((value, count + 1));
        }
    }

    if encoded.len() < MAX_LEB128_LEN {
        fail!(Bounds, "sleb128 truncated after {} bytes", encoded.len());
    }
    fail!(Encoding, "sleb128 longer than 5 bytes")
}

#[cfg(test)]
pub(crate) fn encode_uleb128p1(value: i32) -> Vec<u8> {
    encode_uleb128(value.wrapping_add(1) as u32)
}

/// `uleb128p1`: the stored value is `value + 1`, so 0 decodes to -1 (absent).
pub(crate) fn decode_uleb128p1(encoded: &[u8]) -> Result<(i32, usize), DexError> {
    let (v, c) = decode_uleb128(encoded)?;
    Ok(((v as i32).wrapping_sub(1), c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::error::ErrorKind;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x01], 1, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x01], 128, 2),
            (vec![0x80, 0x7F], 16256, 2),
            (vec![0xE5, 0x8E, 0x26], 624485, 3),
            (vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX, 5),
        ];

        for (encoded, expected, len) in cases {
            assert_eq!(decode_uleb128(&encoded).unwrap(), (expected, len));
        }
    }

    #[test]
    fn test_decode_uleb128_rejects_truncated_and_overlong() {
        let e = decode_uleb128(&[]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Bounds);

        let e = decode_uleb128(&[0x80, 0x80]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Bounds);

        let e = decode_uleb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_encode_sleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (-1, vec![0x7F]),
            (-2, vec![0x7E]),
            (-123456, vec![0xC0, 0xBB, 0x78]),
            (-128, vec![0x80, 0x7F]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_sleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_sleb128() {
        let cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], -1),
            (vec![0x7E], -2),
            (vec![0xFF, 0x00], 127),
            (vec![0x80, 0x7F], -128),
            (vec![0xC0, 0xBB, 0x78], -123456),
        ];

        for (encoded, expected) in cases {
            let (v, _) = decode_sleb128(&encoded).unwrap();
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn test_uleb128p1() {
        assert_eq!(decode_uleb128p1(&[0x00]).unwrap(), (-1, 1));
        assert_eq!(decode_uleb128p1(&[0x01]).unwrap(), (0, 1));
        assert_eq!(decode_uleb128p1(&encode_uleb128p1(41)).unwrap().0, 41);
    }
}
