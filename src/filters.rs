//! Byte-stream decoders shared by the tokenizer and the file operators.

use crate::error::{ErrorKind, PsResult};

/// Decodes the body of a hex string (the bytes between `<` and `>`).
/// An odd trailing digit implies a final zero nibble.
pub fn decode_hex_body(body: &[u8]) -> PsResult<Vec<u8>> {
    let mut buffer = Vec::with_capacity(body.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in body {
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => continue,
            _ => anyhow::bail!(ErrorKind::SyntaxError),
        };

        match pending.take() {
            Some(high) => buffer.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        buffer.push(high << 4);
    }

    Ok(buffer)
}

fn ascii85_digit(digit: u8, n: &mut u32, count: &mut u8) -> PsResult<()> {
    if digit < b'!' || digit > b'u' {
        anyhow::bail!(ErrorKind::SyntaxError);
    }
    *n = n
        .checked_mul(85)
        .and_then(|v| v.checked_add((digit - b'!') as u32))
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::SyntaxError))?;
    *count += 1;
    Ok(())
}

/// Decodes the body of an ASCII85 string (the bytes between `<~` and `~>`).
pub fn decode_ascii85_body(body: &[u8]) -> PsResult<Vec<u8>> {
    let mut buffer = Vec::with_capacity((body.len() / 5) * 4);
    let mut n: u32 = 0;
    let mut count: u8 = 0;

    for &digit in body.iter().filter(|&&b| !b.is_ascii_whitespace()) {
        if digit == b'z' {
            // z is shorthand for four zero bytes, legal only between groups
            if count != 0 {
                anyhow::bail!(ErrorKind::SyntaxError);
            }
            buffer.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }

        ascii85_digit(digit, &mut n, &mut count)?;

        if count == 5 {
            buffer.extend_from_slice(&n.to_be_bytes());
            count = 0;
            n = 0;
        }
    }

    if count == 1 {
        // a final group of one digit cannot encode any bytes
        anyhow::bail!(ErrorKind::SyntaxError);
    }

    if count != 0 {
        let to_remove = 5 - count as usize;
        while count != 5 {
            ascii85_digit(b'u', &mut n, &mut count)?;
        }
        buffer.extend_from_slice(&n.to_be_bytes());
        buffer.drain((buffer.len() - to_remove)..);
    }

    Ok(buffer)
}

const EEXEC_C1: u16 = 52845;
const EEXEC_C2: u16 = 22719;

fn eexec_decrypt_with(cipher: &[u8], mut r: u16) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(cipher.len());

    for &c in cipher {
        decoded.push(c ^ (r >> 8) as u8);
        r = (c as u16)
            .wrapping_add(r)
            .wrapping_mul(EEXEC_C1)
            .wrapping_add(EEXEC_C2);
    }

    decoded
}

/// eexec decryption (r = 55665). The first four plaintext bytes are random
/// padding and are discarded.
pub fn eexec_decrypt(cipher: &[u8]) -> Vec<u8> {
    let plain = eexec_decrypt_with(cipher, 55665);
    plain.get(4..).map(<[u8]>::to_vec).unwrap_or_default()
}

/// An eexec section may be hex-encoded; it is binary when any of the first
/// four non-whitespace bytes is not a hex digit.
pub fn eexec_section_is_hex(data: &[u8]) -> bool {
    data.iter()
        .filter(|b| !b.is_ascii_whitespace())
        .take(4)
        .all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_odd_digit_pads_with_zero() {
        assert_eq!(decode_hex_body(b"901fa").unwrap(), vec![0x90, 0x1f, 0xa0]);
    }

    #[test]
    fn hex_skips_whitespace() {
        assert_eq!(decode_hex_body(b"90 1f\n a3").unwrap(), vec![0x90, 0x1f, 0xa3]);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(decode_hex_body(b"9x").is_err());
    }

    #[test]
    fn ascii85_known_vector() {
        assert_eq!(
            decode_ascii85_body(b"9jqo^F*2M7/c").unwrap(),
            [77, 97, 110, 32, 115, 117, 114, 101, 46],
        );
    }

    #[test]
    fn ascii85_z_expands_to_four_zeros() {
        assert_eq!(decode_ascii85_body(b"z").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn ascii85_z_inside_group_is_an_error() {
        assert!(decode_ascii85_body(b"9z").is_err());
    }

    #[test]
    fn ascii85_single_trailing_digit_is_an_error() {
        assert!(decode_ascii85_body(b"9jqo^9").is_err());
    }

    #[test]
    fn eexec_round_trip() {
        // encrypt by running the cipher forward over plaintext
        let plaintext = b"dup /Private 5 dict def";
        let mut r: u16 = 55665;
        let mut cipher = Vec::new();
        for &p in [0u8, 0, 0, 0].iter().chain(plaintext.iter()) {
            let c = p ^ (r >> 8) as u8;
            cipher.push(c);
            r = (c as u16)
                .wrapping_add(r)
                .wrapping_mul(EEXEC_C1)
                .wrapping_add(EEXEC_C2);
        }

        assert_eq!(eexec_decrypt(&cipher), plaintext);
    }
}
