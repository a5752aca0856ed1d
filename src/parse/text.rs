//! Plain-text decoding with an encoding fallback chain.
//!
//! Decode order: UTF-8 → Latin-1 → ASCII → UTF-16, stopping at the
//! first success. Latin-1 declines input containing NUL bytes: any
//! byte sequence is otherwise "valid" Latin-1, and NULs are the
//! signature of UTF-16 content, which the later stages handle.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::EngineError;

use super::ParseOutcome;

pub fn parse_txt(bytes: &[u8]) -> Result<ParseOutcome, EngineError> {
    let (text, encoding) = decode(bytes)?;
    debug!(encoding, "decoded plain text");

    Ok(ParseOutcome {
        text,
        metadata: BTreeMap::new(),
        partial: false,
        warning: None,
    })
}

fn decode(bytes: &[u8]) -> Result<(String, &'static str), EngineError> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok((s.to_string(), "utf-8"));
    }

    if !bytes.contains(&0) {
        return Ok((bytes.iter().map(|&b| b as char).collect(), "latin-1"));
    }

    if bytes.is_ascii() {
        // ASCII bytes with embedded NULs: drop the NULs, keep the rest.
        let s: String = bytes
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        return Ok((s, "ascii"));
    }

    decode_utf16(bytes).map(|s| (s, "utf-16"))
}

fn decode_utf16(bytes: &[u8]) -> Result<String, EngineError> {
    let (body, big_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        _ => (bytes, false), // no BOM: assume little-endian
    };

    if body.len() % 2 != 0 {
        return Err(EngineError::ParseFailure(
            "all text encodings exhausted".to_string(),
        ));
    }

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        })
        .collect();

    String::from_utf16(&units)
        .map_err(|_| EngineError::ParseFailure("all text encodings exhausted".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        let (s, enc) = decode("héllo wörld".as_bytes()).unwrap();
        assert_eq!(s, "héllo wörld");
        assert_eq!(enc, "utf-8");
    }

    #[test]
    fn latin1_fallback() {
        // 0xE9 is 'é' in Latin-1 but invalid UTF-8 on its own
        let bytes = [b'c', b'a', b'f', 0xE9];
        let (s, enc) = decode(&bytes).unwrap();
        assert_eq!(s, "café");
        assert_eq!(enc, "latin-1");
    }

    #[test]
    fn utf16_le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (s, enc) = decode(&bytes).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(enc, "utf-16");
    }

    #[test]
    fn utf16_be_with_bom() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "héllo".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        let (s, enc) = decode(&bytes).unwrap();
        assert_eq!(s, "héllo");
        assert_eq!(enc, "utf-16");
    }

    #[test]
    fn ascii_with_nuls() {
        let bytes = [b'a', 0, b'b', 0, b'!', 0];
        // all bytes < 128 and even length: ascii stage wins before utf-16
        let (s, enc) = decode(&bytes).unwrap();
        assert_eq!(s, "ab!");
        assert_eq!(enc, "ascii");
    }

    #[test]
    fn undecodable_is_parse_failure() {
        // Invalid UTF-8, contains NUL and non-ASCII, odd length: every
        // stage declines.
        let bytes = [0xFF, 0x00, 0xD8];
        assert!(decode(&bytes).is_err());
    }
}
