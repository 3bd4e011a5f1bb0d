//! Text encodings for the terminal's byte streams.
//!
//! The decoder is incremental: bytes may arrive split at arbitrary points,
//! including inside a multi-byte sequence or between the halves of a
//! UTF-16 surrogate pair. Consumers only ever see whole scalar values;
//! malformed input decodes to U+FFFD.

use std::fmt;
use std::str::FromStr;

use crate::TermError;

const REPLACEMENT: char = '\u{FFFD}';

/// Supported terminal text encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl Encoding {
    /// Canonical name, matching what [`FromStr`] accepts.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }

    /// Encode `s` onto the end of `out`.
    pub fn encode_str(self, s: &str, out: &mut Vec<u8>) {
        match self {
            Encoding::Utf8 => out.extend_from_slice(s.as_bytes()),
            Encoding::Utf16Le | Encoding::Utf16Be => {
                let mut units = [0u16; 2];
                for c in s.chars() {
                    for unit in c.encode_utf16(&mut units) {
                        let bytes = match self {
                            Encoding::Utf16Le => unit.to_le_bytes(),
                            _ => unit.to_be_bytes(),
                        };
                        out.extend_from_slice(&bytes);
                    }
                }
            }
            Encoding::Latin1 => {
                for c in s.chars() {
                    let cp = c as u32;
                    out.push(if cp <= 0xFF { cp as u8 } else { b'?' });
                }
            }
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self, TermError> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "UTF8" => Ok(Encoding::Utf8),
            "UTF16LE" => Ok(Encoding::Utf16Le),
            "UTF16BE" | "UTF16" => Ok(Encoding::Utf16Be),
            "ISO88591" | "LATIN1" => Ok(Encoding::Latin1),
            _ => Err(TermError::Config(format!("unknown encoding {s:?}"))),
        }
    }
}

/// Incremental byte-to-character decoder for one [`Encoding`].
pub struct Decoder {
    encoding: Encoding,
    /// Partial UTF-8 sequence, or the single pending byte of a UTF-16 unit.
    pending: [u8; 4],
    pending_len: usize,
    /// UTF-16 high surrogate waiting for its low half.
    high_surrogate: Option<u16>,
}

impl Decoder {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: [0; 4],
            pending_len: 0,
            high_surrogate: None,
        }
    }

    /// Decode `input`, appending completed characters to `out`.
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<char>) {
        for &byte in input {
            match self.encoding {
                Encoding::Utf8 => self.push_utf8(byte, out),
                Encoding::Utf16Le | Encoding::Utf16Be => self.push_utf16(byte, out),
                Encoding::Latin1 => out.push(byte as char),
            }
        }
    }

    /// Flush dangling state at end of stream; incomplete sequences decode
    /// to U+FFFD.
    pub fn finish(&mut self, out: &mut Vec<char>) {
        if self.pending_len > 0 || self.high_surrogate.is_some() {
            out.push(REPLACEMENT);
        }
        self.pending_len = 0;
        self.high_surrogate = None;
    }

    fn push_utf8(&mut self, byte: u8, out: &mut Vec<char>) {
        if self.pending_len == 0 {
            if byte < 0x80 {
                out.push(byte as char);
            } else if (0xC2..=0xF4).contains(&byte) {
                self.pending[0] = byte;
                self.pending_len = 1;
            } else {
                out.push(REPLACEMENT);
            }
            return;
        }
        if byte & 0xC0 != 0x80 {
            // Sequence broke off; the new byte starts over.
            out.push(REPLACEMENT);
            self.pending_len = 0;
            self.push_utf8(byte, out);
            return;
        }
        self.pending[self.pending_len] = byte;
        self.pending_len += 1;
        let need = match self.pending[0] {
            b if b < 0xE0 => 2,
            b if b < 0xF0 => 3,
            _ => 4,
        };
        if self.pending_len == need {
            match std::str::from_utf8(&self.pending[..need]) {
                Ok(s) => out.extend(s.chars()),
                Err(_) => out.push(REPLACEMENT),
            }
            self.pending_len = 0;
        }
    }

    fn push_utf16(&mut self, byte: u8, out: &mut Vec<char>) {
        if self.pending_len == 0 {
            self.pending[0] = byte;
            self.pending_len = 1;
            return;
        }
        let unit = match self.encoding {
            Encoding::Utf16Le => u16::from_le_bytes([self.pending[0], byte]),
            _ => u16::from_be_bytes([self.pending[0], byte]),
        };
        self.pending_len = 0;
        self.push_unit(unit, out);
    }

    fn push_unit(&mut self, unit: u16, out: &mut Vec<char>) {
        match unit {
            0xD800..=0xDBFF => {
                if self.high_surrogate.replace(unit).is_some() {
                    out.push(REPLACEMENT);
                }
            }
            0xDC00..=0xDFFF => match self.high_surrogate.take() {
                Some(high) => {
                    let cp = 0x10000
                        + ((u32::from(high) - 0xD800) << 10)
                        + (u32::from(unit) - 0xDC00);
                    out.push(char::from_u32(cp).unwrap_or(REPLACEMENT));
                }
                None => out.push(REPLACEMENT),
            },
            _ => {
                if self.high_surrogate.take().is_some() {
                    out.push(REPLACEMENT);
                }
                out.push(char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(encoding: Encoding, chunks: &[&[u8]]) -> String {
        let mut decoder = Decoder::new(encoding);
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.decode(chunk, &mut out);
        }
        decoder.finish(&mut out);
        out.into_iter().collect()
    }

    #[test]
    fn test_utf8_split_across_reads() {
        // "é" is 0xC3 0xA9; split between the two bytes
        let s = decode_all(Encoding::Utf8, &[b"a\xC3", b"\xA9b"]);
        assert_eq!(s, "aéb");
    }

    #[test]
    fn test_utf8_malformed_replaced() {
        let s = decode_all(Encoding::Utf8, &[b"\xFFx"]);
        assert_eq!(s, "\u{FFFD}x");
    }

    #[test]
    fn test_utf8_truncated_at_eof() {
        let s = decode_all(Encoding::Utf8, &[b"\xE2\x82"]);
        assert_eq!(s, "\u{FFFD}");
    }

    #[test]
    fn test_utf16le_surrogate_pair() {
        // U+1F600 is D83D DE00
        let s = decode_all(Encoding::Utf16Le, &[&[0x3D, 0xD8, 0x00, 0xDE]]);
        assert_eq!(s, "\u{1F600}");
    }

    #[test]
    fn test_utf16le_pair_split_across_reads() {
        let s = decode_all(Encoding::Utf16Le, &[&[0x3D], &[0xD8, 0x00], &[0xDE]]);
        assert_eq!(s, "\u{1F600}");
    }

    #[test]
    fn test_utf16_isolated_surrogate_replaced() {
        let s = decode_all(Encoding::Utf16Be, &[&[0xD8, 0x3D, 0x00, 0x61]]);
        assert_eq!(s, "\u{FFFD}a");
    }

    #[test]
    fn test_latin1_high_bytes() {
        let s = decode_all(Encoding::Latin1, &[&[0x61, 0xE9]]);
        assert_eq!(s, "aé");
    }

    #[test]
    fn test_encode_utf16be_surrogates() {
        let mut out = Vec::new();
        Encoding::Utf16Be.encode_str("\u{1F600}", &mut out);
        assert_eq!(out, vec![0xD8, 0x3D, 0xDE, 0x00]);
    }

    #[test]
    fn test_encode_latin1_replaces_unmappable() {
        let mut out = Vec::new();
        Encoding::Latin1.encode_str("aé\u{1F600}", &mut out);
        assert_eq!(out, vec![0x61, 0xE9, b'?']);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("UTF_16LE".parse::<Encoding>().unwrap(), Encoding::Utf16Le);
        assert_eq!("latin-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("EBCDIC".parse::<Encoding>().is_err());
    }
}
