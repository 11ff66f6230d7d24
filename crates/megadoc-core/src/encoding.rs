//! Text encodings used to decode referenced files.
//!
//! Files are decoded with the configured default encoding first, then with
//! each fallback in order. When every strict attempt fails the content is
//! decoded lossily with the most permissive encoding in the chain, so a read
//! always produces text.

use std::borrow::Cow;

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A supported text encoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(try_from = "String", into = "String")]
pub enum TextEncoding {
    #[strum(to_string = "utf-8", serialize = "utf8", serialize = "utf_8")]
    Utf8,
    #[strum(
        to_string = "latin-1",
        serialize = "latin1",
        serialize = "latin_1",
        serialize = "iso-8859-1",
        serialize = "iso8859-1"
    )]
    Latin1,
    #[strum(to_string = "cp1252", serialize = "windows-1252", serialize = "windows1252")]
    Cp1252,
    /// UTF-16 with byte order mark detection, little endian when absent.
    #[strum(to_string = "utf-16", serialize = "utf16", serialize = "utf_16")]
    Utf16,
    #[strum(to_string = "ascii", serialize = "us-ascii")]
    Ascii,
}

impl From<TextEncoding> for String {
    fn from(encoding: TextEncoding) -> Self {
        encoding.to_string()
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = strum::ParseError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.trim().parse()
    }
}

impl TextEncoding {
    /// Whether every byte sequence decodes without error.
    pub fn is_permissive(self) -> bool {
        matches!(self, Self::Latin1 | Self::Cp1252)
    }

    /// Decode the whole buffer, failing on any invalid sequence.
    pub fn decode_strict(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Self::Latin1 => Some(decode_latin1(bytes)),
            Self::Cp1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
            Self::Utf16 => {
                let (encoding, body) = sniff_utf16(bytes);
                encoding
                    .decode_without_bom_handling_and_without_replacement(body)
                    .map(Cow::into_owned)
            }
            Self::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Decode the whole buffer, replacing invalid sequences with U+FFFD.
    pub fn decode_lossy(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Latin1 => decode_latin1(bytes),
            Self::Cp1252 => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
            Self::Utf16 => {
                let (encoding, body) = sniff_utf16(bytes);
                encoding.decode_without_bom_handling(body).0.into_owned()
            }
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
        }
    }
}

/// ISO-8859-1: every byte maps to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn sniff_utf16(bytes: &[u8]) -> (&'static encoding_rs::Encoding, &[u8]) {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => (UTF_16LE, rest),
        [0xFE, 0xFF, rest @ ..] => (UTF_16BE, rest),
        _ => (UTF_16LE, bytes),
    }
}

/// Text produced by [`decode_with_fallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Decoded text.
    pub text: String,
    /// Encoding that produced the text.
    pub encoding: TextEncoding,
    /// Whether invalid sequences were replaced.
    pub lossy: bool,
}

/// Pick the encoding used for lossy decoding when the strict chain fails.
pub fn most_permissive(chain: &[TextEncoding]) -> TextEncoding {
    chain
        .iter()
        .copied()
        .find(|e| *e == TextEncoding::Latin1)
        .or_else(|| chain.iter().copied().find(|e| e.is_permissive()))
        .unwrap_or(TextEncoding::Utf8)
}

/// Decode with `primary`, then each fallback in order, then lossily.
pub fn decode_with_fallback(
    bytes: &[u8],
    primary: TextEncoding,
    fallbacks: &[TextEncoding],
) -> Decoded {
    let mut chain = Vec::with_capacity(fallbacks.len() + 1);
    chain.push(primary);
    for encoding in fallbacks {
        if !chain.contains(encoding) {
            chain.push(*encoding);
        }
    }

    for &encoding in &chain {
        if let Some(text) = encoding.decode_strict(bytes) {
            return Decoded {
                text,
                encoding,
                lossy: false,
            };
        }
    }

    let encoding = most_permissive(&chain);
    Decoded {
        text: encoding.decode_lossy(bytes),
        encoding,
        lossy: true,
    }
}

/// Incremental decoder for chunked reads.
///
/// Decodes with the primary encoding across chunk boundaries. Bytes of a
/// sequence left incomplete at the end of a chunk are carried into the next
/// one. The first malformed sequence switches the stream to the permissive
/// encoding for the remainder of the input, starting at that sequence.
pub struct StreamDecoder {
    state: StreamState,
    permissive: TextEncoding,
    /// Incomplete trailing sequence of the previous chunk, at most 3 bytes.
    tail: Vec<u8>,
    /// UTF-16 byte order, fixed by the first bytes of the stream.
    utf16: Option<&'static encoding_rs::Encoding>,
}

#[derive(Clone, Copy)]
enum StreamState {
    Strict(TextEncoding),
    Fallback(TextEncoding),
}

impl StreamDecoder {
    /// Create a decoder for `primary`, falling back to `permissive`.
    pub fn new(primary: TextEncoding, permissive: TextEncoding) -> Self {
        Self {
            state: StreamState::Strict(primary),
            permissive,
            tail: Vec::new(),
            utf16: None,
        }
    }

    /// Whether the stream switched to the permissive encoding.
    pub fn is_fallback(&self) -> bool {
        matches!(self.state, StreamState::Fallback(_))
    }

    /// Decode the next chunk. `last` marks the end of input.
    pub fn decode_chunk(&mut self, bytes: &[u8], last: bool) -> String {
        let mut buf = std::mem::take(&mut self.tail);
        buf.extend_from_slice(bytes);

        let encoding = match self.state {
            StreamState::Fallback(encoding) => return encoding.decode_lossy(&buf),
            StreamState::Strict(encoding) => encoding,
        };

        let split = if last {
            buf.len()
        } else {
            self.complete_prefix(encoding, &buf)
        };
        let (head, rest) = buf.split_at(split);

        match self.decode_strict_part(encoding, head) {
            Some(text) => {
                self.tail = rest.to_vec();
                text
            }
            None => {
                // Keep the valid UTF-8 prefix, decode from the bad sequence on.
                let valid = match encoding {
                    TextEncoding::Utf8 => std::str::from_utf8(head)
                        .err()
                        .map_or(0, |e| e.valid_up_to()),
                    _ => 0,
                };
                let mut out = std::str::from_utf8(&buf[..valid])
                    .unwrap_or_default()
                    .to_owned();
                self.state = StreamState::Fallback(self.permissive);
                out.push_str(&self.permissive.decode_lossy(&buf[valid..]));
                out
            }
        }
    }

    /// Length of the prefix of `buf` that holds only whole sequences.
    fn complete_prefix(&self, encoding: TextEncoding, buf: &[u8]) -> usize {
        match encoding {
            TextEncoding::Utf8 => match std::str::from_utf8(buf) {
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                _ => buf.len(),
            },
            TextEncoding::Utf16 => {
                let even = buf.len() & !1;
                if even < 2 {
                    return 0;
                }
                let order = self.utf16.unwrap_or_else(|| sniff_utf16(buf).0);
                let unit = [buf[even - 2], buf[even - 1]];
                let unit = if order == UTF_16BE {
                    u16::from_be_bytes(unit)
                } else {
                    u16::from_le_bytes(unit)
                };
                // A high surrogate waits for its pair.
                if (0xD800..0xDC00).contains(&unit) { even - 2 } else { even }
            }
            TextEncoding::Latin1 | TextEncoding::Cp1252 | TextEncoding::Ascii => buf.len(),
        }
    }

    fn decode_strict_part(&mut self, encoding: TextEncoding, head: &[u8]) -> Option<String> {
        if encoding != TextEncoding::Utf16 {
            return encoding.decode_strict(head);
        }
        if head.is_empty() {
            return Some(String::new());
        }
        let (order, body) = match self.utf16 {
            Some(order) => (order, head),
            None => sniff_utf16(head),
        };
        self.utf16 = Some(order);
        order
            .decode_without_bom_handling_and_without_replacement(body)
            .map(Cow::into_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        assert_eq!("utf-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("UTF8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("latin-1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert_eq!("windows-1252".parse::<TextEncoding>().unwrap(), TextEncoding::Cp1252);
        assert_eq!(TextEncoding::Utf16.to_string(), "utf-16");
        assert!("klingon".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_fallback_to_latin1() {
        let bytes = [0xFF, 0xFE, 0x00, 0x00];
        let decoded = decode_with_fallback(
            &bytes,
            TextEncoding::Utf8,
            &[TextEncoding::Latin1, TextEncoding::Cp1252],
        );
        assert_eq!(decoded.encoding, TextEncoding::Latin1);
        assert!(!decoded.lossy);
        assert_eq!(decoded.text.chars().count(), 4);
    }

    #[test]
    fn test_lossy_when_chain_is_strict() {
        let bytes = [b'o', b'k', 0xFF];
        let decoded = decode_with_fallback(&bytes, TextEncoding::Utf8, &[TextEncoding::Ascii]);
        assert!(decoded.lossy);
        assert_eq!(decoded.encoding, TextEncoding::Utf8);
        assert_eq!(decoded.text, "ok\u{FFFD}");
    }

    #[test]
    fn test_utf16_with_bom() {
        let bytes = [0xFF, 0xFE, b'h', 0x00, b'i', 0x00];
        assert_eq!(TextEncoding::Utf16.decode_strict(&bytes).as_deref(), Some("hi"));
        assert_eq!(TextEncoding::Utf16.decode_strict(&[b'h']), None);
    }

    #[test]
    fn test_stream_decoder_splits_multibyte() {
        let text = "héllo wörld";
        let bytes = text.as_bytes();
        let mut decoder = StreamDecoder::new(TextEncoding::Utf8, TextEncoding::Latin1);

        // Split inside the two-byte 'é'.
        let mut out = decoder.decode_chunk(&bytes[..2], false);
        out.push_str(&decoder.decode_chunk(&bytes[2..], true));

        assert_eq!(out, text);
        assert!(!decoder.is_fallback());
    }

    #[test]
    fn test_stream_decoder_switches_on_malformed() {
        let mut decoder = StreamDecoder::new(TextEncoding::Utf8, TextEncoding::Latin1);
        let out = decoder.decode_chunk(&[b'a', 0xFF, b'b'], false);
        assert!(decoder.is_fallback());
        assert_eq!(out, "a\u{FF}b");

        let more = decoder.decode_chunk(&[0xE9], true);
        assert_eq!(more, "\u{E9}");
    }

    #[test]
    fn test_stream_decoder_malformed_across_chunks() {
        let mut decoder = StreamDecoder::new(TextEncoding::Utf8, TextEncoding::Latin1);
        let mut out = decoder.decode_chunk(&[b'x', 0xC3], false);
        out.push_str(&decoder.decode_chunk(&[b'A', b'B'], true));

        assert_eq!(out, "x\u{C3}AB");
        assert!(decoder.is_fallback());
        let whole = decode_with_fallback(&[b'x', 0xC3, b'A', b'B'], TextEncoding::Utf8, &[TextEncoding::Latin1]);
        assert_eq!(out, whole.text);
    }

    #[test]
    fn test_stream_decoder_incomplete_at_end() {
        let mut decoder = StreamDecoder::new(TextEncoding::Utf8, TextEncoding::Latin1);
        let mut out = decoder.decode_chunk(&[b'o', b'k', 0xE2, 0x82], false);
        out.push_str(&decoder.decode_chunk(&[], true));
        assert_eq!(out, "ok\u{E2}\u{82}");
    }

    #[test]
    fn test_stream_decoder_utf16_surrogate_split() {
        let text = "a\u{1F600}b";
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        let mut decoder = StreamDecoder::new(TextEncoding::Utf16, TextEncoding::Latin1);

        let out: String = bytes
            .chunks(3)
            .enumerate()
            .map(|(i, chunk)| decoder.decode_chunk(chunk, (i + 1) * 3 >= bytes.len()))
            .collect();
        assert_eq!(out, text);
        assert!(!decoder.is_fallback());
    }
}
