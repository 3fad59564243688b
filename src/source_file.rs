//! Reading and writing translation units with their original encoding.
//!
//! The pass works on decoded text. Files come back out in the codec they came
//! in with, byte-order mark included, and an output that already holds the
//! exact bytes is never rewritten so mtime-driven builds stay quiet.
//!
//! Detection order: byte-order marks (UTF-32 before UTF-16, since the UTF-32LE
//! mark starts with the UTF-16LE one), then a zero-byte heuristic for UTF-16
//! without a mark, then UTF-8, GB18030 and Windows-1252 in that order.

use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, GB18030, WINDOWS_1252};
use thiserror::Error;

use crate::errors::{ErrorReporting, PassError, PhaseContext};

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF32_LE: &[u8] = &[0xFF, 0xFE, 0x00, 0x00];
const BOM_UTF32_BE: &[u8] = &[0x00, 0x00, 0xFE, 0xFF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

/// Codecs tried in order on input without a byte-order mark.
const FALLBACK_CODECS: [Codec; 3] = [Codec::Utf8, Codec::Gb18030, Codec::Windows1252];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Gb18030,
    /// Also covers Latin-1: every byte maps to a character.
    Windows1252,
}

impl Codec {
    /// Codec announced by a leading byte-order mark, and the mark's length.
    fn from_bom(raw: &[u8]) -> Option<(Self, usize)> {
        [
            (Self::Utf8, BOM_UTF8),
            (Self::Utf32Le, BOM_UTF32_LE),
            (Self::Utf32Be, BOM_UTF32_BE),
            (Self::Utf16Le, BOM_UTF16_LE),
            (Self::Utf16Be, BOM_UTF16_BE),
        ]
        .into_iter()
        .find(|(_, bom)| raw.starts_with(bom))
        .map(|(codec, bom)| (codec, bom.len()))
    }

    fn bom(self) -> &'static [u8] {
        match self {
            Self::Utf8 => BOM_UTF8,
            Self::Utf16Le => BOM_UTF16_LE,
            Self::Utf16Be => BOM_UTF16_BE,
            Self::Utf32Le => BOM_UTF32_LE,
            Self::Utf32Be => BOM_UTF32_BE,
            Self::Gb18030 | Self::Windows1252 => &[],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16-le",
            Self::Utf16Be => "utf-16-be",
            Self::Utf32Le => "utf-32-le",
            Self::Utf32Be => "utf-32-be",
            Self::Gb18030 => "gb18030",
            Self::Windows1252 => "windows-1252",
        }
    }

    fn decode(self, payload: &[u8]) -> Result<String, CodecError> {
        match self {
            Self::Utf8 => std::str::from_utf8(payload)
                .map(str::to_string)
                .map_err(|e| CodecError::InvalidUtf8(e.valid_up_to())),
            Self::Utf16Le => decode_utf16(payload, u16::from_le_bytes),
            Self::Utf16Be => decode_utf16(payload, u16::from_be_bytes),
            Self::Utf32Le => decode_utf32(payload, u32::from_le_bytes),
            Self::Utf32Be => decode_utf32(payload, u32::from_be_bytes),
            Self::Gb18030 => decode_legacy(GB18030, payload, self),
            Self::Windows1252 => decode_legacy(WINDOWS_1252, payload, self),
        }
    }

    fn encode_into(self, text: &str, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            Self::Utf8 => out.extend_from_slice(text.as_bytes()),
            Self::Utf16Le => out.extend(text.encode_utf16().flat_map(u16::to_le_bytes)),
            Self::Utf16Be => out.extend(text.encode_utf16().flat_map(u16::to_be_bytes)),
            Self::Utf32Le => out.extend(text.chars().flat_map(|c| u32::from(c).to_le_bytes())),
            Self::Utf32Be => out.extend(text.chars().flat_map(|c| u32::from(c).to_be_bytes())),
            Self::Gb18030 => out.extend_from_slice(&encode_legacy(GB18030, text, self)?),
            Self::Windows1252 => out.extend_from_slice(&encode_legacy(WINDOWS_1252, text, self)?),
        }
        Ok(())
    }
}

/// Decoded file content and how to encode it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub text: String,
    pub codec: Codec,
    pub has_bom: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid UTF-8 at byte {0}")]
    InvalidUtf8(usize),
    #[error("odd number of bytes in UTF-16 data")]
    TruncatedUtf16,
    #[error("unpaired UTF-16 surrogate")]
    InvalidUtf16,
    #[error("UTF-32 data length is not a multiple of four")]
    TruncatedUtf32,
    #[error("UTF-32 code unit is not a Unicode scalar value")]
    InvalidUtf32,
    #[error("malformed {0} data")]
    Malformed(&'static str),
    #[error("text has characters that {0} cannot represent")]
    Unencodable(&'static str),
}

/// Whether a write actually touched the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

impl SourceText {
    /// Plain UTF-8 without a byte-order mark.
    pub fn utf8(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            codec: Codec::Utf8,
            has_bom: false,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        if let Some((codec, bom_len)) = Codec::from_bom(raw) {
            let text = codec.decode(&raw[bom_len..])?;
            return Ok(Self {
                text,
                codec,
                has_bom: true,
            });
        }

        if let Some(codec) = sniff_bomless_utf16(raw) {
            let text = codec.decode(raw)?;
            return Ok(Self {
                text,
                codec,
                has_bom: false,
            });
        }

        let mut first_error = None;
        for codec in FALLBACK_CODECS {
            match codec.decode(raw) {
                Ok(text) => {
                    if codec != Codec::Utf8 {
                        tracing::debug!(codec = codec.name(), "input is not UTF-8, decoded with fallback codec");
                    }
                    return Ok(Self {
                        text,
                        codec,
                        has_bom: false,
                    });
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(CodecError::Malformed(Codec::Utf8.name())))
    }

    /// Encodes `text` the way this file was encoded.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(text.len() + 4);
        if self.has_bom {
            out.extend_from_slice(self.codec.bom());
        }
        self.codec.encode_into(text, &mut out)?;
        Ok(out)
    }
}

/// UTF-16 without a mark: ASCII-heavy text leaves one byte of every pair zero.
fn sniff_bomless_utf16(raw: &[u8]) -> Option<Codec> {
    if raw.len() < 4 {
        return None;
    }
    let even_zeros = raw.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_zeros = raw.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let (many, few) = (raw.len() / 8, raw.len() / 32);
    if odd_zeros > many && even_zeros < few {
        Some(Codec::Utf16Le)
    } else if even_zeros > many && odd_zeros < few {
        Some(Codec::Utf16Be)
    } else {
        None
    }
}

fn decode_utf16(payload: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, CodecError> {
    if payload.len() % 2 != 0 {
        return Err(CodecError::TruncatedUtf16);
    }
    let units = payload.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| CodecError::InvalidUtf16)
}

fn decode_utf32(payload: &[u8], unit: fn([u8; 4]) -> u32) -> Result<String, CodecError> {
    if payload.len() % 4 != 0 {
        return Err(CodecError::TruncatedUtf32);
    }
    payload
        .chunks_exact(4)
        .map(|quad| char::from_u32(unit([quad[0], quad[1], quad[2], quad[3]])).ok_or(CodecError::InvalidUtf32))
        .collect()
}

fn decode_legacy(encoding: &'static Encoding, payload: &[u8], codec: Codec) -> Result<String, CodecError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(payload)
        .map(|text| text.into_owned())
        .ok_or(CodecError::Malformed(codec.name()))
}

fn encode_legacy(encoding: &'static Encoding, text: &str, codec: Codec) -> Result<Vec<u8>, CodecError> {
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(CodecError::Unencodable(codec.name()));
    }
    Ok(bytes.into_owned())
}

fn io_phase() -> PhaseContext {
    PhaseContext::detached("io")
}

pub fn read_source(path: &Path) -> Result<SourceText, PassError> {
    let shown = path.display().to_string();
    let raw = fs::read(path).map_err(|e| io_phase().io_failure("read", &shown, e))?;
    SourceText::decode(&raw).map_err(|e| io_phase().io_failure("decode", &shown, e))
}

/// Writes `text` encoded like `like`, unless `path` already holds those bytes.
pub fn write_source(path: &Path, text: &str, like: &SourceText) -> Result<WriteOutcome, PassError> {
    let shown = path.display().to_string();
    let payload = like
        .encode(text)
        .map_err(|e| io_phase().io_failure("encode", &shown, e))?;

    if let Ok(existing) = fs::read(path) {
        if existing == payload {
            tracing::debug!(path = %shown, "output unchanged, not rewriting");
            return Ok(WriteOutcome::Unchanged);
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| io_phase().io_failure("create directory for", &shown, e))?;
    }
    fs::write(path, &payload).map_err(|e| io_phase().io_failure("write", &shown, e))?;
    Ok(WriteOutcome::Written)
}
