//! USB string descriptors (USB2 9.6.7).
//!
//! Labels are kept as UTF-8 and converted to UTF-16LE on request. Only code points that fit a
//! single UTF-16 code unit are supported; four byte UTF-8 sequences are rejected.

use thiserror::Error;

use crate::usb::DescriptorKind;

/// Index of the Microsoft OS string descriptor. Never looked up in the table.
pub const STRING_ID_WINUSB: u8 = 0xEE;

/// Longest label, in characters, that still fits the one byte `bLength`.
pub const MAX_STRING_CHARS: usize = 126;

pub const LANGUAGE_EN_US: u16 = 0x0409;

pub const STRING_ID_MANUFACTURER: u8 = 1;
pub const STRING_ID_PRODUCT: u8 = 2;
pub const STRING_ID_SERIAL: u8 = 3;
pub const STRING_ID_CONFIG_HS: u8 = 4;
pub const STRING_ID_CONFIG_LS: u8 = 5;
pub const STRING_ID_INTERFACE: u8 = 6;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StringError {
    #[error("string #{0} not found")]
    NotFound(u8),

    #[error("string #{0} is malformed or needs a surrogate pair")]
    Encoding(u8),
}

#[derive(Clone, Debug)]
pub struct StringTable {
    language: u16,
    strings: Vec<(u8, String)>,
}

impl StringTable {
    pub fn new(language: u16) -> Self {
        Self {
            language,
            strings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, id: u8, label: impl Into<String>) -> Self {
        self.strings.push((id, label.into()));
        self
    }

    pub fn language(&self) -> u16 {
        self.language
    }

    /// First entry with a matching id, in declaration order.
    pub fn get(&self, id: u8) -> Option<&str> {
        self.strings
            .iter()
            .find(|(string_id, _)| *string_id == id)
            .map(|(_, label)| label.as_str())
    }

    /// Builds string descriptor `id`, cut to at most `max_len` bytes.
    ///
    /// Descriptor zero is the language list. The WinUSB index is the caller's business.
    pub fn encode_string(&self, id: u8, max_len: usize) -> Result<Vec<u8>, StringError> {
        let mut desc = if id == 0 {
            let language = self.language.to_le_bytes();
            vec![4, DescriptorKind::String as u8, language[0], language[1]]
        } else {
            let label = self.get(id).ok_or(StringError::NotFound(id))?;
            let units = utf8_to_utf16(label.as_bytes(), MAX_STRING_CHARS)
                .ok_or(StringError::Encoding(id))?;

            let mut desc = Vec::with_capacity(2 + 2 * units.len());
            desc.push((2 + 2 * units.len()) as u8);
            desc.push(DescriptorKind::String as u8);
            for unit in units {
                desc.extend_from_slice(&unit.to_le_bytes());
            }
            desc
        };

        desc.truncate(max_len);
        Ok(desc)
    }
}

/// Decodes at most `max_chars` characters of `bytes` into UTF-16 code units.
///
/// Accepts non-minimal encodings. Rejects surrogate code points, stray continuation bytes,
/// truncated sequences and anything longer than three bytes. Decoding stops at a NUL byte.
pub fn utf8_to_utf16(bytes: &[u8], max_chars: usize) -> Option<Vec<u16>> {
    let mut units = Vec::new();
    let mut iter = bytes.iter().copied();

    while units.len() < max_chars {
        let Some(c) = iter.next() else {
            break;
        };
        if c == 0 {
            break;
        }

        let unit = if c & 0x80 == 0 {
            u16::from(c)
        } else if c & 0xE0 == 0xC0 {
            // 00000yyyyyxxxxxx = 110yyyyy 10xxxxxx
            (u16::from(c & 0x1F) << 6) | continuation(&mut iter)?
        } else if c & 0xF0 == 0xE0 {
            // zzzzyyyyyyxxxxxx = 1110zzzz 10yyyyyy 10xxxxxx
            let high = u16::from(c & 0x0F) << 12;
            let mid = continuation(&mut iter)? << 6;
            let unit = high | mid | continuation(&mut iter)?;
            if (0xD800..=0xDFFF).contains(&unit) {
                return None;
            }
            unit
        } else {
            // TODO: four byte sequences need a surrogate pair, emit both halves.
            return None;
        };

        units.push(unit);
    }

    Some(units)
}

fn continuation(iter: &mut impl Iterator<Item = u8>) -> Option<u16> {
    let c = iter.next()?;
    if c & 0xC0 != 0x80 {
        return None;
    }
    Some(u16::from(c & 0x3F))
}
