//! NDR string types
//!
//! NDR strings are conformant varying arrays with a null terminator.
//!
//! Wire format:
//! ```text
//! max_count: u32    # Capacity in units, including null
//! offset: u32       # Always 0
//! actual_count: u32 # Transmitted units, including null
//! units[actual_count]
//! zero units[max_count - actual_count]
//! ```
//!
//! Without an explicit capacity `max_count` equals `actual_count`.

use std::fmt;

use tracing::debug;

use crate::arrays::ArrayHeader;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

fn write_terminated<'a, U: Copy + Default>(
    w: &mut NdrWriter<'a>,
    units: &[U],
    max_count: Option<usize>,
    put: impl Fn(&mut NdrWriter<'a>, U) -> Result<()>,
) -> Result<()> {
    let actual_count = units.len() + 1;
    let header = ArrayHeader::varying(max_count.unwrap_or(actual_count), 0, actual_count);
    header.write_varying(w)?;
    for &unit in units {
        put(w, unit)?;
    }
    for _ in 0..=header.padding() {
        put(w, U::default())?;
    }
    Ok(())
}

/// Read a terminated string's units with the terminator and any trailing
/// zero padding removed, along with the wire `max_count`.
fn read_terminated<'a, U: Copy + Default + PartialEq>(
    r: &mut NdrReader<'a>,
    unit_size: usize,
    get: impl Fn(&mut NdrReader<'a>) -> Result<U>,
) -> Result<(Vec<U>, usize)> {
    let header = ArrayHeader::read_varying(r)?;
    if header.offset != 0 {
        debug!(offset = header.offset, "string with non-zero offset");
        return Err(NdrError::InvalidString(format!("non-zero offset {}", header.offset)));
    }
    r.check_available(header.max_count, unit_size)?;

    let mut units = Vec::with_capacity(header.actual_count);
    for _ in 0..header.actual_count {
        units.push(get(r)?);
    }
    if units.last() != Some(&U::default()) {
        debug!(actual_count = header.actual_count, "string without terminator");
        return Err(NdrError::InvalidString("missing null terminator".to_string()));
    }
    for _ in 0..header.padding() {
        get(r)?;
    }
    while units.last() == Some(&U::default()) {
        units.pop();
    }
    Ok((units, header.max_count))
}

fn check_capacity(max_count: Option<usize>, actual_count: usize) -> Result<()> {
    match max_count {
        Some(max_count) if max_count < actual_count => Err(NdrError::ConformanceMismatch {
            max_count: u32::try_from(max_count).unwrap_or(u32::MAX),
            actual_count: u32::try_from(actual_count).unwrap_or(u32::MAX),
        }),
        _ => Ok(()),
    }
}

/// ANSI string type (null-terminated char*)
///
/// Used for `[string]` annotated `char*` parameters in MIDL. Decoded as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdrString(pub String);

impl NdrString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for NdrString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl NdrEncode for NdrString {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        write_terminated(w, self.0.as_bytes(), None, NdrWriter::write_u8)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrString {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        let (units, _) = read_terminated(r, 1, NdrReader::read_u8)?;
        self.0 = String::from_utf8(units)?;
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        12
    }
}

/// Wide string type (null-terminated wchar_t*, UTF-16)
///
/// Used for `[string]` annotated `wchar_t*` / `LPWSTR` parameters. An explicit
/// `max_count` reserves capacity beyond the text; the spare units travel as
/// zeros.
#[derive(Debug, Clone, Default)]
pub struct NdrWString {
    pub text: String,
    pub max_count: Option<usize>,
}

impl NdrWString {
    pub fn new(s: impl Into<String>) -> Self {
        Self {
            text: s.into(),
            max_count: None,
        }
    }

    /// Text with a capacity of `max_count` UTF-16 units, terminator included
    pub fn with_max(s: impl Into<String>, max_count: usize) -> Self {
        Self {
            text: s.into(),
            max_count: Some(max_count),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// UTF-16 units on the wire, terminator included
    pub fn actual_count(&self) -> usize {
        self.text.encode_utf16().count() + 1
    }

    /// Capacity on the wire
    pub fn effective_max_count(&self) -> usize {
        self.max_count.unwrap_or_else(|| self.actual_count())
    }
}

impl PartialEq for NdrWString {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.effective_max_count() == other.effective_max_count()
    }
}

impl Eq for NdrWString {}

impl From<&str> for NdrWString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NdrWString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for NdrWString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl NdrEncode for NdrWString {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        let units: Vec<u16> = self.text.encode_utf16().collect();
        write_terminated(w, &units, self.max_count, NdrWriter::write_u16)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_prepare(&self) -> Result<()> {
        check_capacity(self.max_count, self.actual_count())
    }
}

impl NdrDecode for NdrWString {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        let (units, max_count) = read_terminated(r, 2, NdrReader::read_u16)?;
        self.text = char::decode_utf16(units).collect::<std::result::Result<String, _>>()?;
        self.max_count = (max_count != self.actual_count()).then_some(max_count);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        12
    }
}
