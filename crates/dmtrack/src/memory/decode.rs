//! Decoders for host memory
//!
//! This is the only place where raw host bytes are reinterpreted as typed
//! values. Every function takes a span (or a reader plus address) together
//! with an explicit layout and returns `Error::MalformedInput` when the bytes
//! do not fit the assumption.

use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::memory::layout::{msvc_string, stl_buffer, text};
use crate::memory::reader::{ReadMemory, check_plausible};

/// Decode host narrow text (Windows-1252) into a Rust string
pub fn decode_narrow(bytes: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Where an MSVC `std::string` keeps its characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringStorage {
    /// Small-string buffer inside the object
    Inline(Vec<u8>),
    /// Heap buffer of `len` bytes at `pointer`
    Heap { pointer: u64, len: usize },
}

/// Interpret a 24-byte MSVC `std::string` object.
///
/// Branches on the capacity field: below the inline capacity the characters
/// live in the object itself, otherwise the first word is a heap pointer.
/// The declared size is clamped to `text::MAX_MESSAGE_LEN`.
pub fn parse_msvc_string(address: u64, object: &[u8]) -> Result<StringStorage> {
    if object.len() < msvc_string::OBJECT_SIZE {
        return Err(Error::malformed(address, "truncated string object"));
    }
    let size = le_u32(object, msvc_string::SIZE as usize) as usize;
    let capacity = le_u32(object, msvc_string::CAPACITY as usize) as usize;

    if size > capacity {
        return Err(Error::malformed(
            address,
            format!("string size {} exceeds capacity {}", size, capacity),
        ));
    }

    if capacity < msvc_string::INLINE_CAPACITY {
        let start = msvc_string::BUFFER as usize;
        return Ok(StringStorage::Inline(object[start..start + size].to_vec()));
    }

    let pointer = u64::from(le_u32(object, msvc_string::BUFFER as usize));
    check_plausible(pointer, size.max(1))?;
    Ok(StringStorage::Heap {
        pointer,
        len: size.min(text::MAX_MESSAGE_LEN),
    })
}

/// Read and decode an MSVC `std::string` object located at `address`
pub fn read_msvc_string<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Result<String> {
    let object = reader.read_bytes(address, msvc_string::OBJECT_SIZE)?;
    match parse_msvc_string(address, &object)? {
        StringStorage::Inline(bytes) => Ok(decode_narrow(&bytes)),
        StringStorage::Heap { len: 0, .. } => Ok(String::new()),
        StringStorage::Heap { pointer, len } => {
            let bytes = reader.read_bytes(pointer, len)?;
            Ok(decode_narrow(&bytes))
        }
    }
}

/// Read a NUL-terminated narrow string of at most `max_len` bytes.
///
/// Reads in small chunks so a string ending just before an unmapped page is
/// still recovered; an unterminated string is truncated at `max_len`.
pub fn read_c_string<R: ReadMemory + ?Sized>(
    reader: &R,
    address: u64,
    max_len: usize,
) -> Result<String> {
    const CHUNK: usize = 64;

    check_plausible(address, 1)?;
    let mut collected = Vec::new();
    while collected.len() < max_len {
        let cursor = address + collected.len() as u64;
        let want = CHUNK.min(max_len - collected.len());
        let chunk = match reader.read_bytes(cursor, want) {
            Ok(chunk) => chunk,
            // Fall back to one byte at a time near the end of a mapping
            Err(_) => vec![reader.read_u8(cursor)?],
        };
        if let Some(nul) = memchr::memchr(0, &chunk) {
            collected.extend_from_slice(&chunk[..nul]);
            return Ok(decode_narrow(&collected));
        }
        collected.extend_from_slice(&chunk);
    }
    collected.truncate(max_len);
    Ok(decode_narrow(&collected))
}

/// Width and signedness of a packet field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    U8,
    U16,
    #[default]
    I32,
    I64,
}

impl FieldKind {
    pub fn size(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::I32 => 4,
            FieldKind::I64 => 8,
        }
    }
}

/// Position of one field inside a packet span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub offset: usize,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(offset: usize, kind: FieldKind) -> Self {
        Self { offset, kind }
    }

    pub fn end(&self) -> usize {
        self.offset + self.kind.size()
    }
}

/// Read one field out of a packet span, widened to `i64`
pub fn read_field(address: u64, span: &[u8], field: FieldSpec) -> Result<i64> {
    let bytes = span.get(field.offset..field.end()).ok_or_else(|| {
        Error::malformed(
            address + field.offset as u64,
            format!(
                "field at +{:#x} ({} bytes) outside {} byte packet",
                field.offset,
                field.kind.size(),
                span.len()
            ),
        )
    })?;

    let value = match field.kind {
        FieldKind::U8 => i64::from(bytes[0]),
        FieldKind::U16 => i64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        FieldKind::I32 => i64::from(le_i32(bytes, 0)),
        FieldKind::I64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            i64::from_le_bytes(raw)
        }
    };
    Ok(value)
}

/// How the handler argument leads to the packet bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferAccess {
    /// The argument points at the payload itself
    Direct,
    /// The argument points at a packet reader holding a data pointer and a size
    #[default]
    StlBuffer,
}

/// Copy the packet bytes reachable from a handler argument.
///
/// `min_len` is the number of bytes the caller needs (the furthest configured
/// field); for `Direct` access that is all that is read.
pub fn read_packet_span<R: ReadMemory + ?Sized>(
    reader: &R,
    argument: u64,
    access: BufferAccess,
    min_len: usize,
) -> Result<Vec<u8>> {
    match access {
        BufferAccess::Direct => reader.read_bytes(argument, min_len),
        BufferAccess::StlBuffer => {
            let data = reader.read_ptr(argument + stl_buffer::DATA)?;
            let size = reader.read_u32(argument + stl_buffer::SIZE)? as usize;
            if size < min_len {
                return Err(Error::malformed(
                    argument,
                    format!("packet of {} bytes shorter than layout ({})", size, min_len),
                ));
            }
            reader.read_bytes(data, size.min(text::MAX_PACKET_SPAN).max(min_len))
        }
    }
}

/// Uppercase hex of the first `limit` bytes, space separated
pub fn hex_prefix(bytes: &[u8], limit: usize) -> String {
    bytes
        .iter()
        .take(limit)
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn le_i32(bytes: &[u8], offset: usize) -> i32 {
    le_u32(bytes, offset) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::MockMemoryReader;

    #[test]
    fn test_inline_string() {
        let reader = MockMemoryReader::builder()
            .with_msvc_string(0x0010_0000, "Hi there", 0)
            .build();
        assert_eq!(read_msvc_string(&reader, 0x0010_0000).unwrap(), "Hi there");
    }

    #[test]
    fn test_heap_string() {
        let text = "You receive: [Healing Potion] x3";
        let reader = MockMemoryReader::builder()
            .with_msvc_string(0x0010_0000, text, 0x0020_0000)
            .build();
        assert_eq!(read_msvc_string(&reader, 0x0010_0000).unwrap(), text);
    }

    #[test]
    fn test_inline_never_reads_past_size() {
        let mut object = [0u8; 24];
        object[..15].copy_from_slice(b"abcdefghijklmno");
        object[16] = 3;
        object[20] = 15;
        assert_eq!(
            parse_msvc_string(0x0010_0000, &object).unwrap(),
            StringStorage::Inline(b"abc".to_vec())
        );
    }

    #[test]
    fn test_size_above_capacity_is_malformed() {
        let mut object = [0u8; 24];
        object[16] = 20;
        object[20] = 15;
        assert!(parse_msvc_string(0x0010_0000, &object).is_err());
    }

    #[test]
    fn test_heap_pointer_must_be_plausible() {
        let mut object = [0u8; 24];
        object[..4].copy_from_slice(&0x20u32.to_le_bytes());
        object[16] = 40;
        object[20] = 47;
        let err = parse_msvc_string(0x0010_0000, &object).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { address: 0x20, .. }));
    }

    #[test]
    fn test_heap_length_is_clamped() {
        let mut object = [0u8; 24];
        object[..4].copy_from_slice(&0x0020_0000u32.to_le_bytes());
        object[16..20].copy_from_slice(&5000u32.to_le_bytes());
        object[20..24].copy_from_slice(&5000u32.to_le_bytes());
        assert_eq!(
            parse_msvc_string(0x0010_0000, &object).unwrap(),
            StringStorage::Heap {
                pointer: 0x0020_0000,
                len: text::MAX_MESSAGE_LEN
            }
        );
    }

    #[test]
    fn test_decode_narrow_windows_1252() {
        assert_eq!(decode_narrow(b"caf\xE9"), "café");
        assert_eq!(decode_narrow(b"\x80 5"), "€ 5");
    }

    #[test]
    fn test_read_c_string_stops_at_nul() {
        let reader = MockMemoryReader::builder()
            .with_c_string(0x0010_0000, "[Guild] hello")
            .build();
        assert_eq!(
            read_c_string(&reader, 0x0010_0000, 512).unwrap(),
            "[Guild] hello"
        );
    }

    #[test]
    fn test_read_c_string_truncates_unterminated() {
        let reader = MockMemoryReader::builder()
            .with_bytes(0x0010_0000, &[b'a'; 100])
            .build();
        let text = read_c_string(&reader, 0x0010_0000, 10).unwrap();
        assert_eq!(text, "aaaaaaaaaa");
    }

    #[test]
    fn test_read_field_kinds() {
        let span = [0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0x2C, 0x01, 0x00, 0x00];
        assert_eq!(read_field(0, &span, FieldSpec::new(0, FieldKind::U8)).unwrap(), 0x10);
        assert_eq!(read_field(0, &span, FieldSpec::new(1, FieldKind::I32)).unwrap(), -1);
        assert_eq!(read_field(0, &span, FieldSpec::new(5, FieldKind::U16)).unwrap(), 300);
        assert!(read_field(0, &span, FieldSpec::new(6, FieldKind::I32)).is_err());
    }

    #[test]
    fn test_read_packet_span_through_stl_buffer() {
        let payload = [7u8, 0, 0, 0, 150, 0, 0, 0];
        let mut reader_object = Vec::new();
        reader_object.extend_from_slice(&0x0030_0000u32.to_le_bytes());
        reader_object.extend_from_slice(&0u32.to_le_bytes());
        reader_object.extend_from_slice(&(payload.len() as u32).to_le_bytes());

        let reader = MockMemoryReader::builder()
            .with_bytes(0x0010_0000, &reader_object)
            .with_bytes(0x0030_0000, &payload)
            .build();

        let span = read_packet_span(&reader, 0x0010_0000, BufferAccess::StlBuffer, 8).unwrap();
        assert_eq!(span, payload);
        assert!(read_packet_span(&reader, 0x0010_0000, BufferAccess::StlBuffer, 12).is_err());
    }

    #[test]
    fn test_hex_prefix() {
        assert_eq!(hex_prefix(&[0x0A, 0xFF, 0x00], 2), "0A FF");
        assert_eq!(hex_prefix(&[], 16), "");
    }
}
