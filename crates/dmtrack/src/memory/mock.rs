//! In-memory stand-in for host memory, used by tests and offline decoding

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::memory::reader::{ReadMemory, check_plausible};

/// Sparse memory image made of independent regions
#[derive(Debug, Default, Clone)]
pub struct MockMemoryReader {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl MockMemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MockMemoryBuilder {
        MockMemoryBuilder::default()
    }

    fn region_for(&self, address: u64, size: usize) -> Option<&[u8]> {
        let (&start, bytes) = self.regions.range(..=address).next_back()?;
        let offset = usize::try_from(address - start).ok()?;
        let end = offset.checked_add(size)?;
        bytes.get(offset..end)
    }
}

impl ReadMemory for MockMemoryReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        check_plausible(address, size)?;
        self.region_for(address, size)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::malformed(address, format!("{} bytes not mapped", size)))
    }
}

/// Builder for [`MockMemoryReader`]
///
/// Each `with_*` call maps a fresh region; regions must not overlap.
#[derive(Debug, Default)]
pub struct MockMemoryBuilder {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl MockMemoryBuilder {
    pub fn with_bytes(mut self, address: u64, bytes: &[u8]) -> Self {
        self.regions.insert(address, bytes.to_vec());
        self
    }

    pub fn with_zeroed(self, address: u64, size: usize) -> Self {
        self.with_bytes(address, &vec![0u8; size])
    }

    pub fn with_u32(self, address: u64, value: u32) -> Self {
        self.with_bytes(address, &value.to_le_bytes())
    }

    pub fn with_i32(self, address: u64, value: i32) -> Self {
        self.with_bytes(address, &value.to_le_bytes())
    }

    pub fn with_i64(self, address: u64, value: i64) -> Self {
        self.with_bytes(address, &value.to_le_bytes())
    }

    /// Map a NUL-terminated narrow string
    pub fn with_c_string(self, address: u64, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.with_bytes(address, &bytes)
    }

    /// Map a 32-bit MSVC `std::string` object at `address`.
    ///
    /// Short text is stored inline; longer text goes to `heap` and the object
    /// holds a pointer to it.
    pub fn with_msvc_string(self, address: u64, text: &str, heap: u64) -> Self {
        use crate::memory::layout::msvc_string;

        let bytes = text.as_bytes();
        let mut object = [0u8; msvc_string::OBJECT_SIZE];
        let builder = if bytes.len() < msvc_string::INLINE_CAPACITY {
            object[..bytes.len()].copy_from_slice(bytes);
            object[msvc_string::CAPACITY as usize..][..4]
                .copy_from_slice(&((msvc_string::INLINE_CAPACITY - 1) as u32).to_le_bytes());
            self
        } else {
            object[..4].copy_from_slice(&(heap as u32).to_le_bytes());
            object[msvc_string::CAPACITY as usize..][..4]
                .copy_from_slice(&(bytes.len() as u32).to_le_bytes());
            self.with_c_string(heap, text)
        };
        object[msvc_string::SIZE as usize..][..4]
            .copy_from_slice(&(bytes.len() as u32).to_le_bytes());
        builder.with_bytes(address, &object)
    }

    pub fn build(self) -> MockMemoryReader {
        MockMemoryReader {
            regions: self.regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_reads_within_region() {
        let reader = MockMemoryReader::builder()
            .with_bytes(0x0010_0000, &[1, 2, 3, 4, 5, 6, 7, 8])
            .build();

        assert_eq!(reader.read_bytes(0x0010_0002, 3).unwrap(), vec![3, 4, 5]);
        assert_eq!(reader.read_u32(0x0010_0000).unwrap(), 0x0403_0201);
    }

    #[test]
    fn test_mock_rejects_reads_past_region() {
        let reader = MockMemoryReader::builder()
            .with_zeroed(0x0010_0000, 4)
            .build();

        assert!(reader.read_bytes(0x0010_0002, 4).is_err());
        assert!(reader.read_u32(0x0020_0000).is_err());
    }

    #[test]
    fn test_mock_rejects_implausible_address() {
        let reader = MockMemoryReader::builder().with_zeroed(0x100, 16).build();
        assert!(reader.read_u32(0x100).is_err());
    }

    #[test]
    fn test_read_ptr_validates_target() {
        let reader = MockMemoryReader::builder()
            .with_u32(0x0010_0000, 0x0020_0000)
            .with_u32(0x0010_1000, 0x0000_0010)
            .build();

        assert_eq!(reader.read_ptr(0x0010_0000).unwrap(), 0x0020_0000);
        assert!(reader.read_ptr(0x0010_1000).is_err());
    }
}
