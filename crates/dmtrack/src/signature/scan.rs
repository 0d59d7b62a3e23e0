//! Linear wildcard scan over a module image

use memchr::memchr;
use tracing::debug;

use super::PatternSpec;

/// Find the offset of the first match of `pattern` in `haystack`.
///
/// Single forward pass. When the first pattern byte is concrete, `memchr`
/// skips straight to candidate positions; otherwise every offset is tried.
pub fn find_pattern(haystack: &[u8], pattern: &PatternSpec) -> Option<usize> {
    let len = pattern.len();
    if len == 0 || haystack.len() < len {
        return None;
    }
    let last = haystack.len() - len;

    match pattern.bytes()[0] {
        Some(first) => {
            let mut pos = 0;
            while pos <= last {
                let hit = pos + memchr(first, &haystack[pos..=last])?;
                if pattern.matches(&haystack[hit..hit + len]) {
                    return Some(hit);
                }
                pos = hit + 1;
            }
            None
        }
        None => (0..=last).find(|&i| pattern.matches(&haystack[i..i + len])),
    }
}

/// Memory image of a loaded module.
///
/// `bytes` covers `[base, base + bytes.len())` of the owning process.
#[derive(Debug, Clone, Copy)]
pub struct ModuleImage<'a> {
    pub base: usize,
    pub bytes: &'a [u8],
}

impl<'a> ModuleImage<'a> {
    pub fn new(base: usize, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address - self.base < self.bytes.len()
    }

    /// Absolute address of the first match, or `None`
    pub fn scan(&self, pattern: &PatternSpec) -> Option<usize> {
        let offset = find_pattern(self.bytes, pattern)?;
        let address = self.base + offset;
        debug!("Pattern {} matched at {:#x} (+{:#x})", pattern, address, offset);
        Some(address)
    }

    /// Rebase a virtual address from the reference image onto this module
    pub fn rebase(&self, va: u64, reference_base: u64) -> Option<usize> {
        let address = resolve_va(self.base, va, reference_base)?;
        self.contains(address).then_some(address)
    }
}

/// `module_base + (va - reference_base)`; `None` if `va` precedes the reference base.
pub fn resolve_va(module_base: usize, va: u64, reference_base: u64) -> Option<usize> {
    let rva = usize::try_from(va.checked_sub(reference_base)?).ok()?;
    module_base.checked_add(rva)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str) -> PatternSpec {
        PatternSpec::parse(text).unwrap()
    }

    #[test]
    fn test_find_pattern_with_wildcard() {
        let buffer = [0x00, 0xAA, 0x11, 0xCC, 0x00];
        assert_eq!(find_pattern(&buffer, &spec("AA ?? CC")), Some(1));
    }

    #[test]
    fn test_find_pattern_returns_first_occurrence() {
        let buffer = [0xAA, 0x00, 0xAA, 0x01, 0xCC, 0xAA, 0x02, 0xCC];
        assert_eq!(find_pattern(&buffer, &spec("AA ?? CC")), Some(2));
    }

    #[test]
    fn test_find_pattern_not_found() {
        let buffer = [0x00, 0xAA, 0x11, 0xCD, 0x00];
        assert_eq!(find_pattern(&buffer, &spec("AA ?? CC")), None);
    }

    #[test]
    fn test_find_pattern_leading_wildcard() {
        let buffer = [0x10, 0x20, 0x30, 0x40];
        assert_eq!(find_pattern(&buffer, &spec("?? 30 40")), Some(1));
        assert_eq!(find_pattern(&buffer, &spec("?? ?? ?? ??")), Some(0));
        assert_eq!(find_pattern(&buffer, &spec("?? ?? ?? ?? ??")), None);
    }

    #[test]
    fn test_find_pattern_at_end_of_buffer() {
        let buffer = [0x00, 0x00, 0x55, 0x8B, 0xEC];
        assert_eq!(find_pattern(&buffer, &spec("55 8B EC")), Some(2));
        assert_eq!(find_pattern(&buffer, &spec("8B EC 00")), None);
    }

    #[test]
    fn test_find_pattern_short_haystack() {
        assert_eq!(find_pattern(&[0xAA], &spec("AA BB")), None);
        assert_eq!(find_pattern(&[], &spec("AA")), None);
    }

    #[test]
    fn test_module_image_scan_is_absolute() {
        let bytes = [0x90, 0x90, 0x55, 0x8B, 0xEC, 0x90];
        let image = ModuleImage::new(0x0040_0000, &bytes);
        assert_eq!(image.scan(&spec("55 8B EC")), Some(0x0040_0002));
    }

    #[test]
    fn test_resolve_va_handles_relocation() {
        // Image relocated from 0x400000 to 0x1230000
        assert_eq!(
            resolve_va(0x0123_0000, 0x0045_E320, 0x0040_0000),
            Some(0x0128_E320)
        );
        assert_eq!(resolve_va(0x0123_0000, 0x0030_0000, 0x0040_0000), None);
    }

    #[test]
    fn test_rebase_rejects_out_of_module() {
        let bytes = vec![0u8; 0x1000];
        let image = ModuleImage::new(0x0050_0000, &bytes);
        assert_eq!(image.rebase(0x0040_0010, 0x0040_0000), Some(0x0050_0010));
        assert_eq!(image.rebase(0x0040_2000, 0x0040_0000), None);
    }
}
