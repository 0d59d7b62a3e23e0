//! Export lookup in a PE image file.
//!
//! The target process may be 32-bit while this tool is not, so export
//! addresses are taken from the module file on disk and rebased onto the
//! module's load address in the target.

use anyhow::{Context, Result, bail};

const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;
const SECTION_HEADER_LEN: usize = 40;

fn u16_at(bytes: &[u8], offset: usize) -> Result<u16> {
    let raw = bytes
        .get(offset..offset + 2)
        .with_context(|| format!("truncated image at {:#x}", offset))?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn u32_at(bytes: &[u8], offset: usize) -> Result<u32> {
    let raw = bytes
        .get(offset..offset + 4)
        .with_context(|| format!("truncated image at {:#x}", offset))?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

struct Image<'a> {
    bytes: &'a [u8],
    sections: Vec<Section>,
    export_rva: u32,
    export_size: u32,
}

impl<'a> Image<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.get(..2) != Some(b"MZ") {
            bail!("not a PE image (missing MZ header)");
        }
        let pe = u32_at(bytes, 0x3C)? as usize;
        if bytes.get(pe..pe + 4) != Some(b"PE\0\0") {
            bail!("not a PE image (missing PE signature)");
        }

        let coff = pe + 4;
        let section_count = u16_at(bytes, coff + 2)? as usize;
        let optional_len = u16_at(bytes, coff + 16)? as usize;
        let optional = coff + 20;

        let directories = match u16_at(bytes, optional)? {
            PE32_MAGIC => optional + 96,
            PE32_PLUS_MAGIC => optional + 112,
            other => bail!("unknown optional header magic {:#x}", other),
        };
        let export_rva = u32_at(bytes, directories)?;
        let export_size = u32_at(bytes, directories + 4)?;

        let table = optional + optional_len;
        let sections = (0..section_count)
            .map(|i| {
                let at = table + i * SECTION_HEADER_LEN;
                Ok(Section {
                    virtual_size: u32_at(bytes, at + 8)?,
                    virtual_address: u32_at(bytes, at + 12)?,
                    raw_size: u32_at(bytes, at + 16)?,
                    raw_offset: u32_at(bytes, at + 20)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bytes,
            sections,
            export_rva,
            export_size,
        })
    }

    fn offset_of(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find(|s| {
                let span = s.virtual_size.max(s.raw_size);
                rva >= s.virtual_address && rva - s.virtual_address < span
            })
            .map(|s| (rva - s.virtual_address + s.raw_offset) as usize)
            .with_context(|| format!("RVA {:#x} is outside every section", rva))
    }

    fn c_str_at(&self, rva: u32) -> Result<&'a [u8]> {
        let start = self.offset_of(rva)?;
        let tail = self.bytes.get(start..).context("name outside image")?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .context("unterminated export name")?;
        Ok(&tail[..len])
    }
}

/// RVA of the export named `name` in the PE image `bytes`
pub fn export_rva(bytes: &[u8], name: &str) -> Result<u32> {
    let image = Image::parse(bytes)?;
    if image.export_rva == 0 {
        bail!("image has no export table");
    }

    let dir = image.offset_of(image.export_rva)?;
    let function_count = u32_at(bytes, dir + 20)?;
    let name_count = u32_at(bytes, dir + 24)?;
    let functions = u32_at(bytes, dir + 28)?;
    let names = image.offset_of(u32_at(bytes, dir + 32)?)?;
    let ordinals = image.offset_of(u32_at(bytes, dir + 36)?)?;

    for i in 0..name_count as usize {
        let name_rva = u32_at(bytes, names + i * 4)?;
        if image.c_str_at(name_rva)? != name.as_bytes() {
            continue;
        }

        let ordinal = u16_at(bytes, ordinals + i * 2)? as u32;
        if ordinal >= function_count {
            bail!("export {} has ordinal {} out of range", name, ordinal);
        }
        let rva = u32_at(bytes, image.offset_of(functions)? + ordinal as usize * 4)?;

        let table_end = image.export_rva + image.export_size;
        if (image.export_rva..table_end).contains(&rva) {
            bail!("export {} is forwarded to another module", name);
        }
        return Ok(rva);
    }
    bail!("export {} not found", name)
}
