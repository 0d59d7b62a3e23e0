use tracing::trace;

use crate::error::{Error, Result};
use crate::memory::layout::address;

/// Trait for reading memory of the host process.
///
/// Implementors only provide `read_bytes`; every typed accessor is built on it
/// and decodes little-endian. Implementations must refuse implausible ranges
/// with `Error::MalformedInput` instead of faulting.
pub trait ReadMemory {
    /// Read `size` bytes starting at `address`
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u64) -> Result<u8> {
        Ok(to_array::<1>(address, self.read_bytes(address, 1)?)?[0])
    }

    fn read_u16(&self, address: u64) -> Result<u16> {
        Ok(u16::from_le_bytes(to_array(address, self.read_bytes(address, 2)?)?))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        Ok(u32::from_le_bytes(to_array(address, self.read_bytes(address, 4)?)?))
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        Ok(i32::from_le_bytes(to_array(address, self.read_bytes(address, 4)?)?))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        Ok(u64::from_le_bytes(to_array(address, self.read_bytes(address, 8)?)?))
    }

    fn read_i64(&self, address: u64) -> Result<i64> {
        Ok(i64::from_le_bytes(to_array(address, self.read_bytes(address, 8)?)?))
    }

    /// Read a 32-bit host pointer and reject it unless it is plausible
    fn read_ptr(&self, address: u64) -> Result<u64> {
        let value = u64::from(self.read_u32(address)?);
        check_plausible(value, 1)?;
        Ok(value)
    }

}

fn to_array<const N: usize>(address: u64, bytes: Vec<u8>) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::malformed(address, format!("short read of {} bytes", N)))
}

/// Validate that `[address, address + len)` lies in the plausible user range
pub fn check_plausible(address: u64, len: usize) -> Result<()> {
    if address < address::MIN_PLAUSIBLE {
        return Err(Error::malformed(address, "pointer below plausible range"));
    }
    let last = address
        .checked_add(len.saturating_sub(1) as u64)
        .ok_or_else(|| Error::malformed(address, "range overflows"))?;
    if last > address::MAX_PLAUSIBLE {
        return Err(Error::malformed(address, "pointer above plausible range"));
    }
    Ok(())
}

pub fn is_plausible(address: u64) -> bool {
    check_plausible(address, 1).is_ok()
}

/// Reader over the memory of the process this code runs in.
///
/// Every read is range-checked and then confirmed against the page table
/// (`VirtualQuery`) so an unmapped or guard page yields `MalformedInput`
/// instead of an access violation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMemory;

impl LocalMemory {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "windows")]
impl ReadMemory for LocalMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        check_plausible(address, size)?;
        ensure_readable(address, size)?;

        let mut buffer = vec![0u8; size];
        // SAFETY: the whole range was verified committed and readable just above.
        unsafe {
            std::ptr::copy_nonoverlapping(address as usize as *const u8, buffer.as_mut_ptr(), size);
        }
        trace!("Read {} bytes at {:#x}", size, address);
        Ok(buffer)
    }
}

#[cfg(not(target_os = "windows"))]
impl ReadMemory for LocalMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        check_plausible(address, size)?;
        trace!("Refusing {} byte read at {:#x}", size, address);
        Err(Error::malformed(
            address,
            "in-process reads are only supported on Windows",
        ))
    }
}

/// Walk the regions covering the range and require each to be committed and readable
#[cfg(target_os = "windows")]
fn ensure_readable(address: u64, size: usize) -> Result<()> {
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS, VirtualQuery,
    };

    let end = address + size as u64;
    let mut cursor = address;
    while cursor < end {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: VirtualQuery only inspects the page table; info is a valid out-parameter.
        let written = unsafe {
            VirtualQuery(
                Some(cursor as usize as *const _),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return Err(Error::malformed(cursor, "address not mapped"));
        }
        if info.State != MEM_COMMIT
            || (info.Protect.0 & (PAGE_NOACCESS.0 | PAGE_GUARD.0)) != 0
            || info.Protect.0 == 0
        {
            return Err(Error::malformed(cursor, "page not readable"));
        }
        let region_end = info.BaseAddress as usize as u64 + info.RegionSize as u64;
        if region_end <= cursor {
            return Err(Error::malformed(cursor, "region query made no progress"));
        }
        cursor = region_end;
    }
    Ok(())
}
