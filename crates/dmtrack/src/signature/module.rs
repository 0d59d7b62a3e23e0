//! Loaded-module lookup inside the current process

use crate::error::{Error, Result};

/// Base address and image size of a module loaded in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub base: usize,
    pub size: usize,
}

impl ModuleInfo {
    /// View the module image as bytes.
    ///
    /// # Safety
    /// The module must stay loaded and its whole image must be readable for
    /// the lifetime of the returned slice.
    pub unsafe fn image(&self) -> super::ModuleImage<'static> {
        // SAFETY: guaranteed by the caller; the loader maps SizeOfImage bytes at base.
        let bytes = unsafe { std::slice::from_raw_parts(self.base as *const u8, self.size) };
        super::ModuleImage::new(self.base, bytes)
    }
}

/// Find a module of the current process by name (`None` = the main executable).
#[cfg(target_os = "windows")]
pub fn find_module(name: Option<&str>) -> Result<ModuleInfo> {
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::System::ProcessStatus::{GetModuleInformation, MODULEINFO};
    use windows::Win32::System::Threading::GetCurrentProcess;
    use windows::core::{HSTRING, PCWSTR};

    let label = name.unwrap_or("<main module>").to_string();
    let wide = name.map(HSTRING::from);

    // SAFETY: GetModuleHandleW does not take a reference on the module; a null name
    // yields the executable that created the process.
    let module = unsafe {
        match &wide {
            Some(w) => GetModuleHandleW(w),
            None => GetModuleHandleW(PCWSTR::null()),
        }
    }
    .map_err(|e| Error::TargetUnresolved(format!("{}: {}", label, e)))?;

    let mut info = MODULEINFO::default();
    // SAFETY: info is a properly sized out-parameter for a module of this process.
    unsafe {
        GetModuleInformation(
            GetCurrentProcess(),
            module,
            &mut info,
            std::mem::size_of::<MODULEINFO>() as u32,
        )
    }
    .map_err(|e| Error::TargetUnresolved(format!("{}: {}", label, e)))?;

    Ok(ModuleInfo {
        base: info.lpBaseOfDll as usize,
        size: info.SizeOfImage as usize,
    })
}

#[cfg(not(target_os = "windows"))]
pub fn find_module(name: Option<&str>) -> Result<ModuleInfo> {
    Err(Error::TargetUnresolved(format!(
        "{}: module lookup is only supported on Windows",
        name.unwrap_or("<main module>")
    )))
}
