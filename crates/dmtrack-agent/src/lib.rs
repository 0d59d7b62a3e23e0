//! # dmtrack-agent
//!
//! Module loaded into the 32-bit host process. `DllMain` returns at once and
//! a worker thread waits for the host to settle, then installs the hooks.
//!
//! Exports `ToggleOverlay` and `ResetStats`, both callable as remote thread
//! entry points.

pub mod logging;
pub mod plan;

#[cfg(all(target_os = "windows", target_arch = "x86"))]
mod agent;
#[cfg(all(target_os = "windows", target_arch = "x86"))]
mod interceptors;

#[cfg(all(target_os = "windows", target_arch = "x86"))]
mod entry {
    use std::ffi::c_void;

    use windows::Win32::Foundation::{BOOL, HINSTANCE, TRUE};
    use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    use crate::agent;

    /// DLL entry point
    ///
    /// # Safety
    /// Called by the Windows loader under the loader lock; must return quickly.
    #[unsafe(no_mangle)]
    #[allow(non_snake_case)]
    pub unsafe extern "system" fn DllMain(
        hinst: HINSTANCE,
        reason: u32,
        reserved: *mut c_void,
    ) -> BOOL {
        match reason {
            DLL_PROCESS_ATTACH => agent::attach(hinst.0 as usize),
            // A null reserved pointer means FreeLibrary, not process exit
            DLL_PROCESS_DETACH => agent::detach(!reserved.is_null()),
            _ => {}
        }
        TRUE
    }

    /// Flip overlay visibility. Remote thread entry point.
    #[unsafe(no_mangle)]
    #[allow(non_snake_case)]
    pub extern "system" fn ToggleOverlay(_param: *mut c_void) -> u32 {
        agent::toggle_overlay()
    }

    /// Zero all statistics. Remote thread entry point.
    #[unsafe(no_mangle)]
    #[allow(non_snake_case)]
    pub extern "system" fn ResetStats(_param: *mut c_void) -> u32 {
        agent::reset_stats()
    }
}
