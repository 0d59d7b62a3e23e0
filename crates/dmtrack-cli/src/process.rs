//! Remote process plumbing: lookup, module lists and remote thread calls.

use std::path::PathBuf;
use std::time::Duration;

/// How long a remote call (LoadLibraryW, FreeLibrary, an agent export) may take
pub const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A module loaded in another process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteModule {
    pub name: String,
    pub path: PathBuf,
    pub base: usize,
}

/// Find `name` among `modules` (case-insensitive, as the loader compares)
pub fn find_by_name<'a>(modules: &'a [RemoteModule], name: &str) -> Option<&'a RemoteModule> {
    modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// Names a copy of the agent may have been loaded under: the plain name,
/// then numbered variants 1..=6.
pub fn agent_module_names(module: &str) -> Vec<String> {
    let (stem, ext) = match module.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (module, String::new()),
    };
    std::iter::once(module.to_string())
        .chain((1..=6).map(|n| format!("{}{}{}", stem, n, ext)))
        .collect()
}

#[cfg(target_os = "windows")]
pub use windows_impl::{RemoteProcess, find_process, list_modules, remote_export};

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::ffi::c_void;
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::{Context, Result, bail};
    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
    use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAllocEx, VirtualFreeEx,
    };
    use windows::Win32::System::Threading::{
        CreateRemoteThread, GetExitCodeThread, LPTHREAD_START_ROUTINE, OpenProcess,
        PROCESS_ALL_ACCESS, WaitForSingleObject,
    };

    use super::{RemoteModule, find_by_name};
    use crate::pe;

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    struct Snapshot(HANDLE);

    impl Drop for Snapshot {
        fn drop(&mut self) {
            // SAFETY: the handle came from CreateToolhelp32Snapshot and is closed once.
            let _ = unsafe { CloseHandle(self.0) };
        }
    }

    /// PID of the first process whose executable is `name`
    pub fn find_process(name: &str) -> Result<u32> {
        // SAFETY: process snapshot with an owned, zero-initialized entry.
        let snapshot = Snapshot(
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
                .context("CreateToolhelp32Snapshot failed")?,
        );
        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry.dwSize is set; the snapshot handle is valid.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szExeFile).eq_ignore_ascii_case(name) {
                return Ok(entry.th32ProcessID);
            }
            // SAFETY: as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }
        bail!("{} is not running", name)
    }

    /// Modules loaded in `pid`, 32-bit ones included
    pub fn list_modules(pid: u32) -> Result<Vec<RemoteModule>> {
        // SAFETY: module snapshot of another process; failure is reported.
        let snapshot = Snapshot(
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
                .with_context(|| format!("cannot list modules of process {}", pid))?,
        );
        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        let mut modules = Vec::new();
        // SAFETY: entry.dwSize is set; the snapshot handle is valid.
        let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            modules.push(RemoteModule {
                name: wide_to_string(&entry.szModule),
                path: PathBuf::from(wide_to_string(&entry.szExePath)),
                base: entry.modBaseAddr as usize,
            });
            // SAFETY: as above.
            more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
        }
        debug!("Process {} has {} module(s)", pid, modules.len());
        Ok(modules)
    }

    /// Address of `export` of `module` inside process `pid`
    pub fn remote_export(pid: u32, module: &str, export: &str) -> Result<usize> {
        let modules = list_modules(pid)?;
        let found = find_by_name(&modules, module)
            .with_context(|| format!("{} is not loaded in process {}", module, pid))?;
        let image = std::fs::read(&found.path)
            .with_context(|| format!("cannot read {}", found.path.display()))?;
        let rva = pe::export_rva(&image, export)
            .with_context(|| format!("{}!{}", module, export))?;
        Ok(found.base + rva as usize)
    }

    /// An opened target process
    pub struct RemoteProcess {
        handle: HANDLE,
        pid: u32,
    }

    impl RemoteProcess {
        pub fn open(pid: u32) -> Result<Self> {
            // SAFETY: plain handle acquisition; closed in Drop.
            let handle = unsafe { OpenProcess(PROCESS_ALL_ACCESS, false, pid) }
                .with_context(|| format!("cannot open process {} (run as Administrator?)", pid))?;
            Ok(Self { handle, pid })
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }

        /// Copy `bytes` into fresh memory in the target; freed when the
        /// returned buffer drops.
        pub fn write_buffer(&self, bytes: &[u8]) -> Result<RemoteBuffer<'_>> {
            // SAFETY: allocation in the target; checked for null below.
            let address = unsafe {
                VirtualAllocEx(
                    self.handle,
                    None,
                    bytes.len(),
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_READWRITE,
                )
            };
            if address.is_null() {
                bail!("VirtualAllocEx failed in process {}", self.pid);
            }
            let buffer = RemoteBuffer {
                process: self,
                address,
            };

            let mut written = 0;
            // SAFETY: the destination was just allocated with bytes.len() bytes.
            unsafe {
                WriteProcessMemory(
                    self.handle,
                    address,
                    bytes.as_ptr() as *const c_void,
                    bytes.len(),
                    Some(&mut written),
                )
            }
            .context("WriteProcessMemory failed")?;
            if written != bytes.len() {
                bail!("short write: {} of {} bytes", written, bytes.len());
            }
            Ok(buffer)
        }

        /// Run `function(parameter)` on a new thread in the target and return
        /// its exit code.
        pub fn call(&self, function: usize, parameter: usize, timeout: Duration) -> Result<u32> {
            // SAFETY: `function` is an address in the target with the thread
            // start signature; it is never called in this process.
            let start: LPTHREAD_START_ROUTINE = unsafe {
                std::mem::transmute::<usize, Option<unsafe extern "system" fn(*mut c_void) -> u32>>(
                    function,
                )
            };
            // SAFETY: the process handle is valid with full access.
            let thread = unsafe {
                CreateRemoteThread(
                    self.handle,
                    None,
                    0,
                    start,
                    Some(parameter as *const c_void),
                    0,
                    None,
                )
            }
            .context("CreateRemoteThread failed")?;

            // SAFETY: thread handle owned here and closed below.
            let waited = unsafe { WaitForSingleObject(thread, timeout.as_millis() as u32) };
            let mut code = 0u32;
            // SAFETY: as above.
            let exit = unsafe { GetExitCodeThread(thread, &mut code) };
            // SAFETY: as above.
            let _ = unsafe { CloseHandle(thread) };

            if waited != WAIT_OBJECT_0 {
                bail!("remote call at {:#x} did not finish within {:?}", function, timeout);
            }
            exit.context("GetExitCodeThread failed")?;
            Ok(code)
        }
    }

    impl Drop for RemoteProcess {
        fn drop(&mut self) {
            // SAFETY: handle from OpenProcess, closed once.
            let _ = unsafe { CloseHandle(self.handle) };
        }
    }

    /// Memory allocated inside the target
    pub struct RemoteBuffer<'a> {
        process: &'a RemoteProcess,
        address: *mut c_void,
    }

    impl RemoteBuffer<'_> {
        pub fn address(&self) -> usize {
            self.address as usize
        }
    }

    impl Drop for RemoteBuffer<'_> {
        fn drop(&mut self) {
            // SAFETY: allocated by VirtualAllocEx in the same process.
            let _ = unsafe { VirtualFreeEx(self.process.handle, self.address, 0, MEM_RELEASE) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, base: usize) -> RemoteModule {
        RemoteModule {
            name: name.to_string(),
            path: PathBuf::from(format!("C:/Games/Host/{}", name)),
            base,
        }
    }

    #[test]
    fn test_agent_module_names() {
        let names = agent_module_names("dmtrack_agent.dll");
        assert_eq!(names.len(), 7);
        assert_eq!(names[0], "dmtrack_agent.dll");
        assert_eq!(names[1], "dmtrack_agent1.dll");
        assert_eq!(names[6], "dmtrack_agent6.dll");
    }

    #[test]
    fn test_agent_module_names_without_extension() {
        assert_eq!(agent_module_names("agent")[2], "agent2");
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let modules = vec![module("KERNEL32.DLL", 0x7600_0000), module("dmtrack_agent.dll", 0x1000_0000)];
        assert_eq!(find_by_name(&modules, "kernel32.dll").map(|m| m.base), Some(0x7600_0000));
        assert!(find_by_name(&modules, "user32.dll").is_none());
    }
}
