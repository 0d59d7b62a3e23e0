//! Inline detours in the current process, backed by `retour`

use std::collections::HashMap;

use retour::RawDetour;
use tracing::{debug, trace, warn};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First, Thread32Next,
};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
    PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, VirtualQuery,
};
use windows::Win32::System::Threading::{
    GetCurrentProcessId, GetCurrentThreadId, OpenThread, ResumeThread, SuspendThread,
    THREAD_SUSPEND_RESUME,
};

use crate::error::{Error, Result};
use crate::hook::freeze::{FixedList, freeze_targets};
use crate::hook::registry::CodePatcher;

/// `CodePatcher` that writes jumps with `retour` while every other thread is
/// suspended
#[derive(Default)]
pub struct DetourPatcher {
    detours: HashMap<usize, RawDetour>,
}

// SAFETY: detours only hold code addresses of this process; all mutation goes
// through &mut self.
unsafe impl Send for DetourPatcher {}

impl DetourPatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodePatcher for DetourPatcher {
    fn is_executable(&self, target: usize) -> bool {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: VirtualQuery only inspects the page table; info is a valid out-parameter.
        let written = unsafe {
            VirtualQuery(
                Some(target as *const _),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 || info.State != MEM_COMMIT || (info.Protect.0 & PAGE_GUARD.0) != 0 {
            return false;
        }
        let exec = PAGE_EXECUTE.0
            | PAGE_EXECUTE_READ.0
            | PAGE_EXECUTE_READWRITE.0
            | PAGE_EXECUTE_WRITECOPY.0;
        info.Protect.0 & exec != 0
    }

    fn create(&mut self, target: usize, interceptor: usize) -> Result<usize> {
        if self.detours.contains_key(&target) {
            return Err(Error::HookConflict(target));
        }
        // SAFETY: target was checked executable by the registry and interceptor
        // is a function with the same calling convention and arguments.
        let detour = unsafe { RawDetour::new(target as *const (), interceptor as *const ()) }
            .map_err(|e| Error::PatchFailed(format!("{:#x}: {}", target, e)))?;
        let original = detour.trampoline() as *const () as usize;
        trace!("Trampoline for {:#x} at {:#x}", target, original);
        self.detours.insert(target, detour);
        Ok(original)
    }

    fn enable(&mut self, target: usize) -> Result<()> {
        let detour = self.detours.get(&target).ok_or(Error::InvalidTarget(target))?;
        // SAFETY: other threads are suspended while the jump is written.
        frozen(|| unsafe { detour.enable() })
            .map_err(|e| Error::PatchFailed(format!("{:#x}: {}", target, e)))
    }

    fn disable(&mut self, target: usize) -> Result<()> {
        let detour = self.detours.get(&target).ok_or(Error::InvalidTarget(target))?;
        if !detour.is_enabled() {
            return Ok(());
        }
        // SAFETY: as in enable.
        frozen(|| unsafe { detour.disable() })
            .map_err(|e| Error::PatchFailed(format!("{:#x}: {}", target, e)))
    }

    fn remove(&mut self, target: usize) -> Result<()> {
        let detour = self.detours.remove(&target).ok_or(Error::InvalidTarget(target))?;
        if detour.is_enabled() {
            // SAFETY: as in enable.
            if let Err(e) = frozen(|| unsafe { detour.disable() }) {
                warn!("Disable before removal failed at {:#x}: {}", target, e);
            }
        }
        drop(detour);
        debug!("Detour at {:#x} released", target);
        Ok(())
    }
}

/// Run `patch` with every other thread suspended. Errors are formatted and
/// logged by the caller, after the threads are running again.
fn frozen<T>(patch: impl FnOnce() -> T) -> T {
    let freeze = ThreadFreeze::all_others();
    let suspended = freeze.count();
    let result = patch();
    drop(freeze);
    trace!("Patched with {} thread(s) suspended", suspended);
    result
}

/// Suspends every other thread of this process until dropped.
///
/// Threads that cannot be opened are skipped; the freeze is best effort and
/// never waits on a host thread. Nothing allocates or logs between the first
/// suspension and the last resume.
struct ThreadFreeze {
    threads: FixedList<HANDLE>,
}

impl ThreadFreeze {
    fn all_others() -> Self {
        let targets = other_threads();
        let mut threads = FixedList::with_capacity(targets.len());

        for &thread_id in &targets {
            // SAFETY: plain handle acquisition; owned by `threads` or closed here.
            unsafe {
                let Ok(handle) = OpenThread(THREAD_SUSPEND_RESUME, false, thread_id) else {
                    continue;
                };
                if SuspendThread(handle) == u32::MAX {
                    let _ = CloseHandle(handle);
                    continue;
                }
                // Capacity covers every target, so this cannot fail.
                if let Err(handle) = threads.try_push(handle) {
                    ResumeThread(handle);
                    let _ = CloseHandle(handle);
                }
            }
        }

        Self { threads }
    }

    fn count(&self) -> usize {
        self.threads.len()
    }
}

impl Drop for ThreadFreeze {
    fn drop(&mut self) {
        for handle in self.threads.drain() {
            // SAFETY: each handle was suspended by all_others and is owned here.
            unsafe {
                ResumeThread(handle);
                let _ = CloseHandle(handle);
            }
        }
    }
}

/// IDs of every other thread of this process, gathered before any suspension
fn other_threads() -> Vec<u32> {
    // SAFETY: plain Win32 queries on the current process.
    let (pid, current) = unsafe { (GetCurrentProcessId(), GetCurrentThreadId()) };

    // SAFETY: snapshot handle is closed below; entry is a valid out-parameter.
    unsafe {
        let snapshot = match CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Thread snapshot failed, patching without freeze: {}", e);
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        let mut entry = THREADENTRY32 {
            dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
            ..Default::default()
        };
        let mut more = Thread32First(snapshot, &mut entry).is_ok();
        while more {
            entries.push((entry.th32OwnerProcessID, entry.th32ThreadID));
            entry.dwSize = std::mem::size_of::<THREADENTRY32>() as u32;
            more = Thread32Next(snapshot, &mut entry).is_ok();
        }
        let _ = CloseHandle(snapshot);
        freeze_targets(entries, pid, current)
    }
}
