//! Transports for the shared snapshot
//!
//! A channel hands out exclusive access to the block for the duration of a
//! closure, waiting at most `timeout` for the lock. `NamedChannel` is the
//! cross-process implementation (file mapping plus named mutex);
//! `LocalChannel` keeps the block in this process.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::shared::layout::SharedSnapshot;

pub trait SnapshotChannel: Send + Sync {
    /// Run `f` on the block while holding the lock.
    ///
    /// Returns `Error::LockTimeout` when the lock is not acquired in time; `f`
    /// is not run in that case.
    fn with_locked(&self, timeout: Duration, f: &mut dyn FnMut(&mut SharedSnapshot)) -> Result<()>;

    /// Copy the whole block out
    fn read(&self, timeout: Duration) -> Result<SharedSnapshot> {
        let mut copy = SharedSnapshot::zeroed();
        self.with_locked(timeout, &mut |block| copy = *block)?;
        Ok(copy)
    }
}

impl<C: SnapshotChannel + ?Sized> SnapshotChannel for Arc<C> {
    fn with_locked(&self, timeout: Duration, f: &mut dyn FnMut(&mut SharedSnapshot)) -> Result<()> {
        (**self).with_locked(timeout, f)
    }
}

/// In-process channel; clones share the same block
#[derive(Debug, Clone)]
pub struct LocalChannel {
    block: Arc<Mutex<Box<SharedSnapshot>>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self {
            block: Arc::new(Mutex::new(Box::new(SharedSnapshot::zeroed()))),
        }
    }

    /// Hold the lock until the returned guard drops (lets tests simulate contention)
    pub fn hold(&self) -> parking_lot::MutexGuard<'_, Box<SharedSnapshot>> {
        self.block.lock()
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotChannel for LocalChannel {
    fn with_locked(&self, timeout: Duration, f: &mut dyn FnMut(&mut SharedSnapshot)) -> Result<()> {
        let mut guard = self
            .block
            .try_lock_for(timeout)
            .ok_or(Error::LockTimeout(timeout))?;
        f(&mut **guard);
        Ok(())
    }
}

#[cfg(target_os = "windows")]
pub use named::NamedChannel;

#[cfg(target_os = "windows")]
mod named {
    use std::time::Duration;

    use tracing::{debug, info, warn};
    use windows::Win32::Foundation::{
        CloseHandle, HANDLE, INVALID_HANDLE_VALUE, WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT,
    };
    use windows::Win32::System::Memory::{
        CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
        OpenFileMappingW, PAGE_READWRITE, UnmapViewOfFile,
    };
    use windows::Win32::System::Threading::{
        CreateMutexW, MUTEX_MODIFY_STATE, OpenMutexW, ReleaseMutex, SYNCHRONIZATION_SYNCHRONIZE,
        WaitForSingleObject,
    };
    use windows::core::HSTRING;

    use super::SnapshotChannel;
    use crate::config::ChannelConfig;
    use crate::error::{Error, Result};
    use crate::shared::layout::{SNAPSHOT_SIZE, SharedSnapshot};

    /// Named file mapping guarded by a named mutex
    pub struct NamedChannel {
        mapping: HANDLE,
        mutex: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
    }

    // SAFETY: the handles are process-wide kernel objects and the view is only
    // touched while the named mutex is held.
    unsafe impl Send for NamedChannel {}
    unsafe impl Sync for NamedChannel {}

    impl NamedChannel {
        /// Create (or attach to) the mapping and mutex as the producer
        pub fn create(config: &ChannelConfig) -> Result<Self> {
            let mutex_name = HSTRING::from(config.mutex_name.as_str());
            let mapping_name = HSTRING::from(config.shared_memory_name.as_str());

            // SAFETY: plain kernel object creation with owned name strings.
            let mutex = unsafe { CreateMutexW(None, false, &mutex_name) }
                .map_err(|e| Error::ChannelUnavailable(format!("CreateMutexW: {}", e)))?;

            // SAFETY: pagefile-backed mapping of exactly one snapshot.
            let mapping = match unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    None,
                    PAGE_READWRITE,
                    0,
                    SNAPSHOT_SIZE as u32,
                    &mapping_name,
                )
            } {
                Ok(handle) => handle,
                Err(e) => {
                    close(mutex);
                    return Err(Error::ChannelUnavailable(format!("CreateFileMappingW: {}", e)));
                }
            };

            let channel = Self::map(mapping, mutex)?;
            info!("Created shared snapshot '{}'", config.shared_memory_name);
            Ok(channel)
        }

        /// Open an existing mapping as a consumer
        pub fn open(config: &ChannelConfig) -> Result<Self> {
            let mutex_name = HSTRING::from(config.mutex_name.as_str());
            let mapping_name = HSTRING::from(config.shared_memory_name.as_str());

            // SAFETY: opening named kernel objects; failure is reported, not assumed.
            let mapping = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, &mapping_name) }
                .map_err(|e| Error::ChannelUnavailable(format!("OpenFileMappingW: {}", e)))?;

            // SAFETY: as above.
            let mutex = match unsafe {
                OpenMutexW(
                    SYNCHRONIZATION_SYNCHRONIZE | MUTEX_MODIFY_STATE,
                    false,
                    &mutex_name,
                )
            } {
                Ok(handle) => handle,
                Err(e) => {
                    close(mapping);
                    return Err(Error::ChannelUnavailable(format!("OpenMutexW: {}", e)));
                }
            };

            let channel = Self::map(mapping, mutex)?;
            debug!("Opened shared snapshot '{}'", config.shared_memory_name);
            Ok(channel)
        }

        fn map(mapping: HANDLE, mutex: HANDLE) -> Result<Self> {
            // SAFETY: mapping is a valid section handle of at least SNAPSHOT_SIZE bytes.
            let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, SNAPSHOT_SIZE) };
            if view.Value.is_null() {
                close(mapping);
                close(mutex);
                return Err(Error::ChannelUnavailable(
                    "MapViewOfFile returned null".to_string(),
                ));
            }
            Ok(Self {
                mapping,
                mutex,
                view,
            })
        }
    }

    impl SnapshotChannel for NamedChannel {
        fn with_locked(
            &self,
            timeout: Duration,
            f: &mut dyn FnMut(&mut SharedSnapshot),
        ) -> Result<()> {
            let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
            // SAFETY: mutex is a live handle owned by self.
            let wait = unsafe { WaitForSingleObject(self.mutex, millis) };
            if wait == WAIT_TIMEOUT {
                return Err(Error::LockTimeout(timeout));
            }
            if wait != WAIT_OBJECT_0 && wait != WAIT_ABANDONED {
                return Err(Error::ChannelUnavailable(format!(
                    "WaitForSingleObject returned {:#x}",
                    wait.0
                )));
            }
            if wait == WAIT_ABANDONED {
                warn!("Previous owner of the snapshot mutex exited while holding it");
            }

            // SAFETY: the view maps SNAPSHOT_SIZE bytes, SharedSnapshot accepts any
            // bit pattern, and the named mutex serializes every accessor.
            let block = unsafe { &mut *self.view.Value.cast::<SharedSnapshot>() };
            f(block);

            // SAFETY: this thread owns the mutex after the successful wait above.
            if let Err(e) = unsafe { ReleaseMutex(self.mutex) } {
                warn!("ReleaseMutex failed: {}", e);
            }
            Ok(())
        }
    }

    impl Drop for NamedChannel {
        fn drop(&mut self) {
            // SAFETY: the view came from MapViewOfFile and is unmapped exactly once.
            if let Err(e) = unsafe { UnmapViewOfFile(self.view) } {
                warn!("UnmapViewOfFile failed: {}", e);
            }
            close(self.mapping);
            close(self.mutex);
        }
    }

    fn close(handle: HANDLE) {
        // SAFETY: handle is owned by the caller and closed exactly once.
        if let Err(e) = unsafe { CloseHandle(handle) } {
            warn!("CloseHandle failed: {}", e);
        }
    }
}
