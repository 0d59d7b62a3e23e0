//! Hook bookkeeping independent of how code is actually patched

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hook::point::HookPoint;

/// Primitive that rewrites executable memory.
///
/// Implementations must make `enable`/`disable` appear atomic to other
/// threads of the process.
pub trait CodePatcher {
    /// Whether `target` lies in committed, executable memory
    fn is_executable(&self, target: usize) -> bool;

    /// Build the redirection without activating it.
    ///
    /// Returns the address of a callable that runs the original function.
    fn create(&mut self, target: usize, interceptor: usize) -> Result<usize>;

    fn enable(&mut self, target: usize) -> Result<()>;

    fn disable(&mut self, target: usize) -> Result<()>;

    /// Tear the redirection down and free its trampoline
    fn remove(&mut self, target: usize) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HookState {
    Uninstalled,
    Installed,
    Enabled,
    Disabled,
    Removed,
}

impl HookState {
    /// The target is still patched (or may be re-enabled)
    pub fn is_active(self) -> bool {
        matches!(self, HookState::Installed | HookState::Enabled | HookState::Disabled)
    }
}

/// Where an interceptor finds the original function.
///
/// Written by the registry before the redirection goes live, so an
/// interceptor never observes an empty slot while it is reachable.
#[derive(Debug)]
pub struct OriginalSlot(AtomicUsize);

impl OriginalSlot {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            address => Some(address),
        }
    }

    fn set(&self, address: usize) {
        self.0.store(address, Ordering::Release);
    }

    fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

impl Default for OriginalSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct HookDescriptor {
    pub point: HookPoint,
    pub target: usize,
    pub interceptor: usize,
    pub state: HookState,
    slot: &'static OriginalSlot,
}

impl HookDescriptor {
    pub fn original(&self) -> Option<usize> {
        self.slot.get()
    }
}

pub struct HookRegistry<P: CodePatcher> {
    patcher: P,
    hooks: BTreeMap<usize, HookDescriptor>,
}

impl<P: CodePatcher> HookRegistry<P> {
    pub fn new(patcher: P) -> Self {
        Self {
            patcher,
            hooks: BTreeMap::new(),
        }
    }

    /// Redirect `target` to `interceptor` and return the original-function address.
    ///
    /// Either fully applied or not applied at all: on failure the target is
    /// left unpatched and `slot` empty.
    pub fn install(
        &mut self,
        point: HookPoint,
        target: usize,
        interceptor: usize,
        slot: &'static OriginalSlot,
    ) -> Result<usize> {
        if self.hooks.get(&target).is_some_and(|h| h.state.is_active()) {
            return Err(Error::HookConflict(target));
        }
        if target == 0 || !self.patcher.is_executable(target) {
            return Err(Error::InvalidTarget(target));
        }

        let original = self.patcher.create(target, interceptor)?;
        debug!("{}: detour created at {:#x}", point, target);
        slot.set(original);

        if let Err(e) = self.patcher.enable(target) {
            slot.clear();
            if let Err(cleanup) = self.patcher.remove(target) {
                warn!("{}: cleanup after failed enable also failed: {}", point, cleanup);
            }
            return Err(e);
        }

        self.hooks.insert(
            target,
            HookDescriptor {
                point,
                target,
                interceptor,
                state: HookState::Enabled,
                slot,
            },
        );
        info!("{} hook enabled at {:#x}", point, target);
        Ok(original)
    }

    /// Stop redirecting without freeing the trampoline
    pub fn disable(&mut self, target: usize) -> Result<()> {
        let hook = self
            .hooks
            .get_mut(&target)
            .filter(|h| h.state == HookState::Enabled)
            .ok_or(Error::InvalidTarget(target))?;
        self.patcher.disable(target)?;
        hook.state = HookState::Disabled;
        Ok(())
    }

    pub fn enable(&mut self, target: usize) -> Result<()> {
        let hook = self
            .hooks
            .get_mut(&target)
            .filter(|h| matches!(h.state, HookState::Installed | HookState::Disabled))
            .ok_or(Error::InvalidTarget(target))?;
        self.patcher.enable(target)?;
        hook.state = HookState::Enabled;
        Ok(())
    }

    /// Undo every active installation. Safe to call repeatedly.
    ///
    /// Returns how many hooks were removed by this call.
    pub fn remove_all(&mut self) -> usize {
        let mut removed = 0;
        for hook in self.hooks.values_mut().filter(|h| h.state.is_active()) {
            if hook.state == HookState::Enabled {
                if let Err(e) = self.patcher.disable(hook.target) {
                    warn!("{}: disable failed: {}", hook.point, e);
                }
            }
            if let Err(e) = self.patcher.remove(hook.target) {
                warn!("{}: remove failed: {}", hook.point, e);
            }
            hook.slot.clear();
            hook.state = HookState::Removed;
            removed += 1;
        }
        if removed > 0 {
            info!("Removed {} hook(s)", removed);
        }
        removed
    }

    pub fn state(&self, target: usize) -> HookState {
        self.hooks
            .get(&target)
            .map(|h| h.state)
            .unwrap_or(HookState::Uninstalled)
    }

    pub fn hooks(&self) -> impl Iterator<Item = &HookDescriptor> {
        self.hooks.values()
    }

    pub fn active_count(&self) -> usize {
        self.hooks.values().filter(|h| h.state.is_active()).count()
    }

    pub fn patcher(&self) -> &P {
        &self.patcher
    }
}
