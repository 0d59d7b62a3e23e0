//! Call interception: which host functions are hooked, and how

#[cfg(target_os = "windows")]
mod detour;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
mod freeze;
pub mod point;
pub mod registry;

#[cfg(target_os = "windows")]
pub use detour::DetourPatcher;
pub use point::{Forwarding, HookPoint, REFERENCE_BASE};
pub use registry::{CodePatcher, HookDescriptor, HookRegistry, HookState, OriginalSlot};
