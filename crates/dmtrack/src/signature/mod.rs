//! Locating hook targets inside the host image
//!
//! Targets are resolved from a wildcard byte signature when one is
//! configured, falling back to a virtual address rebased onto the module's
//! actual load address. Nothing here is fatal: an unresolved target only
//! disables the hook that needed it.

mod module;
mod pattern;
mod scan;

pub use module::{ModuleInfo, find_module};
pub use pattern::{PatternSpec, format_pattern, parse_pattern};
pub use scan::{ModuleImage, find_pattern, resolve_va};

use tracing::{debug, warn};

use crate::config::HookTarget;
use crate::error::{Error, Result};

/// Which source produced a resolved address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Signature,
    VirtualAddress,
}

/// Resolve the absolute address of `target` inside `image`
pub fn resolve_target(
    image: &ModuleImage<'_>,
    target: &HookTarget,
    reference_base: u64,
) -> Result<(usize, Resolution)> {
    let name = target.point.name();

    if let Some(pattern) = &target.signature {
        match image.scan(pattern) {
            Some(address) => return Ok((address, Resolution::Signature)),
            None if target.va.is_some() => {
                warn!("Signature for {} not found, falling back to VA", name)
            }
            None => return Err(Error::SignatureNotFound(name.to_string())),
        }
    }

    let va = target
        .va
        .ok_or_else(|| Error::TargetUnresolved(format!("{}: no signature or VA", name)))?;
    let address = image.rebase(va, reference_base).ok_or_else(|| {
        Error::TargetUnresolved(format!(
            "{}: VA {:#x} outside module at {:#x} (+{:#x})",
            name,
            va,
            image.base,
            image.size()
        ))
    })?;
    debug!("{} resolved from VA {:#x} to {:#x}", name, va, address);
    Ok((address, Resolution::VirtualAddress))
}
