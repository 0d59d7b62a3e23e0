use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Signature not found: {0}")]
    SignatureNotFound(String),

    #[error("Hook target could not be resolved: {0}")]
    TargetUnresolved(String),

    #[error("Shared channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Malformed input at address {address:#x}: {reason}")]
    MalformedInput { address: u64, reason: String },

    #[error("Timed out after {0:?} waiting for the shared channel lock")]
    LockTimeout(Duration),

    #[error("Target {0:#x} already has an active interceptor")]
    HookConflict(usize),

    #[error("Target {0:#x} is not executable or not resolvable")]
    InvalidTarget(usize),

    #[error("Code patch failed: {0}")]
    PatchFailed(String),

    #[error("Invalid signature pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid filter regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Hook point {0} is configured more than once")]
    DuplicateHook(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a `MalformedInput` error for a read at `address`
    pub fn malformed(address: u64, reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            address,
            reason: reason.into(),
        }
    }

    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Something the tracker can run without (missing signature, target, channel)
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::SignatureNotFound(_) | Error::TargetUnresolved(_) | Error::ChannelUnavailable(_)
        )
    }

    /// Contention that should simply be skipped for this cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::LockTimeout(_))
    }
}
