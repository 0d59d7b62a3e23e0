//! Memory layout constants for host data structures
//!
//! This module centralizes the layout assumptions used when reading host memory.
//! Constants are organized by structure type. None of them are verified against
//! a specific host build; packet field positions live in configuration instead.

/// Address range a host pointer must fall into before it is dereferenced
pub mod address {
    /// Lowest plausible user-mode pointer (first 64 KiB are never mapped)
    pub const MIN_PLAUSIBLE: u64 = 0x0001_0000;
    /// Highest plausible user-mode pointer for a 32-bit host
    pub const MAX_PLAUSIBLE: u64 = 0x7FFF_FFFF;
}

/// MSVC `std::string` (32-bit) layout
pub mod msvc_string {
    /// Union of the inline buffer and the heap pointer
    pub const BUFFER: u64 = 0;
    /// Inline buffer length including the terminator
    pub const INLINE_CAPACITY: usize = 16;
    /// Size field (current length, excluding terminator)
    pub const SIZE: u64 = 16;
    /// Capacity field; below `INLINE_CAPACITY` the text is stored inline
    pub const CAPACITY: u64 = 20;
    /// Total object size
    pub const OBJECT_SIZE: usize = 24;
}

/// Packet reader object handed to `processPacket_*` handlers
pub mod stl_buffer {
    /// Pointer to the raw packet bytes
    pub const DATA: u64 = 0;
    /// Current read position
    pub const READ_POS: u64 = 4;
    /// Total packet size
    pub const SIZE: u64 = 8;
}

/// Text limits
pub mod text {
    /// Longest chat line decoded from the host; longer text is truncated
    pub const MAX_MESSAGE_LEN: usize = 512;
    /// Longest packet span copied out of the host
    pub const MAX_PACKET_SPAN: usize = 4096;
    /// Bytes shown in the combat packet hex dump
    pub const HEX_DUMP_LEN: usize = 16;
}

/// Timing constants for polling and lock waits
pub mod timing {
    /// Interval between consumer polls of the shared block (ms)
    pub const CONSUMER_POLL_INTERVAL_MS: u64 = 100;

    /// Producer-side bound on waiting for the shared block mutex (ms)
    pub const PUBLISH_LOCK_TIMEOUT_MS: u64 = 100;

    /// Consumer-side bound on waiting for the shared block mutex (ms)
    pub const CONSUMER_LOCK_TIMEOUT_MS: u64 = 20;

    /// Wait for the shared block when refreshing the filter inside an interceptor (ms)
    pub const FILTER_REFRESH_TIMEOUT_MS: u64 = 5;

    /// Delay before hooks are installed, letting the host finish its own startup (ms)
    pub const STARTUP_DELAY_MS: u64 = 3000;
}
