//! CLI command implementations.
//!
//! Snapshot commands (watch, filter, export) work on any `Consumer`; the
//! lifecycle commands (inject, unload, reset, toggle-overlay) drive the host
//! process and exist on Windows only.

pub mod control;
pub mod export;
pub mod filter;
pub mod inject;
pub mod unload;
pub mod watch;

use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use dmtrack::{Consumer, PollOutcome, SharedSnapshot, SnapshotChannel};

use crate::cli::ChannelArgs;

/// Polls made before giving up on a busy lock
const READ_ATTEMPTS: u32 = 10;

/// One live snapshot, retrying briefly while the producer holds the lock
pub fn read_live<C, F>(consumer: &mut Consumer<C, F>) -> Result<Box<SharedSnapshot>>
where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    for _ in 0..READ_ATTEMPTS {
        match consumer.poll() {
            PollOutcome::Live(block) => return Ok(block),
            PollOutcome::Skipped => thread::sleep(Duration::from_millis(
                dmtrack::config::timing::CONSUMER_LOCK_TIMEOUT_MS,
            )),
            PollOutcome::Waiting => bail!("agent is not running (no live snapshot)"),
        }
    }
    bail!("snapshot stayed locked, try again")
}

#[cfg(target_os = "windows")]
pub fn connect(
    args: &ChannelArgs,
) -> Consumer<dmtrack::NamedChannel, impl FnMut() -> dmtrack::Result<dmtrack::NamedChannel> + use<>> {
    let config = dmtrack::ChannelConfig {
        shared_memory_name: args.shared_memory.clone(),
        mutex_name: args.mutex.clone(),
        ..dmtrack::ChannelConfig::default()
    };
    Consumer::new(move || dmtrack::NamedChannel::open(&config))
}

#[cfg(not(target_os = "windows"))]
pub fn connect(
    _args: &ChannelArgs,
) -> Consumer<dmtrack::LocalChannel, impl FnMut() -> dmtrack::Result<dmtrack::LocalChannel> + use<>> {
    Consumer::new(|| {
        Err(dmtrack::Error::ChannelUnavailable(
            "the shared snapshot exists on Windows only".to_string(),
        ))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use dmtrack::{FilterConfig, LocalChannel, Publisher};

    use super::*;

    pub const TIMEOUT: Duration = Duration::from_millis(20);

    /// A live local block plus a consumer attached to it
    pub fn live_pair() -> (
        Publisher<LocalChannel>,
        Consumer<LocalChannel, impl FnMut() -> dmtrack::Result<LocalChannel>>,
    ) {
        let channel = LocalChannel::new();
        let publisher =
            Publisher::initialize(channel.clone(), &FilterConfig::default(), TIMEOUT).unwrap();
        let consumer = Consumer::new(move || Ok(channel.clone())).with_timeout(TIMEOUT);
        (publisher, consumer)
    }

    #[test]
    fn test_read_live() {
        let (_publisher, mut consumer) = live_pair();
        assert!(read_live(&mut consumer).unwrap().is_live());
    }

    #[test]
    fn test_read_live_without_producer() {
        let mut consumer = connect(&ChannelArgs {
            shared_memory: "DmTrackTestMissing".into(),
            mutex: "DmTrackTestMissingMutex".into(),
        });
        assert!(read_live(&mut consumer).is_err());
    }
}
