//! Watch command: poll the snapshot and redraw the statistics view.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use dmtrack::{
    Consumer, DisplayHistory, KillRecord, LootRecord, PollOutcome, SharedSnapshot,
    SnapshotChannel, now_millis,
};
use tracing::{debug, info, warn};

use super::control::{self, Control};
use crate::input::{self, KeyAction};
use crate::render;
use crate::shutdown::ShutdownSignal;

/// Consumer-side view state carried across polls
#[derive(Default)]
pub struct WatchState {
    loot: DisplayHistory<LootRecord>,
    kills: DisplayHistory<KillRecord>,
    last: Option<Box<SharedSnapshot>>,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one poll result in. A busy lock keeps the previous frame; a
    /// vanished producer drops it but keeps the lists.
    pub fn update(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Live(block) => {
                if self.was_reset(&block) {
                    debug!("Counters went backwards, clearing lists");
                    self.loot.reset();
                    self.kills.reset();
                }
                self.loot.absorb(&block.loot_records(), block.loot_cursor);
                self.kills.absorb(&block.kill_records(), block.kill_cursor);
                self.last = Some(block);
            }
            PollOutcome::Skipped => {}
            PollOutcome::Waiting => self.last = None,
        }
    }

    fn was_reset(&self, block: &SharedSnapshot) -> bool {
        self.last.as_ref().is_some_and(|last| {
            block.session_start_ms != last.session_start_ms
                || block.local.kills < last.local.kills
                || block.local.loot_items < last.local.loot_items
        })
    }

    /// Empty both lists; only records arriving after this show up again
    pub fn clear_lists(&mut self) {
        self.loot.clear();
        self.kills.clear();
    }

    pub fn is_live(&self) -> bool {
        self.last.is_some()
    }

    pub fn loot(&self) -> &DisplayHistory<LootRecord> {
        &self.loot
    }

    pub fn kills(&self) -> &DisplayHistory<KillRecord> {
        &self.kills
    }

    pub fn render(&self, now_ms: i64, color: bool) -> String {
        match &self.last {
            Some(block) => render::frame(block, &self.loot, &self.kills, now_ms, color),
            None => render::waiting_frame(color),
        }
    }
}

fn redraw(frame: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;
    stdout.write_all(frame.as_bytes())?;
    stdout.flush()
}

fn handle_key<C, F>(
    action: KeyAction,
    consumer: &mut Consumer<C, F>,
    state: &mut WatchState,
    process: &str,
) where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    let outcome = match action {
        KeyAction::Quit => return,
        KeyAction::ClearHistory => {
            state.clear_lists();
            Ok(())
        }
        KeyAction::ToggleFilter => consumer
            .update_filter(|f| f.enabled = !f.enabled)
            .map(|f| info!("Filter {}", if f.enabled { "enabled" } else { "disabled" }))
            .map_err(anyhow::Error::from),
        KeyAction::ResetStats => control::invoke(process, Control::ResetStats).map(|_| ()),
        KeyAction::ToggleOverlay => control::invoke(process, Control::ToggleOverlay).map(|_| ()),
    };
    if let Err(e) = outcome {
        warn!("{:?} failed: {:#}", action, e);
    }
}

/// Run the view until Esc/q/Ctrl+C
pub fn run<C, F>(
    mut consumer: Consumer<C, F>,
    interval: Duration,
    color: bool,
    process: &str,
) -> Result<()>
where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || shutdown_ctrlc.trigger())?;

    let (keys, key_events) = mpsc::channel();
    let _keyboard = input::spawn_keyboard_monitor(Arc::clone(&shutdown), keys);

    let mut state = WatchState::new();
    info!("Watching shared snapshot (every {:?})", interval);

    while !shutdown.is_shutdown() {
        while let Ok(action) = key_events.try_recv() {
            handle_key(action, &mut consumer, &mut state, process);
        }

        state.update(consumer.poll());
        redraw(&state.render(now_millis(), color))?;

        if shutdown.wait(interval) {
            break;
        }
    }

    println!();
    info!("Watch stopped");
    Ok(())
}
