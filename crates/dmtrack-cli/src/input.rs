use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;

use crate::shutdown::ShutdownSignal;

/// What a key press in the watch view asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ResetStats,
    ToggleOverlay,
    ToggleFilter,
    ClearHistory,
}

/// Spawn a thread forwarding watch-view key presses as actions.
///
/// Quit keys (Esc, q, Ctrl+C) also trigger `shutdown` directly so the loop
/// stops even if nobody drains the channel.
pub fn spawn_keyboard_monitor(
    shutdown: Arc<ShutdownSignal>,
    actions: Sender<KeyAction>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !shutdown.is_shutdown() {
            if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            let Ok(Event::Key(key)) = event::read() else {
                continue;
            };
            let Some(action) = key_action(&key) else {
                continue;
            };

            debug!("Key {:?} -> {:?}", key.code, action);
            if action == KeyAction::Quit {
                shutdown.trigger();
                break;
            }
            if actions.send(action).is_err() {
                break;
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

fn key_action(event: &KeyEvent) -> Option<KeyAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(KeyAction::Quit),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::ResetStats),
        KeyCode::Char('o') | KeyCode::Char('O') => Some(KeyAction::ToggleOverlay),
        KeyCode::Char('f') | KeyCode::Char('F') => Some(KeyAction::ToggleFilter),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(KeyAction::ClearHistory),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyAction> {
        key_action(&KeyEvent::new(code, modifiers))
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(key(KeyCode::Esc, KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(key(KeyCode::Char('q'), KeyModifiers::NONE), Some(KeyAction::Quit));
        assert_eq!(key(KeyCode::Char('Q'), KeyModifiers::SHIFT), Some(KeyAction::Quit));
        assert_eq!(key(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(KeyAction::Quit));
    }

    #[test]
    fn test_command_keys() {
        assert_eq!(key(KeyCode::Char('r'), KeyModifiers::NONE), Some(KeyAction::ResetStats));
        assert_eq!(key(KeyCode::Char('o'), KeyModifiers::NONE), Some(KeyAction::ToggleOverlay));
        assert_eq!(key(KeyCode::Char('f'), KeyModifiers::NONE), Some(KeyAction::ToggleFilter));
        assert_eq!(key(KeyCode::Char('c'), KeyModifiers::NONE), Some(KeyAction::ClearHistory));
    }

    #[test]
    fn test_other_keys_ignored() {
        assert_eq!(key(KeyCode::Char('a'), KeyModifiers::NONE), None);
        assert_eq!(key(KeyCode::Enter, KeyModifiers::NONE), None);
    }

    #[test]
    fn test_release_ignored() {
        let mut event = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE);
        event.kind = KeyEventKind::Release;
        assert_eq!(key_action(&event), None);
    }
}
