//! Bookkeeping for suspending the other threads of the process
//!
//! While any thread is suspended it may own the process heap or the log
//! writer, so everything that allocates happens before the first suspension:
//! thread IDs are collected up front and the handle list is sized once.

/// Threads of `pid` other than `current`, from `(owner pid, thread id)` pairs
pub fn freeze_targets(
    entries: impl IntoIterator<Item = (u32, u32)>,
    pid: u32,
    current: u32,
) -> Vec<u32> {
    entries
        .into_iter()
        .filter(|&(owner, thread)| owner == pid && thread != current)
        .map(|(_, thread)| thread)
        .collect()
}

/// A list that never grows past the capacity it was created with
#[derive(Debug)]
pub struct FixedList<T> {
    items: Vec<T>,
}

impl<T> FixedList<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append without reallocating; hands the item back when full.
    pub fn try_push(&mut self, item: T) -> std::result::Result<(), T> {
        if self.items.len() == self.items.capacity() {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }
}
