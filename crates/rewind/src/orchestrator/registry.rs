use tracing::warn;

use crate::{HistoryBuffer, Rewindable, Snapshot, WeakRewindable};

pub(crate) struct ParticipantEntry {
    pub(crate) handle: WeakRewindable,
    pub(crate) history: HistoryBuffer<Snapshot>,
}

impl ParticipantEntry {
    pub(crate) fn is_alive(&self) -> bool {
        self.handle.strong_count() > 0
    }

    pub(crate) fn address(&self) -> *const () {
        self.handle.as_ptr().cast::<()>()
    }

    pub(crate) fn capture(&self) -> Option<Snapshot> {
        let participant = self.handle.upgrade()?;
        let borrowed = match participant.try_borrow() {
            Ok(borrowed) => borrowed,
            Err(_) => {
                warn!(operation = "capture_state", "participant_busy");
                return None;
            }
        };
        Some(borrowed.capture_state())
    }

    pub(crate) fn with_participant_mut(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn Rewindable),
    ) {
        let Some(participant) = self.handle.upgrade() else {
            return;
        };
        match participant.try_borrow_mut() {
            Ok(mut borrowed) => f(&mut *borrowed),
            Err(_) => warn!(operation, "participant_busy"),
        };
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<ParticipantEntry>,
}

impl Registry {
    pub(crate) fn contains(&self, address: *const ()) -> bool {
        self.entries.iter().any(|entry| entry.address() == address)
    }

    pub(crate) fn insert(&mut self, handle: WeakRewindable, history: HistoryBuffer<Snapshot>) {
        self.entries.push(ParticipantEntry { handle, history });
    }

    pub(crate) fn remove(&mut self, address: *const ()) -> Option<ParticipantEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.address() == address)?;
        Some(self.entries.swap_remove(index))
    }

    pub(crate) fn get(&self, address: *const ()) -> Option<&ParticipantEntry> {
        self.entries.iter().find(|entry| entry.address() == address)
    }

    /// Drops entries whose participant no longer exists. Returns how many were removed.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(ParticipantEntry::is_alive);
        before - self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ParticipantEntry> {
        self.entries.iter().filter(|entry| entry.is_alive())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ParticipantEntry> {
        self.entries.iter_mut().filter(|entry| entry.is_alive())
    }

    pub(crate) fn live_count(&self) -> usize {
        self.iter().count()
    }

    /// Oldest and newest recorded timestamps across every live history.
    pub(crate) fn recorded_range(&self) -> Option<(f32, f32)> {
        self.iter().fold(None, |range, entry| {
            let (Ok(oldest), Ok(newest)) = (entry.history.oldest(), entry.history.newest()) else {
                return range;
            };
            Some(match range {
                Some((low, high)) => (
                    f32::min(low, oldest.timestamp),
                    f32::max(high, newest.timestamp),
                ),
                None => (oldest.timestamp, newest.timestamp),
            })
        })
    }
}
