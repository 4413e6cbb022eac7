mod events;
mod registry;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::is_valid_playback_speed;
use crate::{
    ExtensionBlend, FullRewindPolicy, HistoryBuffer, HistoryError, Rewindable, RewindConfig,
    RewindConfigError, Snapshot, WeakRewindable,
};

pub use events::{ListenerId, RewindEvent};

use events::Listeners;
use registry::Registry;

#[derive(Debug, Error)]
pub enum RewindError {
    #[error(transparent)]
    Config(#[from] RewindConfigError),
    #[error("failed to allocate participant history: {0}")]
    History(#[from] HistoryError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RewindClock {
    start_time: f32,
    floor_time: f32,
    time: f32,
    progress: f32,
}

impl RewindClock {
    fn new(oldest: f32, newest: f32) -> Self {
        Self {
            start_time: newest,
            floor_time: oldest,
            time: newest,
            progress: 0.0,
        }
    }

    fn step_back(&mut self, seconds: f32) {
        self.time = (self.time - seconds).max(self.floor_time);
        let span = self.start_time - self.floor_time;
        self.progress = if span > 0.0 {
            ((self.start_time - self.time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    fn reached_oldest(&self) -> bool {
        self.progress >= 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlaybackState {
    Idle,
    Rewinding(RewindClock),
}

/// Owns one history per registered participant. Records on the fixed tick while
/// idle and plays history backwards on the frame tick while rewinding.
pub struct RewindOrchestrator {
    config: RewindConfig,
    blend: ExtensionBlend,
    empty_history: HistoryBuffer<Snapshot>,
    registry: Registry,
    listeners: Listeners,
    state: PlaybackState,
    timeline_time: f32,
    playback_speed: f32,
}

impl RewindOrchestrator {
    pub fn new(config: RewindConfig) -> Result<Self, RewindError> {
        config.validate()?;
        let empty_history = HistoryBuffer::new(config.history_capacity())?;
        info!(
            history_capacity = empty_history.capacity(),
            record_tps = config.record_tps,
            playback_speed = config.playback_speed,
            on_full_rewind = ?config.on_full_rewind,
            "rewind_orchestrator_created"
        );
        Ok(Self {
            blend: config.extension_blend(),
            playback_speed: config.playback_speed,
            config,
            empty_history,
            registry: Registry::default(),
            listeners: Listeners::default(),
            state: PlaybackState::Idle,
            timeline_time: 0.0,
        })
    }

    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    pub fn register<R: Rewindable + 'static>(&mut self, participant: &Rc<RefCell<R>>) -> bool {
        let shared: Rc<RefCell<dyn Rewindable>> = participant.clone();
        self.register_weak(Rc::downgrade(&shared))
    }

    /// A handle whose participant is already gone is ignored.
    pub fn register_weak(&mut self, handle: WeakRewindable) -> bool {
        self.prune_dropped();
        if handle.strong_count() == 0 {
            debug!(reason = "participant_dropped", "register_ignored");
            return false;
        }
        let address = handle.as_ptr().cast::<()>();
        if self.registry.contains(address) {
            debug!(reason = "already_registered", "register_ignored");
            return false;
        }

        self.registry.insert(handle, self.empty_history.clone());
        if self.is_rewinding() {
            if let Some(entry) = self.registry.get(address) {
                entry.with_participant_mut("on_rewind_start", |participant| {
                    participant.on_rewind_start();
                });
            }
        }
        debug!(
            participant_count = self.registry.live_count(),
            "participant_registered"
        );
        true
    }

    pub fn unregister<R: Rewindable + 'static>(&mut self, participant: &Rc<RefCell<R>>) -> bool {
        self.unregister_address(Rc::as_ptr(participant).cast::<()>())
    }

    pub fn unregister_weak(&mut self, handle: &WeakRewindable) -> bool {
        self.unregister_address(handle.as_ptr().cast::<()>())
    }

    fn unregister_address(&mut self, address: *const ()) -> bool {
        let Some(entry) = self.registry.remove(address) else {
            debug!(reason = "not_registered", "unregister_ignored");
            return false;
        };
        if self.is_rewinding() {
            entry.with_participant_mut("on_rewind_stop", |participant| {
                participant.on_rewind_stop();
            });
        }
        debug!(
            participant_count = self.registry.live_count(),
            discarded_snapshots = entry.history.len(),
            "participant_unregistered"
        );
        true
    }

    pub fn participant_count(&self) -> usize {
        self.registry.live_count()
    }

    pub fn history_for<R: Rewindable + 'static>(
        &self,
        participant: &Rc<RefCell<R>>,
    ) -> Option<&HistoryBuffer<Snapshot>> {
        self.registry
            .get(Rc::as_ptr(participant).cast::<()>())
            .filter(|entry| entry.is_alive())
            .map(|entry| &entry.history)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&RewindEvent) + 'static) -> ListenerId {
        let id = self.listeners.subscribe(Box::new(listener));
        debug!(listener_count = self.listeners.len(), "listener_subscribed");
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.unsubscribe(id);
        if removed {
            debug!(listener_count = self.listeners.len(), "listener_unsubscribed");
        }
        removed
    }

    pub fn is_rewinding(&self) -> bool {
        matches!(self.state, PlaybackState::Rewinding(_))
    }

    pub fn can_rewind(&self) -> bool {
        self.registry.iter().any(|entry| !entry.history.is_empty())
    }

    /// Normalized playback progress while rewinding.
    pub fn rewind_progress(&self) -> Option<f32> {
        match self.state {
            PlaybackState::Rewinding(clock) => Some(clock.progress),
            PlaybackState::Idle => None,
        }
    }

    /// Timeline position currently applied to participants while rewinding.
    pub fn rewind_time(&self) -> Option<f32> {
        match self.state {
            PlaybackState::Rewinding(clock) => Some(clock.time),
            PlaybackState::Idle => None,
        }
    }

    /// Timestamp given to the most recent recording.
    pub fn timeline_time(&self) -> f32 {
        self.timeline_time
    }

    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    pub fn set_playback_speed(&mut self, speed: f32) {
        if !is_valid_playback_speed(speed) {
            warn!(speed, "playback_speed_rejected");
            return;
        }
        self.playback_speed = speed;
    }

    /// Fixed simulation tick. Captures every participant while idle.
    pub fn record_tick(&mut self, fixed_dt_seconds: f32) {
        if self.is_rewinding() {
            return;
        }
        if !fixed_dt_seconds.is_finite() || fixed_dt_seconds < 0.0 {
            warn!(fixed_dt_seconds, "record_tick_rejected");
            return;
        }
        self.prune_dropped();

        self.timeline_time += fixed_dt_seconds;
        let timeline_time = self.timeline_time;
        let mut recorded = 0_usize;
        for entry in self.registry.iter_mut() {
            let Some(mut snapshot) = entry.capture() else {
                continue;
            };
            snapshot.timestamp = timeline_time;
            entry.history.push(snapshot);
            recorded += 1;
        }
        trace!(timeline_time, recorded, "recorded");
    }

    pub fn start_rewind(&mut self) -> bool {
        if self.is_rewinding() {
            debug!(reason = "already_rewinding", "rewind_start_ignored");
            return false;
        }
        self.prune_dropped();
        let Some((oldest, newest)) = self.registry.recorded_range() else {
            debug!(reason = "no_recorded_state", "rewind_start_ignored");
            return false;
        };

        self.state = PlaybackState::Rewinding(RewindClock::new(oldest, newest));
        for entry in self.registry.iter() {
            entry.with_participant_mut("on_rewind_start", |participant| {
                participant.on_rewind_start();
            });
        }
        self.listeners.emit(RewindEvent::Started);
        info!(
            oldest,
            newest,
            participant_count = self.registry.live_count(),
            "rewind_started"
        );
        true
    }

    /// Frame tick. Walks the rewind clock back by `frame_dt_seconds` scaled by the
    /// playback speed and applies the interpolated history to every participant.
    pub fn playback_tick(&mut self, frame_dt_seconds: f32) {
        let PlaybackState::Rewinding(mut clock) = self.state else {
            return;
        };
        if !frame_dt_seconds.is_finite() || frame_dt_seconds < 0.0 {
            warn!(frame_dt_seconds, "playback_tick_rejected");
            return;
        }

        clock.step_back(frame_dt_seconds * self.playback_speed);
        self.state = PlaybackState::Rewinding(clock);

        for entry in self.registry.iter() {
            let Some(states) = entry
                .history
                .interpolation_states(clock.time, |snapshot| snapshot.timestamp)
            else {
                continue;
            };
            let snapshot = Snapshot::lerp_with(states.before, states.after, states.t, &self.blend);
            entry.with_participant_mut("apply_state", |participant| {
                participant.apply_state(&snapshot);
            });
        }
        self.listeners.emit(RewindEvent::Progress(clock.progress));

        if clock.reached_oldest() && self.config.on_full_rewind == FullRewindPolicy::AutoStop {
            debug!(rewind_time = clock.time, "rewind_auto_stop");
            self.stop_rewind();
        }
    }

    /// Hands control back to participants at the reached point. History newer than
    /// that point is dropped and recording resumes from it.
    pub fn stop_rewind(&mut self) -> bool {
        let PlaybackState::Rewinding(clock) = self.state else {
            debug!(reason = "not_rewinding", "rewind_stop_ignored");
            return false;
        };
        self.state = PlaybackState::Idle;

        let mut discarded = 0_usize;
        for entry in self.registry.iter_mut() {
            while entry
                .history
                .newest()
                .is_ok_and(|newest| newest.timestamp > clock.time)
            {
                if entry.history.pop_newest().is_ok() {
                    discarded += 1;
                }
            }
        }
        self.timeline_time = clock.time;

        for entry in self.registry.iter() {
            entry.with_participant_mut("on_rewind_stop", |participant| {
                participant.on_rewind_stop();
            });
        }
        self.listeners.emit(RewindEvent::Stopped);
        info!(
            rewind_time = clock.time,
            progress = clock.progress,
            future_discarded = discarded,
            "rewind_stopped"
        );
        true
    }

    pub fn clear_history(&mut self) {
        let mut cleared = 0_usize;
        for entry in self.registry.iter_mut() {
            cleared += entry.history.len();
            entry.history.clear();
        }
        info!(cleared, "history_cleared");
    }

    fn prune_dropped(&mut self) {
        let removed = self.registry.prune();
        if removed > 0 {
            debug!(removed, "dropped_participants_pruned");
        }
    }
}

impl Drop for RewindOrchestrator {
    fn drop(&mut self) {
        if self.is_rewinding() {
            self.stop_rewind();
        }
    }
}
