use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::Snapshot;

/// Capability a simulated entity implements to take part in rewind.
///
/// While rewinding the entity must stop integrating its own motion; the
/// orchestrator drives it through `apply_state` until `on_rewind_stop`.
pub trait Rewindable {
    /// The orchestrator restamps `timestamp` with its own timeline clock.
    fn capture_state(&self) -> Snapshot;

    fn apply_state(&mut self, snapshot: &Snapshot);

    fn on_rewind_start(&mut self);

    fn on_rewind_stop(&mut self);
}

pub type SharedRewindable = Rc<RefCell<dyn Rewindable>>;
pub type WeakRewindable = Weak<RefCell<dyn Rewindable>>;

pub fn share<R: Rewindable + 'static>(participant: R) -> Rc<RefCell<R>> {
    Rc::new(RefCell::new(participant))
}
