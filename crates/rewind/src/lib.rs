//! Time-rewind core: per-participant snapshot histories recorded on a fixed tick
//! and played back in reverse on the frame tick.

mod config;
mod history;
mod orchestrator;
mod rewindable;
mod snapshot;

pub use config::{FullRewindPolicy, RewindConfig, RewindConfigError, MAX_HISTORY_CAPACITY};
pub use history::{HistoryBuffer, HistoryError, Interpolation};
pub use orchestrator::{ListenerId, RewindError, RewindEvent, RewindOrchestrator};
pub use rewindable::{share, Rewindable, SharedRewindable, WeakRewindable};
pub use snapshot::{ExtensionBlend, ExtensionMap, ExtensionType, ExtensionValue, Snapshot};

pub use glam::{Quat, Vec2, Vec3};
