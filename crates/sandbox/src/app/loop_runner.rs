use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use rewind::{
    share, RewindConfig, RewindError, RewindEvent, RewindOrchestrator, Rewindable, Vec3,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bootstrap::AppWiring;
use super::entities::{EntityReport, Patroller, Spinner};

#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub(crate) frame_dt: Duration,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) forward_duration: Duration,
    pub(crate) rewind_duration: Duration,
    pub(crate) resume_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_dt: Duration::from_millis(16),
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            forward_duration: Duration::from_secs(3),
            rewind_duration: Duration::from_millis(1500),
            resume_duration: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error(transparent)]
    Rewind(#[from] RewindError),
    #[error("failed to serialize session summary: {0}")]
    Summary(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Forward,
    Rewind,
    Resume,
    Done,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub(crate) struct EventCounts {
    pub(crate) started: u32,
    pub(crate) stopped: u32,
    pub(crate) progress: u32,
    pub(crate) last_progress: f32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionSummary {
    pub(crate) frames: u64,
    pub(crate) fixed_ticks: u64,
    pub(crate) dropped_backlog_ms: u64,
    pub(crate) rewind_started_at: Option<f32>,
    pub(crate) rewind_stopped_at: Option<f32>,
    pub(crate) final_timeline_time: f32,
    pub(crate) history_len: usize,
    pub(crate) events: EventCounts,
    pub(crate) entities: Vec<EntityReport>,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let summary = match run_session(app.rewind, &app.session) {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "session_failed");
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string(&summary).map_err(SessionError::Summary) {
        Ok(json) => {
            info!(summary = %json, "session_summary");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "session_failed");
            ExitCode::FAILURE
        }
    }
}

struct Session {
    orchestrator: RewindOrchestrator,
    patroller: Rc<RefCell<Patroller>>,
    spinner: Rc<RefCell<Spinner>>,
    events: Rc<RefCell<EventCounts>>,
    phase: Phase,
    phase_elapsed: Duration,
    rewind_started_at: Option<f32>,
    rewind_stopped_at: Option<f32>,
}

impl Session {
    fn new(config: RewindConfig) -> Result<Self, SessionError> {
        let mut orchestrator = RewindOrchestrator::new(config)?;
        let patroller = share(
            Patroller::new(Vec3::ZERO, 2.0, -3.0, 3.0)
                .with_turn_interval(0.75)
                .with_lifetime(4.0),
        );
        let spinner = share(Spinner::new(Vec3::new(0.0, 2.0, 0.0), 1.5, 100));
        orchestrator.register(&patroller);
        orchestrator.register(&spinner);

        let events = Rc::new(RefCell::new(EventCounts::default()));
        let sink = Rc::clone(&events);
        orchestrator.subscribe(move |event| {
            let mut counts = sink.borrow_mut();
            match *event {
                RewindEvent::Started => counts.started += 1,
                RewindEvent::Stopped => counts.stopped += 1,
                RewindEvent::Progress(progress) => {
                    counts.progress += 1;
                    counts.last_progress = progress;
                }
            }
        });

        Ok(Self {
            orchestrator,
            patroller,
            spinner,
            events,
            phase: Phase::Forward,
            phase_elapsed: Duration::ZERO,
            rewind_started_at: None,
            rewind_stopped_at: None,
        })
    }

    fn fixed_tick(&mut self, fixed_dt_seconds: f32) {
        self.patroller.borrow_mut().fixed_update(fixed_dt_seconds);
        self.spinner.borrow_mut().fixed_update(fixed_dt_seconds);
        self.orchestrator.record_tick(fixed_dt_seconds);
    }

    fn frame(&mut self, frame_dt: Duration, config: &SessionConfig) {
        self.orchestrator.playback_tick(frame_dt.as_secs_f32());
        self.phase_elapsed = self.phase_elapsed.saturating_add(frame_dt);

        match self.phase {
            Phase::Forward if self.phase_elapsed >= config.forward_duration => {
                let timeline_time = self.orchestrator.timeline_time();
                if self.orchestrator.start_rewind() {
                    self.rewind_started_at = Some(timeline_time);
                    self.enter(Phase::Rewind);
                } else {
                    warn!(timeline_time, "session_rewind_unavailable");
                    self.enter(Phase::Resume);
                }
            }
            Phase::Rewind
                if self.phase_elapsed >= config.rewind_duration
                    || !self.orchestrator.is_rewinding() =>
            {
                self.orchestrator.stop_rewind();
                self.rewind_stopped_at = Some(self.orchestrator.timeline_time());
                self.enter(Phase::Resume);
            }
            Phase::Resume if self.phase_elapsed >= config.resume_duration => {
                self.enter(Phase::Done);
            }
            _ => {}
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(
            from = ?self.phase,
            to = ?phase,
            timeline_time = self.orchestrator.timeline_time(),
            "session_phase_changed"
        );
        self.phase = phase;
        self.phase_elapsed = Duration::ZERO;
    }

    fn history_len(&self) -> usize {
        self.orchestrator
            .history_for(&self.patroller)
            .map_or(0, |history| history.len())
    }

    fn summary(&self, frames: u64, fixed_ticks: u64, dropped_backlog: Duration) -> SessionSummary {
        SessionSummary {
            frames,
            fixed_ticks,
            dropped_backlog_ms: dropped_backlog.as_millis() as u64,
            rewind_started_at: self.rewind_started_at,
            rewind_stopped_at: self.rewind_stopped_at,
            final_timeline_time: self.orchestrator.timeline_time(),
            history_len: self.history_len(),
            events: *self.events.borrow(),
            entities: self.entity_reports(),
        }
    }

    fn entity_reports(&self) -> Vec<EntityReport> {
        vec![
            EntityReport {
                name: "patroller",
                frozen: self.patroller.borrow().is_frozen(),
                snapshot: self.patroller.borrow().capture_state(),
            },
            EntityReport {
                name: "spinner",
                frozen: self.spinner.borrow().is_frozen(),
                snapshot: self.spinner.borrow().capture_state(),
            },
        ]
    }
}

/// Drives a headless forward, rewind, resume session with deterministic frame times.
pub(crate) fn run_session(
    rewind_config: RewindConfig,
    config: &SessionConfig,
) -> Result<SessionSummary, SessionError> {
    let fixed_dt = rewind_config.fixed_dt();
    let fixed_dt_seconds = rewind_config.fixed_dt_seconds();
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let frame_dt = clamp_frame_delta(config.frame_dt, config.max_frame_delta);
    let mut session = Session::new(rewind_config)?;
    if frame_dt.is_zero() {
        warn!("session_frame_dt_zero");
        return Ok(session.summary(0, 0, Duration::ZERO));
    }
    info!(
        fixed_dt_ms = fixed_dt.as_millis() as u64,
        frame_dt_ms = frame_dt.as_millis() as u64,
        forward_ms = config.forward_duration.as_millis() as u64,
        rewind_ms = config.rewind_duration.as_millis() as u64,
        resume_ms = config.resume_duration.as_millis() as u64,
        "session_started"
    );

    let mut accumulator = Duration::ZERO;
    let mut frames = 0_u64;
    let mut fixed_ticks = 0_u64;
    let mut dropped_backlog = Duration::ZERO;
    while session.phase != Phase::Done {
        accumulator = accumulator.saturating_add(frame_dt);
        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = step_plan.remaining_accumulator;
        if !step_plan.dropped_backlog.is_zero() {
            dropped_backlog = dropped_backlog.saturating_add(step_plan.dropped_backlog);
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                "sim_backlog_dropped"
            );
        }

        for _ in 0..step_plan.ticks_to_run {
            session.fixed_tick(fixed_dt_seconds);
            fixed_ticks += 1;
        }
        session.frame(frame_dt, config);
        frames += 1;
    }

    Ok(session.summary(frames, fixed_ticks, dropped_backlog))
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

#[cfg(test)]
mod tests {
    use rewind::FullRewindPolicy;

    use super::*;

    fn short_session() -> SessionConfig {
        SessionConfig {
            forward_duration: Duration::from_secs(2),
            rewind_duration: Duration::from_secs(1),
            resume_duration: Duration::from_millis(500),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_keeps_partial_tick_in_accumulator() {
        let fixed_dt = Duration::from_millis(20);
        let result = plan_sim_steps(Duration::from_millis(50), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 2);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(10));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(20);
        let result = plan_sim_steps(Duration::from_millis(130), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(70));
    }

    #[test]
    fn session_rewinds_then_resumes_recording() {
        let summary = run_session(RewindConfig::default(), &short_session()).expect("session");

        let started_at = summary.rewind_started_at.expect("rewind started");
        let stopped_at = summary.rewind_stopped_at.expect("rewind stopped");
        assert!((started_at - 2.0).abs() < 0.05, "started_at={started_at}");
        assert!(stopped_at < started_at - 0.9, "stopped_at={stopped_at}");
        assert!(summary.final_timeline_time > stopped_at + 0.4);
        assert_eq!(summary.events.started, 1);
        assert_eq!(summary.events.stopped, 1);
        assert!(summary.events.progress > 0);
        assert_eq!(summary.dropped_backlog_ms, 0);
        assert_eq!(summary.entities.len(), 2);
    }

    #[test]
    fn session_records_at_the_configured_rate() {
        let config = RewindConfig {
            record_tps: 25,
            ..RewindConfig::default()
        };
        let summary = run_session(config, &short_session()).expect("session");

        let started_at = summary.rewind_started_at.expect("rewind started");
        assert!((started_at - 2.0).abs() < 0.05, "started_at={started_at}");
    }

    #[test]
    fn session_history_never_exceeds_capacity() {
        let config = RewindConfig {
            max_record_seconds: 0.5,
            ..RewindConfig::default()
        };
        let capacity = config.history_capacity();
        let summary = run_session(config, &short_session()).expect("session");

        assert_eq!(summary.history_len, capacity);
    }

    #[test]
    fn auto_stop_ends_rewind_phase_at_oldest_state() {
        let config = RewindConfig {
            max_record_seconds: 0.5,
            playback_speed: 2.0,
            on_full_rewind: FullRewindPolicy::AutoStop,
            ..RewindConfig::default()
        };
        let summary = run_session(config, &short_session()).expect("session");

        let started_at = summary.rewind_started_at.expect("rewind started");
        let stopped_at = summary.rewind_stopped_at.expect("rewind stopped");
        assert!((started_at - stopped_at) < 0.55);
        assert_eq!(summary.events.stopped, 1);
        assert_eq!(summary.events.last_progress, 1.0);
    }

    #[test]
    fn summary_serializes_to_json() {
        let summary = run_session(RewindConfig::default(), &short_session()).expect("session");
        let json = serde_json::to_value(&summary).expect("json");

        assert_eq!(json["events"]["started"], 1);
        assert_eq!(json["entities"][0]["name"], "patroller");
        assert!(json["entities"][0]["snapshot"]["position"].is_array());
    }
}
