//! Pausable playback clock.
//!
//! A [`Timeline`] turns a monotonic clock sample plus the externally held
//! pause flag and [`PendingActions`] into the elapsed seconds fed to the
//! program each frame.

use std::time::{Duration, Instant};

/// Minimum change of the elapsed value, in seconds, before the readout is
/// refreshed again.
pub const REFRESH_THRESHOLD: f32 = 0.05;

/// Externally triggerable timeline commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pause,
    Resume,
    ResetTime,
    Capture,
}

/// Commands latched between frames.
///
/// Each kind is a single flag, so repeating a command before the next frame
/// is idempotent. A `Pause` and a `Resume` posted before the same frame
/// annihilate each other: the pause flag ends up where it started and the
/// time base must not move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingActions {
    pause: bool,
    resume: bool,
    reset: bool,
    capture: bool,
}

impl PendingActions {
    pub fn post(&mut self, action: Action) {
        match action {
            Action::Pause if self.resume => self.resume = false,
            Action::Pause => self.pause = true,
            Action::Resume if self.pause => self.pause = false,
            Action::Resume => self.resume = true,
            Action::ResetTime => self.reset = true,
            Action::Capture => self.capture = true,
        }
    }

    /// Consumes `action`, returning whether it was pending.
    pub fn take(&mut self, action: Action) -> bool {
        std::mem::take(self.flag_mut(action))
    }

    pub fn is_pending(&self, action: Action) -> bool {
        match action {
            Action::Pause => self.pause,
            Action::Resume => self.resume,
            Action::ResetTime => self.reset,
            Action::Capture => self.capture,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn flag_mut(&mut self, action: Action) -> &mut bool {
        match action {
            Action::Pause => &mut self.pause,
            Action::Resume => &mut self.resume,
            Action::ResetTime => &mut self.reset,
            Action::Capture => &mut self.capture,
        }
    }
}

/// Rate-limited elapsed/frame-rate text for the host to display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readout {
    pub elapsed: f32,
    /// `None` when there is no meaningful rate, e.g. on the frame that
    /// pauses.
    pub fps: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineSample {
    /// Seconds since the session origin, frozen while paused.
    pub elapsed: f32,
    /// Present only on frames where the readout should be refreshed.
    pub readout: Option<Readout>,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    origin: Option<Instant>,
    pause_instant: Option<Instant>,
    last_sample: Option<Instant>,
    last_refresh: Option<f32>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock to `now`, consuming whichever of `Pause`, `Resume`
    /// and `ResetTime` are pending. `Capture` is left for the draw path.
    pub fn advance(
        &mut self,
        now: Instant,
        paused: bool,
        actions: &mut PendingActions,
    ) -> TimelineSample {
        let reset = actions.take(Action::ResetTime);
        let mut pausing = false;

        match self.origin {
            Some(mut origin) if !reset => {
                if actions.take(Action::Pause) {
                    self.pause_instant = Some(now);
                    pausing = true;
                }
                if actions.take(Action::Resume) {
                    let pause_instant = self.pause_instant.unwrap_or(now);
                    origin += now.saturating_duration_since(pause_instant);
                    self.origin = Some(origin);
                }
            }
            _ => {
                self.origin = Some(now);
                self.pause_instant = Some(now);
                self.last_refresh = None;
                actions.take(Action::Pause);
                actions.take(Action::Resume);
            }
        }

        let elapsed = self.elapsed_at(now, paused);
        let dt = self
            .last_sample
            .map(|last| now.saturating_duration_since(last))
            .filter(|dt| *dt > Duration::ZERO);
        self.last_sample = Some(now);

        let readout = if pausing {
            self.last_refresh = Some(elapsed);
            Some(Readout { elapsed, fps: None })
        } else if self
            .last_refresh
            .map_or(true, |last| (elapsed - last).abs() > REFRESH_THRESHOLD)
        {
            self.last_refresh = Some(elapsed);
            Some(Readout {
                elapsed,
                fps: dt.map(|dt| 1.0 / dt.as_secs_f32()),
            })
        } else {
            None
        };

        TimelineSample { elapsed, readout }
    }

    /// Elapsed seconds at `now` without consuming any action; zero before the
    /// first frame.
    pub fn elapsed_at(&self, now: Instant, paused: bool) -> f32 {
        let Some(origin) = self.origin else {
            return 0.0;
        };
        let effective = match (paused, self.pause_instant) {
            (true, Some(pause_instant)) => pause_instant,
            _ => now,
        };
        effective.saturating_duration_since(origin).as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn first_frame_starts_at_zero() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        assert_eq!(timeline.advance(start, false, &mut actions).elapsed, 0.0);
        assert!(approx(
            timeline.advance(start + ms(250), false, &mut actions).elapsed,
            0.25
        ));
    }

    #[test]
    fn pause_and_resume_never_jump() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        timeline.advance(start, false, &mut actions);

        let mut now = start;
        for cycle in 0..4u64 {
            now += ms(300 + cycle * 7);
            let before = timeline.advance(now, false, &mut actions).elapsed;

            actions.post(Action::Pause);
            let paused_at = timeline.advance(now, true, &mut actions).elapsed;
            assert!(approx(paused_at, before));

            now += ms(1_000 + cycle * 13);
            assert!(approx(timeline.advance(now, true, &mut actions).elapsed, before));

            actions.post(Action::Resume);
            let resumed = timeline.advance(now, false, &mut actions).elapsed;
            assert!(approx(resumed, before), "cycle {cycle}: {resumed} != {before}");
        }
    }

    #[test]
    fn reset_yields_zero_even_while_paused() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        timeline.advance(start, false, &mut actions);
        timeline.advance(start + ms(500), false, &mut actions);

        actions.post(Action::Pause);
        timeline.advance(start + ms(600), true, &mut actions);

        actions.post(Action::ResetTime);
        let sample = timeline.advance(start + ms(900), true, &mut actions);
        assert_eq!(sample.elapsed, 0.0);
        assert_eq!(timeline.advance(start + ms(1_500), true, &mut actions).elapsed, 0.0);

        actions.post(Action::Resume);
        timeline.advance(start + ms(2_000), false, &mut actions);
        assert!(approx(
            timeline.advance(start + ms(2_100), false, &mut actions).elapsed,
            0.1
        ));
    }

    #[test]
    fn starting_paused_holds_at_zero() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        assert_eq!(timeline.advance(start, true, &mut actions).elapsed, 0.0);
        assert_eq!(timeline.advance(start + ms(800), true, &mut actions).elapsed, 0.0);
    }

    #[test]
    fn actions_are_consumed_once() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        timeline.advance(start, false, &mut actions);

        actions.post(Action::ResetTime);
        actions.post(Action::ResetTime);
        timeline.advance(start + ms(400), false, &mut actions);
        assert!(!actions.is_pending(Action::ResetTime));
        assert!(approx(
            timeline.advance(start + ms(500), false, &mut actions).elapsed,
            0.1
        ));
    }

    #[test]
    fn pause_then_resume_before_a_frame_cancels_out() {
        let mut actions = PendingActions::default();
        actions.post(Action::Pause);
        actions.post(Action::Resume);
        assert!(actions.is_empty());

        actions.post(Action::Resume);
        actions.post(Action::Pause);
        assert!(actions.is_empty());
    }

    #[test]
    fn capture_is_left_for_the_draw_path() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        actions.post(Action::Capture);
        timeline.advance(start, false, &mut actions);
        assert!(actions.take(Action::Capture));
        assert!(!actions.take(Action::Capture));
    }

    #[test]
    fn readout_is_rate_limited() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        assert!(timeline.advance(start, false, &mut actions).readout.is_some());
        assert!(timeline.advance(start + ms(20), false, &mut actions).readout.is_none());

        let refreshed = timeline
            .advance(start + ms(60), false, &mut actions)
            .readout
            .expect("refresh after threshold");
        assert!(approx(refreshed.elapsed, 0.06));
        let fps = refreshed.fps.expect("frame rate");
        assert!((fps - 25.0).abs() < 0.1);
    }

    #[test]
    fn pausing_clears_the_frame_rate() {
        let start = Instant::now();
        let mut timeline = Timeline::new();
        let mut actions = PendingActions::default();
        timeline.advance(start, false, &mut actions);
        actions.post(Action::Pause);
        let readout = timeline
            .advance(start + ms(10), true, &mut actions)
            .readout
            .expect("pause refreshes the readout");
        assert_eq!(readout.fps, None);
        assert!(timeline.advance(start + ms(500), true, &mut actions).readout.is_none());
    }
}
