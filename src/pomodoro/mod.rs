//! Pomodoro countdown: three modes, a running flag and a whole-second
//! countdown. Nothing here is persisted.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

const SECONDS_PER_MINUTE: u32 = 60;
const MAX_MINUTES: i64 = (u32::MAX / SECONDS_PER_MINUTE) as i64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TimerMode {
    Work,
    Short,
    Long,
}

impl TimerMode {
    pub fn label(self) -> &'static str {
        match self {
            TimerMode::Work => "Focus Time",
            TimerMode::Short => "Short Break",
            TimerMode::Long => "Long Break",
        }
    }

    /// Mode entered automatically when a countdown in `self` completes.
    /// Long breaks are only ever entered by hand.
    pub fn after_completion(self) -> TimerMode {
        match self {
            TimerMode::Work => TimerMode::Short,
            TimerMode::Short | TimerMode::Long => TimerMode::Work,
        }
    }
}

/// Configured length of each mode, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDurations {
    pub work: u32,
    pub short: u32,
    pub long: u32,
}

impl Default for TimerDurations {
    fn default() -> Self {
        Self {
            work: 25,
            short: 5,
            long: 15,
        }
    }
}

impl TimerDurations {
    pub fn minutes(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Work => self.work,
            TimerMode::Short => self.short,
            TimerMode::Long => self.long,
        }
    }

    pub fn seconds(&self, mode: TimerMode) -> u32 {
        self.minutes(mode).saturating_mul(SECONDS_PER_MINUTE)
    }

    fn set(&mut self, mode: TimerMode, minutes: u32) {
        match mode {
            TimerMode::Work => self.work = minutes,
            TimerMode::Short => self.short = minutes,
            TimerMode::Long => self.long = minutes,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {mode} duration {input:?}: expected a positive whole number of minutes")]
pub struct InvalidDuration {
    pub mode: TimerMode,
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Completed { finished: TimerMode, next: TimerMode },
}

#[derive(Debug, Clone)]
pub struct Pomodoro {
    mode: TimerMode,
    remaining: u32,
    running: bool,
    durations: TimerDurations,
    /// Start of the current, not yet counted second. Only set while running;
    /// clearing it cancels the interval.
    anchor: Option<Instant>,
}

impl Default for Pomodoro {
    fn default() -> Self {
        Self::new(TimerDurations::default())
    }
}

impl Pomodoro {
    pub fn new(durations: TimerDurations) -> Self {
        Self {
            mode: TimerMode::Work,
            remaining: durations.seconds(TimerMode::Work),
            running: false,
            durations,
            anchor: None,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn durations(&self) -> TimerDurations {
        self.durations
    }

    /// `MM:SS`, zero padded.
    pub fn display(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining / SECONDS_PER_MINUTE,
            self.remaining % SECONDS_PER_MINUTE
        )
    }

    pub fn toggle(&mut self) -> bool {
        self.toggle_at(Instant::now())
    }

    /// Flips running/paused and returns the new running flag. Does nothing
    /// while the countdown sits at zero.
    pub fn toggle_at(&mut self, now: Instant) -> bool {
        if self.remaining == 0 {
            return self.running;
        }
        if self.running {
            self.pause();
        } else {
            self.running = true;
            self.anchor = Some(now);
        }
        self.running
    }

    pub fn reset(&mut self) {
        self.remaining = self.durations.seconds(self.mode);
        self.pause();
    }

    pub fn switch_mode(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.remaining = self.durations.seconds(mode);
        self.pause();
    }

    /// Changes a mode's configured length. The live countdown is retargeted
    /// when `mode` is the active one.
    pub fn set_duration(&mut self, mode: TimerMode, minutes: i64) -> Result<(), InvalidDuration> {
        if minutes <= 0 || minutes > MAX_MINUTES {
            return Err(InvalidDuration {
                mode,
                input: minutes.to_string(),
            });
        }
        let minutes = minutes as u32;
        self.durations.set(mode, minutes);
        if mode == self.mode {
            self.remaining = self.durations.seconds(mode);
        }
        Ok(())
    }

    /// Like [`Pomodoro::set_duration`], for raw text from an input field.
    pub fn set_duration_input(&mut self, mode: TimerMode, input: &str) -> Result<(), InvalidDuration> {
        let minutes = input.trim().parse::<i64>().map_err(|_| InvalidDuration {
            mode,
            input: input.to_string(),
        })?;
        self.set_duration(mode, minutes).map_err(|_| InvalidDuration {
            mode,
            input: input.to_string(),
        })
    }

    /// Counts down one second while running. Reaching zero stops the timer
    /// and moves to the follow-up mode.
    pub fn tick(&mut self) -> Option<TimerEvent> {
        if !self.running || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            return Some(self.complete());
        }
        None
    }

    pub fn poll(&mut self) -> Vec<TimerEvent> {
        self.poll_at(Instant::now())
    }

    /// Applies one tick per whole second elapsed since the anchor.
    pub fn poll_at(&mut self, now: Instant) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        let Some(anchor) = self.anchor else {
            return events;
        };
        let elapsed = now.saturating_duration_since(anchor).as_secs();
        if elapsed == 0 {
            return events;
        }
        self.anchor = Some(anchor + Duration::from_secs(elapsed));
        for _ in 0..elapsed {
            if let Some(event) = self.tick() {
                events.push(event);
            }
            if !self.running {
                break;
            }
        }
        events
    }

    fn complete(&mut self) -> TimerEvent {
        let finished = self.mode;
        let next = finished.after_completion();
        tracing::info!(%finished, %next, "pomodoro session complete");
        self.mode = next;
        self.remaining = self.durations.seconds(next);
        self.pause();
        TimerEvent::Completed { finished, next }
    }

    fn pause(&mut self) {
        self.running = false;
        self.anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn work_session_rolls_into_short_break() {
        let mut timer = Pomodoro::default();
        assert_eq!(timer.remaining(), 1500);
        assert!(timer.toggle());

        let mut events = Vec::new();
        for _ in 0..1500 {
            events.extend(timer.tick());
        }
        assert_eq!(
            events,
            vec![TimerEvent::Completed {
                finished: TimerMode::Work,
                next: TimerMode::Short
            }]
        );
        assert_eq!(timer.mode(), TimerMode::Short);
        assert_eq!(timer.remaining(), 5 * 60);
        assert!(!timer.is_running());
    }

    #[test]
    fn short_and_long_breaks_return_to_work() {
        for mode in [TimerMode::Short, TimerMode::Long] {
            let mut timer = Pomodoro::default();
            timer.switch_mode(mode);
            timer.toggle();
            let mut last = None;
            while timer.is_running() {
                last = timer.tick();
            }
            assert_matches!(last, Some(TimerEvent::Completed { next: TimerMode::Work, .. }));
            assert_eq!(timer.mode(), TimerMode::Work);
            assert_eq!(timer.remaining(), 25 * 60);
        }
    }

    #[test]
    fn paused_timer_does_not_tick() {
        let mut timer = Pomodoro::default();
        assert!(timer.tick().is_none());
        assert_eq!(timer.remaining(), 1500);

        timer.toggle();
        timer.tick();
        timer.toggle();
        timer.tick();
        assert_eq!(timer.remaining(), 1499);
        assert_eq!(timer.display(), "24:59");
    }

    #[test]
    fn reset_and_switch_pause_and_reload_duration() {
        let mut timer = Pomodoro::default();
        timer.toggle();
        for _ in 0..30 {
            timer.tick();
        }
        timer.reset();
        assert_eq!(timer.remaining(), 1500);
        assert!(!timer.is_running());

        timer.toggle();
        timer.switch_mode(TimerMode::Long);
        assert_eq!(timer.mode(), TimerMode::Long);
        assert_eq!(timer.remaining(), 15 * 60);
        assert!(!timer.is_running());
    }

    #[test]
    fn duration_changes_retarget_only_the_active_mode() {
        let mut timer = Pomodoro::default();
        timer.set_duration(TimerMode::Work, 50).expect("valid duration");
        assert_eq!(timer.remaining(), 50 * 60);

        timer.set_duration_input(TimerMode::Short, " 10 ").expect("valid input");
        assert_eq!(timer.remaining(), 50 * 60);
        timer.switch_mode(TimerMode::Short);
        assert_eq!(timer.remaining(), 10 * 60);
    }

    #[test]
    fn invalid_durations_keep_the_prior_value() {
        let mut timer = Pomodoro::default();
        assert!(timer.set_duration(TimerMode::Work, 0).is_err());
        assert!(timer.set_duration(TimerMode::Work, -5).is_err());
        let err = timer
            .set_duration_input(TimerMode::Long, "soon")
            .expect_err("non-numeric input");
        assert_eq!(err.mode, TimerMode::Long);
        assert_eq!(err.input, "soon");
        assert_eq!(timer.durations(), TimerDurations::default());
        assert_eq!(timer.remaining(), 1500);
    }

    #[test]
    fn poll_counts_whole_elapsed_seconds() {
        let mut timer = Pomodoro::new(TimerDurations {
            work: 1,
            short: 1,
            long: 1,
        });
        let t0 = Instant::now();
        timer.toggle_at(t0);

        assert!(timer.poll_at(t0 + Duration::from_millis(900)).is_empty());
        assert_eq!(timer.remaining(), 60);
        assert!(timer.poll_at(t0 + Duration::from_millis(2500)).is_empty());
        assert_eq!(timer.remaining(), 58);

        let events = timer.poll_at(t0 + Duration::from_secs(120));
        assert_eq!(events.len(), 1);
        assert_eq!(timer.mode(), TimerMode::Short);
        assert_eq!(timer.remaining(), 60);
        assert!(!timer.is_running());
        assert!(timer.poll_at(t0 + Duration::from_secs(300)).is_empty());
    }

    #[test]
    fn toggle_is_ignored_at_zero() {
        let mut timer = Pomodoro::default();
        timer.remaining = 0;
        assert!(!timer.toggle());
        assert!(!timer.is_running());
    }
}
