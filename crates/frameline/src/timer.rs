//! # Timing
//!
//! A [FrameClock] produces one [FrameTime] per rendered frame. An [UpdateTimer] decides how many update ticks run before that frame is
//! rendered. Per-frame resources are only touched while rendering, so any number of updates (including none) per frame is fine.

use std::time::{Duration, Instant};

///Time of the frame that is about to be rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTime {
    ///Time between the first frame and this one.
    pub time_since_start: Duration,
    ///Time since the previous frame. Zero for the first frame.
    pub delta: Duration,
}

impl FrameTime {
    pub fn seconds(&self) -> f32 {
        self.time_since_start.as_secs_f32()
    }
}

#[derive(Clone, Debug)]
pub enum FrameClock {
    ///Wall clock time.
    Realtime {
        start: Option<Instant>,
        last: Option<Instant>,
    },
    ///Every frame advances time by exactly `step`. Makes runs reproducible.
    Simulated {
        step: Duration,
        elapsed: Option<Duration>,
    },
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::realtime()
    }
}

impl FrameClock {
    pub fn realtime() -> Self {
        FrameClock::Realtime {
            start: None,
            last: None,
        }
    }

    pub fn simulated(step: Duration) -> Self {
        FrameClock::Simulated {
            step,
            elapsed: None,
        }
    }

    ///Advances the clock by one frame.
    pub fn tick(&mut self) -> FrameTime {
        match self {
            FrameClock::Realtime { start, last } => {
                let now = Instant::now();
                let start = *start.get_or_insert(now);
                let delta = last.map(|l| now - l).unwrap_or(Duration::ZERO);
                *last = Some(now);
                FrameTime {
                    time_since_start: now - start,
                    delta,
                }
            }
            FrameClock::Simulated { step, elapsed } => {
                let (time, delta) = match elapsed {
                    Some(t) => (*t + *step, *step),
                    None => (Duration::ZERO, Duration::ZERO),
                };
                *elapsed = Some(time);
                FrameTime {
                    time_since_start: time,
                    delta,
                }
            }
        }
    }
}

pub trait UpdateTimer: Send {
    ///Number of update ticks that run before the frame at `time` is rendered.
    fn updates_for(&mut self, time: &FrameTime) -> u32;
    ///Time each of those ticks advances.
    fn update_step(&self, time: &FrameTime) -> Duration;
}

///One update per rendered frame, advancing by the frame's delta.
#[derive(Clone, Copy, Debug, Default)]
pub struct VaryingUpdateTimer;

impl UpdateTimer for VaryingUpdateTimer {
    fn updates_for(&mut self, _time: &FrameTime) -> u32 {
        1
    }

    fn update_step(&self, time: &FrameTime) -> Duration {
        time.delta
    }
}

///Updates at a fixed rate, independent of the frame rate.
///
/// If rendering falls behind, at most `max_catch_up` updates run per frame. The remaining backlog is dropped.
#[derive(Clone, Copy, Debug)]
pub struct FixedUpdateTimer {
    step: Duration,
    accumulator: Duration,
    max_catch_up: u32,
}

impl FixedUpdateTimer {
    pub const DEFAULT_MAX_CATCH_UP: u32 = 5;

    ///Timer running `rate` updates per second. Rates that are not positive are clamped to one update per second.
    pub fn new(rate: f32) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            1.0
        };
        FixedUpdateTimer {
            step: Duration::from_secs_f32(1.0 / rate),
            accumulator: Duration::ZERO,
            max_catch_up: Self::DEFAULT_MAX_CATCH_UP,
        }
    }

    pub fn with_max_catch_up(mut self, max_catch_up: u32) -> Self {
        self.max_catch_up = max_catch_up;
        self
    }

    pub fn step(&self) -> Duration {
        self.step
    }
}

impl UpdateTimer for FixedUpdateTimer {
    fn updates_for(&mut self, time: &FrameTime) -> u32 {
        self.accumulator += time.delta;
        let mut updates = 0;
        while self.accumulator >= self.step && updates < self.max_catch_up {
            self.accumulator -= self.step;
            updates += 1;
        }
        if updates == self.max_catch_up && self.accumulator >= self.step {
            #[cfg(feature = "logging")]
            log::warn!(
                "Update timer fell behind by {:?}, dropping backlog",
                self.accumulator
            );
            self.accumulator = Duration::ZERO;
        }
        updates
    }

    fn update_step(&self, _time: &FrameTime) -> Duration {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_clock_is_reproducible() {
        let mut clock = FrameClock::simulated(Duration::from_millis(10));
        let times: Vec<_> = (0..3).map(|_| clock.tick()).collect();
        assert_eq!(times[0], FrameTime::default());
        assert_eq!(times[1].time_since_start, Duration::from_millis(10));
        assert_eq!(times[2].time_since_start, Duration::from_millis(20));
        assert_eq!(times[2].delta, Duration::from_millis(10));
    }

    #[test]
    fn realtime_clock_starts_at_zero() {
        let mut clock = FrameClock::realtime();
        let first = clock.tick();
        assert_eq!(first.delta, Duration::ZERO);
        let second = clock.tick();
        assert!(second.time_since_start >= first.time_since_start);
    }

    #[test]
    fn fixed_timer_accumulates() {
        let mut timer = FixedUpdateTimer::new(100.0);
        let frame = |ms| FrameTime {
            time_since_start: Duration::ZERO,
            delta: Duration::from_millis(ms),
        };
        assert_eq!(timer.updates_for(&frame(0)), 0);
        assert_eq!(timer.updates_for(&frame(5)), 0);
        assert_eq!(timer.updates_for(&frame(6)), 1);
        assert_eq!(timer.updates_for(&frame(20)), 2);
    }

    #[test]
    fn fixed_timer_drops_backlog() {
        let mut timer = FixedUpdateTimer::new(100.0).with_max_catch_up(2);
        let long = FrameTime {
            time_since_start: Duration::ZERO,
            delta: Duration::from_secs(1),
        };
        assert_eq!(timer.updates_for(&long), 2);
        let none = FrameTime::default();
        assert_eq!(timer.updates_for(&none), 0);
    }

    #[test]
    fn varying_timer_runs_once() {
        let mut timer = VaryingUpdateTimer;
        assert_eq!(timer.updates_for(&FrameTime::default()), 1);
    }
}
