//! Timing and cadence helpers.
use std::time::{Duration, Instant};

/// Accumulates durations of repeated sections of code.
///
/// ```rust
/// use tandem_core::util::Timer;
///
/// let mut timer = Timer::new("run");
/// let x = timer.time(|| 1 + 1);
/// assert_eq!(x, 2);
/// assert_eq!(timer.count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Timer {
    name: String,
    total: Duration,
    last: Duration,
    count: u32,
}

impl Timer {
    /// Creates a timer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: Duration::ZERO,
            last: Duration::ZERO,
            count: 0,
        }
    }

    /// Name of the timer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `f`, adding its duration to the timer.
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let t = Instant::now();
        let x = f();
        self.last = t.elapsed();
        self.total += self.last;
        self.count += 1;
        x
    }

    /// Total time in seconds.
    pub fn total(&self) -> f32 {
        self.total.as_secs_f32()
    }

    /// Duration of the last timed section in seconds.
    pub fn last(&self) -> f32 {
        self.last.as_secs_f32()
    }

    /// Average duration in seconds, `0` before the first section.
    pub fn average(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.total() / self.count as f32
        }
    }

    /// Number of timed sections.
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Fires once each time a counter crosses the next multiple of a period.
#[derive(Clone, Debug)]
pub struct Every {
    period: usize,
    next: usize,
}

impl Every {
    /// Fires first at `start`, then every `period`.
    pub fn new(period: usize, start: usize) -> Self {
        Self {
            period: period.max(1),
            next: start,
        }
    }

    /// Returns `true` if `x` reached the next firing point, advancing it past `x`.
    pub fn fires(&mut self, x: usize) -> bool {
        if x < self.next {
            return false;
        }
        while x >= self.next {
            self.next += self.period;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every() {
        let mut every = Every::new(10, 10);
        assert!(!every.fires(0));
        assert!(!every.fires(9));
        assert!(every.fires(10));
        assert!(!every.fires(15));
        assert!(every.fires(35));
        assert!(!every.fires(39));
        assert!(every.fires(40));
    }

    #[test]
    fn test_timer() {
        let mut timer = Timer::new("train");
        assert_eq!(timer.average(), 0.0);
        timer.time(|| std::thread::sleep(Duration::from_millis(2)));
        timer.time(|| ());
        assert_eq!(timer.count(), 2);
        assert!(timer.total() >= timer.last());
        assert!(timer.average() > 0.0);
        assert_eq!(timer.name(), "train");
    }
}
