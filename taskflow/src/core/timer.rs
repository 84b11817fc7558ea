//! Self-expiring run-phase timer.

use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;

/// Authored timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerBound {
    /// No bound; the run phase ends only through a stop signal.
    #[default]
    Unbounded,
    Fixed(Duration),
    /// Re-sampled uniformly from `[min, max]` on every prepare.
    Randomized { min: Duration, max: Duration },
}

/// Accumulates tick deltas during a task's run phase and fires once when the
/// bound is reached.
#[derive(Debug, Clone, Default)]
pub struct TaskTimer {
    bound: TimerBound,
    active_bound: Option<Duration>,
    elapsed: Duration,
    expired: bool,
}

impl TaskTimer {
    pub fn new(bound: TimerBound) -> Self {
        Self {
            bound,
            ..Self::default()
        }
    }

    /// Bound in effect for the current pass (`None` is unbounded).
    pub fn active_bound(&self) -> Option<Duration> {
        self.active_bound
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn has_expired(&self) -> bool {
        self.expired
    }

    /// Zero the elapsed time and pick the bound for this pass.
    pub fn start(&mut self, rng: &mut StdRng) {
        self.elapsed = Duration::ZERO;
        self.expired = false;
        self.active_bound = match self.bound {
            TimerBound::Unbounded => None,
            TimerBound::Fixed(bound) => Some(bound),
            TimerBound::Randomized { min, max } if min >= max => Some(min),
            TimerBound::Randomized { min, max } => Some(rng.gen_range(min..=max)),
        };
    }

    /// Add one tick. Returns true on the first tick where elapsed reaches the bound.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.elapsed += dt;
        let Some(bound) = self.active_bound else {
            return false;
        };
        if self.expired || self.elapsed < bound {
            return false;
        }
        self.expired = true;
        true
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
        self.expired = false;
        self.active_bound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fixed_timer_fires_once_at_bound() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut timer = TaskTimer::new(TimerBound::Fixed(Duration::from_secs(3)));
        timer.start(&mut rng);

        assert!(!timer.advance(Duration::from_secs(1)));
        assert!(!timer.advance(Duration::from_secs(1)));
        assert!(timer.advance(Duration::from_secs(1)));
        assert!(!timer.advance(Duration::from_secs(1)));
        assert_eq!(timer.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn unbounded_timer_never_fires() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut timer = TaskTimer::new(TimerBound::Unbounded);
        timer.start(&mut rng);
        for _ in 0..100 {
            assert!(!timer.advance(Duration::from_secs(60)));
        }
        assert!(!timer.has_expired());
    }

    #[test]
    fn randomized_bound_stays_within_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(1500);
        let mut timer = TaskTimer::new(TimerBound::Randomized { min, max });
        for _ in 0..50 {
            timer.start(&mut rng);
            let bound = timer.active_bound().expect("bound");
            assert!(bound >= min && bound <= max);
        }
    }

    #[test]
    fn start_rewinds_elapsed_time() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut timer = TaskTimer::new(TimerBound::Fixed(Duration::from_secs(1)));
        timer.start(&mut rng);
        assert!(timer.advance(Duration::from_secs(2)));

        timer.start(&mut rng);
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert!(!timer.has_expired());
    }
}
