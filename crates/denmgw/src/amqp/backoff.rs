//! Retry pacing for broker connection attempts.

use rand::Rng;
use std::time::Duration;

/// Doubling retry schedule with jitter, capped at a maximum delay.
///
/// The nominal delay for attempt `n` is `base * 2^n`, capped; the returned
/// delay is drawn uniformly from 75..=125 % of the nominal value so that a
/// fleet of gateways reconnecting after a broker restart does not stampede
/// in lockstep.
#[derive(Debug)]
pub struct RetrySchedule {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl RetrySchedule {
    /// Creates a schedule starting at `base` and capped at `cap`.
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// The jittered delay for the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        // 2^16 already exceeds any sane cap/base ratio, so clamping the
        // exponent keeps the shift in range without changing the result.
        let doublings = self.attempt.min(16);
        let nominal = self.base.saturating_mul(1 << doublings).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        nominal.mul_f64(jitter)
    }

    /// Starts the schedule over from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jitter_bounds(nominal: Duration) -> (Duration, Duration) {
        (nominal.mul_f64(0.75), nominal.mul_f64(1.25))
    }

    #[test]
    fn first_delay_stays_near_the_base() {
        let mut schedule =
            RetrySchedule::new(Duration::from_millis(100), Duration::from_secs(10));
        let (lo, hi) = jitter_bounds(Duration::from_millis(100));
        let delay = schedule.next_delay();
        assert!(delay >= lo && delay <= hi, "{delay:?}");
    }

    #[test]
    fn delays_double_until_the_cap() {
        let mut schedule = RetrySchedule::new(Duration::from_secs(1), Duration::from_secs(10));
        for nominal_secs in [1u64, 2, 4, 8, 10, 10] {
            let (lo, hi) = jitter_bounds(Duration::from_secs(nominal_secs));
            let delay = schedule.next_delay();
            assert!(
                delay >= lo && delay <= hi,
                "expected around {nominal_secs}s, got {delay:?}"
            );
        }
    }

    #[test]
    fn reset_starts_the_schedule_over() {
        let mut schedule =
            RetrySchedule::new(Duration::from_millis(200), Duration::from_secs(5));
        for _ in 0..6 {
            schedule.next_delay();
        }
        schedule.reset();

        let (lo, hi) = jitter_bounds(Duration::from_millis(200));
        let delay = schedule.next_delay();
        assert!(delay >= lo && delay <= hi, "{delay:?}");
    }

    #[test]
    fn long_schedules_never_exceed_the_jittered_cap() {
        let cap = Duration::from_secs(10);
        let mut schedule = RetrySchedule::new(Duration::from_millis(1), cap);
        for _ in 0..100 {
            assert!(schedule.next_delay() <= cap.mul_f64(1.25));
        }
    }
}
