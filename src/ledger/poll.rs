use rand::Rng;
use std::time::Duration;

/// Backoff schedule for polling a submitted transaction until it reaches a
/// terminal state.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first status check
    pub initial_interval: Duration,
    /// Upper bound on a single delay
    pub max_interval: Duration,
    /// Overall budget measured from submission; exceeding it is a timeout
    pub deadline: Duration,
    /// Jitter factor (0.0 to 1.0) applied to each delay
    pub jitter_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(4),
            deadline: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl PollConfig {
    /// Delay before poll number `attempt` (0-indexed): initial * 2^attempt, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_millis() as f64;
        let exp = base * 2_f64.powi(attempt.min(30) as i32);
        let capped = exp.min(self.max_interval.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}
