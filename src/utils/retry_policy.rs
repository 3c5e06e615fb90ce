/// Exponential backoff schedule spread over a fixed total retry budget.
///
/// The delays form a geometric series `base * multiplier^n` whose sum over
/// `max_retries` attempts equals `total_time_s`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExponentialBackoff {
    max_retries: u64,
    total_time_s: u64,
    multiplier: f64,
}

impl ExponentialBackoff {
    pub(crate) fn new(max_retries: u64, total_time_s: u64, multiplier: f64) -> Self {
        Self {
            max_retries,
            total_time_s,
            multiplier,
        }
    }

    pub(crate) fn max_retries(&self) -> u64 {
        self.max_retries
    }

    /// Delay in seconds before retry number `attempt` (1-based). Never below one second.
    pub(crate) fn get_delay(&self, attempt: u64) -> u64 {
        if self.max_retries == 0 {
            return 1;
        }
        let retries = self.max_retries as f64;
        let base = if (self.multiplier - 1.0).abs() < f64::EPSILON {
            self.total_time_s as f64 / retries
        } else {
            self.total_time_s as f64 * (self.multiplier - 1.0)
                / (self.multiplier.powf(retries) - 1.0)
        };
        let exponent = attempt.saturating_sub(1) as f64;
        let delay = (base * self.multiplier.powf(exponent)).round() as u64;
        delay.max(1)
    }
}
