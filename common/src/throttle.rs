use std::time;

/// Allows a fixed number of operations per interval, sleeping callers past
/// the budget until the interval rolls over.
#[derive(Debug)]
pub struct IntervalLimiter {
    times: u64,
    interval: time::Duration,

    times_left: u64,
    last_interval: time::Instant,
}

impl IntervalLimiter {
    pub fn new(operations_per_interval: u64, time_interval: time::Duration) -> IntervalLimiter {
        IntervalLimiter {
            times: operations_per_interval,
            interval: time_interval,

            times_left: operations_per_interval,
            last_interval: time::Instant::now(),
        }
    }

    pub fn per_second(operations: u64) -> IntervalLimiter {
        Self::new(operations, time::Duration::from_secs(1))
    }

    pub async fn wait(&mut self) {
        let curr_interval = time::Instant::now().duration_since(self.last_interval);
        if curr_interval > self.interval {
            self.reset();
        } else if self.times_left == 0 {
            tokio::time::sleep(self.interval - curr_interval).await;
            self.reset();
        }
        self.times_left -= 1;
    }

    pub fn should_throttle(&mut self) -> bool {
        let curr_interval = time::Instant::now().duration_since(self.last_interval);
        if curr_interval > self.interval {
            self.reset();
            return false;
        }
        self.times_left == 0
    }

    pub fn reset(&mut self) {
        self.times_left = self.times;
        self.last_interval = time::Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limiter_allows_budget_without_waiting() {
        let mut limiter = IntervalLimiter::new(3, time::Duration::from_secs(5));
        let start = time::Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() < time::Duration::from_millis(100));
    }

    #[test]
    fn test_should_throttle_after_budget() {
        let mut limiter = IntervalLimiter::new(1, time::Duration::from_secs(60));
        assert!(!limiter.should_throttle());
        limiter.times_left = 0;
        assert!(limiter.should_throttle());
    }
}
