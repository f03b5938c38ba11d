use std::time::Duration;

use rand::Rng;

const MAX_DELAY_SECS: f64 = 60.0;

/// Reconnect delay: min(base * 2^attempt, 60s) plus uniform jitter in
/// [0, 10% of the delay].
pub fn reconnect_delay(base_seconds: u64, attempt: u32) -> Duration {
    let base = base_seconds as f64;
    let exp = base * 2f64.powi(attempt.min(16) as i32);
    let capped = exp.min(MAX_DELAY_SECS);
    let jitter = rand::thread_rng().gen_range(0.0..=capped * 0.1);
    Duration::from_secs_f64(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        for attempt in 0..20 {
            let delay = reconnect_delay(1, attempt).as_secs_f64();
            let expected = (2f64.powi(attempt.min(16) as i32)).min(MAX_DELAY_SECS);
            assert!(delay >= expected, "attempt {}: {} < {}", attempt, delay, expected);
            assert!(
                delay <= expected * 1.1 + f64::EPSILON,
                "attempt {}: {} > {}",
                attempt,
                delay,
                expected * 1.1
            );
        }
    }

    #[test]
    fn test_delay_caps_at_sixty_seconds_plus_jitter() {
        let delay = reconnect_delay(5, 30);
        assert!(delay <= Duration::from_secs_f64(66.0 + f64::EPSILON));
    }
}
