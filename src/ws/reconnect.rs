use super::close_codes::NO_RECONNECT;
use rand::Rng;
use std::time::Duration;

pub fn should_reconnect(auto_reconnect: bool, manual_stop: bool, close_code: u16) -> bool {
    auto_reconnect && !manual_stop && !NO_RECONNECT.contains(&close_code)
}

/// `min * 2^(attempt-1)` capped at `max`, then jittered by up to ±20%.
/// `attempt` starts at 1.
pub fn reconnect_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    let base = backoff_base(attempt, min, max);
    let jitter = base * 0.2 * rand::thread_rng().gen_range(-1.0..=1.0);
    Duration::from_millis((base + jitter).round().max(0.0) as u64)
}

fn backoff_base(attempt: u32, min: Duration, max: Duration) -> f64 {
    let exp = attempt.saturating_sub(1).min(30) as i32;
    let base = min.as_millis() as f64 * 2f64.powi(exp);
    base.min(max.as_millis() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_reconnect_codes_and_manual_stop_block() {
        assert!(should_reconnect(true, false, 1006));
        assert!(should_reconnect(true, false, 4700));
        assert!(!should_reconnect(true, false, 4710));
        assert!(!should_reconnect(true, false, 4500));
        assert!(!should_reconnect(true, false, 4800));
        assert!(!should_reconnect(true, true, 1006));
        assert!(!should_reconnect(false, false, 1006));
    }

    #[test]
    fn delay_doubles_until_capped() {
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(8000);
        assert_eq!(backoff_base(1, min, max), 500.0);
        assert_eq!(backoff_base(3, min, max), 2000.0);
        assert_eq!(backoff_base(10, min, max), 8000.0);
        assert_eq!(backoff_base(u32::MAX, min, max), 8000.0);
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(8000);
        for attempt in 1..8 {
            let base = backoff_base(attempt, min, max);
            let ms = reconnect_delay(attempt, min, max).as_millis() as f64;
            assert!(ms >= (base * 0.8).floor() && ms <= (base * 1.2).ceil(), "{} vs {}", ms, base);
        }
    }
}
