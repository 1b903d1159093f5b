//! Unix clock helpers

use chrono::Utc;

/// Current unix time in seconds
pub fn unix_now_secs() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_unix_seconds() {
        let secs = unix_now_secs();
        assert!(secs > 1_600_000_000);
        assert!(secs < 100_000_000_000);
    }
}
