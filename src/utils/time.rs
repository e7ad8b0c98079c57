//! Wall-clock helpers

use chrono::Utc;

/// Current wall-clock time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Zero-padded `MM:SS`
pub fn format_mm_ss(min: u64, sec: u64) -> String {
    format!("{:02}:{:02}", min, sec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_both_fields() {
        assert_eq!(format_mm_ss(2, 15), "02:15");
        assert_eq!(format_mm_ss(0, 5), "00:05");
        assert_eq!(format_mm_ss(12, 0), "12:00");
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
