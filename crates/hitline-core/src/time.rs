/// Milliseconds since the Unix epoch, as used for hit and session timestamps.
pub fn now_ms() -> u64 {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_millis() as u64
}

/// Convert a millisecond delta to seconds rounded to two decimals. Takes
/// `i128` so the difference of any two `u64` timestamps fits.
pub fn ms_to_secs(delta_ms: i128) -> f64 {
    round2(delta_ms as f64 / 1000.0)
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn ms_to_secs_rounds() {
        assert_eq!(ms_to_secs(4000), 4.0);
        assert_eq!(ms_to_secs(1234), 1.23);
        assert_eq!(ms_to_secs(1237), 1.24);
        assert_eq!(ms_to_secs(-1500), -1.5);
    }

    #[test]
    fn ms_to_secs_spans_the_full_u64_range() {
        let span = i128::from(u64::MAX);
        assert!(ms_to_secs(span) > 1.8e16);
        assert!(ms_to_secs(-span) < -1.8e16);
    }
}
