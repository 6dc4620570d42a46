//! Timestamp helpers

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at microsecond precision.
///
/// PostgreSQL `timestamptz` stores microseconds, so every backend stamps
/// records at that precision and round trips compare equal.
pub fn now() -> DateTime<Utc> {
    to_storage_precision(Utc::now())
}

/// Drop anything finer than a microsecond
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// True when `ts` survives a PostgreSQL round trip unchanged
pub fn is_storage_precision(ts: DateTime<Utc>) -> bool {
    ts.timestamp_subsec_nanos() % 1_000 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_no_sub_microsecond_part() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
        assert!(is_storage_precision(ts));
    }

    #[test]
    fn test_nanoseconds_are_not_storage_precision() {
        let ts = Utc::now().trunc_subsecs(6) + chrono::Duration::nanoseconds(1);
        assert!(!is_storage_precision(ts));
        assert!(is_storage_precision(to_storage_precision(ts)));
    }
}
