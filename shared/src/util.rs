use chrono::{DateTime, TimeZone, Utc};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Millisecond timestamp → `DateTime<Utc>`.
///
/// Out-of-range values clamp to the Unix epoch rather than panic; stored
/// timestamps are always produced by [`now_millis`] so this is unreachable
/// in practice.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_roundtrip() {
        let now = now_millis();
        assert_eq!(from_millis(now).timestamp_millis(), now);
    }

    #[test]
    fn from_millis_is_utc_rfc3339() {
        // 2026-01-02T03:04:05Z
        let dt = from_millis(1_767_323_045_000);
        assert_eq!(dt.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }
}
