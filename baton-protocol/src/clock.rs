use std::time::{SystemTime, UNIX_EPOCH};

/// Current epoch time split into whole seconds and the microsecond
/// remainder, the form ping requests are stamped with.
pub fn epoch_micros() -> (u64, u64) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs(), u64::from(now.subsec_micros()))
}

/// Current epoch time in microseconds.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Elapsed milliseconds between a ping request stamp and `now_micros`.
///
/// Both sides only need to agree on the epoch, not on a synchronized
/// clock source; skew can make the result negative, so it is signed.
pub fn elapsed_millis(sec: u64, usec: u64, now_micros: u64) -> i64 {
    let stamped = (sec as i64) * 1_000_000 + usec as i64;
    (now_micros as i64 - stamped) / 1000
}
