use std::time::{SystemTime, UNIX_EPOCH};

/// return millisecond
pub(crate) fn unix_now_ms() -> u128 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_millis()
}

/// return second
pub(crate) fn unix_now_secs() -> u64 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_secs()
}
