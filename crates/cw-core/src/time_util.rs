//! Wall-clock helpers.
//!
//! Only used where local time is acceptable (request signing, the in-memory
//! store's epoch). Rate limiting reads time from the shared store instead,
//! see [`crate::clock`].

use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
fn since_epoch() -> std::time::Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    since_epoch().as_micros() as u64
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_and_us_agree() {
        let us = now_us();
        let ms = now_ms();
        assert!(ms >= us / 1000);
        assert!(ms - us / 1000 < 1_000);
    }
}
