pub mod hmac;

pub use hmac::{BitgetSigner, BybitSigner};

use std::sync::atomic::{AtomicI64, Ordering};

static LAST_TIMESTAMP_MS: AtomicI64 = AtomicI64::new(0);

/// Milliseconds since epoch, strictly increasing across the whole process.
///
/// Some exchanges invalidate a signature whose timestamp repeats an earlier
/// one, so concurrent signing operations must never draw the same value.
pub fn next_timestamp_ms() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut prev = LAST_TIMESTAMP_MS.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1);
        match LAST_TIMESTAMP_MS.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_strictly_increase() {
        let mut last = next_timestamp_ms();
        for _ in 0..1000 {
            let ts = next_timestamp_ms();
            assert!(ts > last, "timestamp {ts} did not advance past {last}");
            last = ts;
        }
    }
}
