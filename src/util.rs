/// Nanoseconds on the monotonic clock, for [`crate::Item::set_timestamp`].
#[cfg(unix)]
#[must_use]
pub fn monotonic_now_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &raw mut ts) };
    if rc != 0 {
        log::warn!("clock_gettime failed: {}", std::io::Error::last_os_error());
        return 0;
    }
    i64::from(ts.tv_sec)
        .saturating_mul(1_000_000_000)
        .saturating_add(i64::from(ts.tv_nsec))
}

/// Nanoseconds since the first call in this process.
#[cfg(not(unix))]
#[must_use]
pub fn monotonic_now_ns() -> i64 {
    use once_cell::sync::Lazy;
    use std::time::Instant;

    static START: Lazy<Instant> = Lazy::new(Instant::now);
    i64::try_from(START.elapsed().as_nanos()).unwrap_or(i64::MAX)
}
