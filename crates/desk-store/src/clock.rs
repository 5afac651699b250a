//! Wall-clock time in milliseconds since the Unix epoch.
//!
//! On WASM this is `Date.now()`; natively it comes from `SystemTime`.

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Not monotonic: it can jump when the host clock is adjusted. Ordering in the
/// eventing core never depends on it; ids carry the order.
#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub fn wallclock_ms() -> u64 {
    js_sys::Date::now() as u64
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Not monotonic: it can jump when the host clock is adjusted. Ordering in the
/// eventing core never depends on it; ids carry the order.
#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
pub fn wallclock_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
