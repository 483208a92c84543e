use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

lazy_static! {
    /// Upstream playlist refresh attempts
    pub static ref M3U_REFRESH_TOTAL: IntCounter = register_int_counter!(
        "m3u_refresh_total",
        "Total upstream playlist refresh attempts"
    )
    .unwrap();

    /// Refresh attempts that ended with an empty channel set
    pub static ref M3U_REFRESH_FAILURES: IntCounter = register_int_counter!(
        "m3u_refresh_failures_total",
        "Upstream playlist refreshes that failed"
    )
    .unwrap();

    /// Playback credential checks by outcome (ok, denied, expired)
    pub static ref PLAYBACK_AUTH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "playback_auth_total",
        "Playback authorization attempts",
        &["outcome"]
    )
    .unwrap();
}
