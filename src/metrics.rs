use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, GaugeVec, register_counter, register_counter_vec, register_gauge_vec,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("naturedopes_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: CounterVec = register_counter_vec!(
        "naturedopes_rate_limited_total",
        "Requests rejected by the rate limiter",
        &["scope"]
    )
    .unwrap();
    pub static ref EVICTED_TOTAL: CounterVec = register_counter_vec!(
        "naturedopes_rate_limit_evicted_total",
        "Idle rate limit entries removed by the eviction task",
        &["scope"]
    )
    .unwrap();
    pub static ref TRACKED_ENTRIES: GaugeVec = register_gauge_vec!(
        "naturedopes_rate_limit_entries",
        "Rate limit entries held after the last eviction pass",
        &["scope"]
    )
    .unwrap();
}
