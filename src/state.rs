use crate::rate_limit::RateLimiter;
use crate::store::Store;
// app's shared state

pub struct AppState {
    pub store: Store,
    pub rate_limiter: RateLimiter, // consulted before any route runs
}
