//! Fixed-window request counters keyed by client address and API key.
//!
//! Each identifier owns one [`RateLimitEntry`] inside a [`CounterTable`]. The
//! tables are `DashMap`s, so a check locks only the shard holding that
//! identifier; unrelated identifiers never wait on each other. A background
//! task drops entries whose window elapsed without further traffic.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;
use crate::metrics::{EVICTED_TOTAL, TRACKED_ENTRIES};

// Rate limit entry - tracks requests per IP/key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

impl RateLimitEntry {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn age(&self, now: Instant) -> Duration {
        // `now` may predate a reset done by a thread that took the lock first
        now.saturating_duration_since(self.window_start)
    }
}

/// Which counter table an identifier belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Address,
    Key,
}

impl Scope {
    pub fn label(self) -> &'static str {
        match self {
            Scope::Address => "address",
            Scope::Key => "api_key",
        }
    }
}

/// Max requests per window for one kind of identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub limit: u32,
    pub window: Duration,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {}", self.limit, describe_window(self.window))
    }
}

fn describe_window(window: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];

    let secs = window.as_secs();
    if secs == 0 || window.subsec_nanos() != 0 {
        return format!("{} ms", window.as_millis());
    }
    let (unit_secs, name) = UNITS
        .into_iter()
        .find(|(unit_secs, _)| secs % unit_secs == 0)
        .unwrap_or((1, "second"));
    match secs / unit_secs {
        1 => name.to_string(),
        n => format!("{n} {name}s"),
    }
}

/// Outcome of gating one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    RejectedAddress,
    RejectedKey,
}

/// Identifier -> counter map.
#[derive(Default)]
pub struct CounterTable {
    entries: DashMap<String, RateLimitEntry>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits the request and counts it, unless `identifier` already used
    /// `limit` slots in its current window. An expired window is restarted
    /// before the limit is evaluated.
    ///
    /// The whole read-reset-check-increment runs under the shard write lock
    /// held by the entry guard.
    pub fn check_and_increment(&self, identifier: &str, limit: u32, window: Duration) -> bool {
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(identifier) {
            return admit(&mut entry, now, limit, window);
        }

        let mut entry = self
            .entries
            .entry(identifier.to_owned())
            .or_insert_with(|| RateLimitEntry::fresh(now));
        admit(&mut entry, now, limit, window)
    }

    /// Removes every entry whose window fully elapsed, returns how many went.
    pub fn evict_expired(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.age(now) <= window;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn admit(entry: &mut RateLimitEntry, now: Instant, limit: u32, window: Duration) -> bool {
    if entry.age(now) >= window {
        *entry = RateLimitEntry::fresh(now);
    }

    if entry.count >= limit {
        return false;
    }

    entry.count += 1;
    true
}

// state shared between request handlers and the eviction task
struct Limits {
    addresses: CounterTable,
    keys: CounterTable,
    address_policy: Policy,
    key_policy: Policy,
}

impl Limits {
    fn table(&self, scope: Scope) -> (&CounterTable, Policy) {
        match scope {
            Scope::Address => (&self.addresses, self.address_policy),
            Scope::Key => (&self.keys, self.key_policy),
        }
    }

    fn check(&self, scope: Scope, identifier: &str) -> bool {
        let (table, policy) = self.table(scope);
        let admitted = table.check_and_increment(identifier, policy.limit, policy.window);
        if !admitted {
            debug!(scope = scope.label(), "Rate limit exceeded");
        }
        admitted
    }

    fn evict_expired(&self) -> usize {
        let mut removed = 0;
        for scope in [Scope::Address, Scope::Key] {
            let (table, policy) = self.table(scope);
            let evicted = table.evict_expired(policy.window);
            EVICTED_TOTAL.with_label_values(&[scope.label()]).inc_by(evicted as f64);
            TRACKED_ENTRIES
                .with_label_values(&[scope.label()])
                .set(table.len() as f64);
            removed += evicted;
        }
        removed
    }
}

/// Process-wide limiter consulted by the request gate.
///
/// Construct it once at startup inside a tokio runtime; construction spawns
/// the eviction task, which runs until [`RateLimiter::stop`] is awaited or
/// the limiter is dropped.
pub struct RateLimiter {
    limits: Arc<Limits>,
    shutdown: CancellationToken,
    eviction: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let limits = Arc::new(Limits {
            addresses: CounterTable::new(),
            keys: CounterTable::new(),
            address_policy: Policy {
                limit: config.address_limit,
                window: config.address_window,
            },
            key_policy: Policy {
                limit: config.key_limit,
                window: config.key_window,
            },
        });
        let shutdown = CancellationToken::new();

        // first tick one full interval from now, not immediately
        let period = config.cleanup_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = tokio::spawn(eviction_task(Arc::clone(&limits), ticker, shutdown.clone()));

        Self {
            limits,
            shutdown,
            eviction: Mutex::new(Some(handle)),
        }
    }

    pub fn address_policy(&self) -> Policy {
        self.limits.address_policy
    }

    pub fn key_policy(&self) -> Policy {
        self.limits.key_policy
    }

    /// Runs one policy check for `identifier` against the table for `scope`.
    /// Callers must not pass an empty identifier.
    pub fn check_and_increment(&self, scope: Scope, identifier: &str) -> bool {
        self.limits.check(scope, identifier)
    }

    /// Gates one request: the address is always checked first and a rejected
    /// address never consumes a slot from the key's quota. An empty
    /// `api_key` skips the key check.
    pub fn evaluate_request(&self, client_address: &str, api_key: &str) -> Decision {
        if !self.check_and_increment(Scope::Address, client_address) {
            return Decision::RejectedAddress;
        }

        if !api_key.is_empty() && !self.check_and_increment(Scope::Key, api_key) {
            return Decision::RejectedKey;
        }

        Decision::Admitted
    }

    pub fn tracked(&self, scope: Scope) -> usize {
        self.limits.table(scope).0.len()
    }

    #[cfg(test)]
    pub fn entry(&self, scope: Scope, identifier: &str) -> Option<RateLimitEntry> {
        self.limits.table(scope).0.get(identifier)
    }

    /// Cancels the eviction task and waits for it to finish.
    ///
    /// Returns `true` on the call that actually stopped the task. Any later
    /// call is a no-op returning `false`.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.eviction.lock().await.take() else {
            return false;
        };

        self.shutdown.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Rate limit eviction task ended abnormally");
        }
        true
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn eviction_task(limits: Arc<Limits>, mut ticker: Interval, shutdown: CancellationToken) {
    info!(
        interval_secs = ticker.period().as_secs(),
        "Rate limit eviction task started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limits.evict_expired();
                debug!(
                    removed,
                    addresses = limits.addresses.len(),
                    keys = limits.keys.len(),
                    "Evicted idle rate limit entries"
                );
            }
            _ = shutdown.cancelled() => {
                info!("Rate limit eviction task stopped");
                break;
            }
        }
    }
}
