//! Breach-check orchestration.
//!
//! Composes the digest, the volatile recency tracker, the durable range
//! cache, the pacer, and the range client into one offline-first check:
//! cache wins over network, and every operational failure degrades to a
//! "verdict unknown" result instead of an error.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::client::{DEFAULT_BASE_URL, HibpRangeClient, RangeLookup};
use crate::digest::digest_password;
use crate::error::Error;
use crate::lru::RecencyTracker;
use crate::pacer::{MAX_RETRIES, Pacer};
use crate::store::{CacheEntry, SuffixStore, now_ms};

/// Outcome of one breach check. Constructed fresh per call, never persisted.
///
/// `checked: false` means the verdict is unknown (offline, throttled out,
/// or timed out) — callers must not read it as "not breached".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BreachResult {
    pub checked: bool,
    pub breached: Option<bool>,
    /// `Some(1)` when breached. The bucket the range API returns carries no
    /// usable per-entry occurrence count, so no richer number is invented.
    pub count: Option<u32>,
    pub offline: bool,
    pub cached: bool,
}

impl BreachResult {
    fn verdict(breached: bool, cached: bool) -> Self {
        Self {
            checked: true,
            breached: Some(breached),
            count: breached.then_some(1),
            offline: false,
            cached,
        }
    }

    fn offline() -> Self {
        Self { checked: false, offline: true, ..Self::default() }
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// When false, the check never leaves the local caches.
    pub allow_network: bool,
    /// Deadline for the network fetch; elapsing aborts the request.
    pub timeout: Duration,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self { allow_network: true, timeout: Duration::from_secs(5) }
    }
}

/// Construction-time configuration for [`BreachChecker`].
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Volatile tier capacity; overflowing it evicts the least-recently
    /// used prefix from both tiers.
    pub cache_capacity: usize,
    /// Durable rows older than this are treated as absent and purged.
    pub ttl: Duration,
    /// Minimum spacing between outbound lookups, across all callers.
    pub min_request_interval: Duration,
    /// Retries after a throttling response before giving up.
    pub max_retries: u32,
    pub base_url: String,
    pub user_agent: String,
    /// Ask the server to pad buckets so their true size is hidden on the
    /// wire; filler entries are stripped locally.
    pub add_padding: bool,
    /// Durable cache location. `None` runs with the volatile tier only.
    pub db_path: Option<PathBuf>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            ttl: Duration::from_secs(24 * 60 * 60),
            min_request_interval: Duration::from_secs(1),
            max_retries: MAX_RETRIES,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: concat!("pwncheck/", env!("CARGO_PKG_VERSION")).to_string(),
            add_padding: true,
            db_path: None,
        }
    }
}

/// Checks passwords against the breach corpus without revealing them.
///
/// Owns both cache tiers exclusively. Construct one at the application's
/// composition root and share it by reference; there is no hidden global
/// instance.
pub struct BreachChecker<C = HibpRangeClient> {
    lru: Mutex<RecencyTracker>,
    store: SuffixStore,
    pacer: Pacer,
    client: C,
    max_retries: u32,
}

impl BreachChecker<HibpRangeClient> {
    /// Builds a checker over the real range API.
    pub fn new(config: CheckerConfig) -> Result<Self, Error> {
        let client =
            HibpRangeClient::new(&config.base_url, &config.user_agent, config.add_padding)?;
        Ok(Self::with_client(config, client))
    }
}

impl<C: RangeLookup> BreachChecker<C> {
    /// Builds a checker over a caller-supplied lookup implementation.
    pub fn with_client(config: CheckerConfig, client: C) -> Self {
        let store = match config.db_path {
            Some(path) => SuffixStore::open(path, config.ttl),
            None => SuffixStore::disabled(),
        };
        Self {
            lru: Mutex::new(RecencyTracker::new(config.cache_capacity)),
            store,
            pacer: Pacer::new(config.min_request_interval),
            client,
            max_retries: config.max_retries,
        }
    }

    /// Checks whether `password` appears in the breach corpus.
    ///
    /// Only the 5-character digest prefix is ever sent over the network;
    /// the password and the digest suffix stay in-process. Operational
    /// failures (offline, throttled out, timed out, storage gone) resolve
    /// to `checked: false`, never to an error.
    // skip_all keeps the password and digest out of spans.
    #[instrument(level = "debug", skip_all)]
    pub async fn check_password(&self, password: &str, options: &CheckOptions) -> BreachResult {
        let digest = digest_password(password);

        let evicted = {
            let mut lru = match self.lru.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            lru.touch(&digest.prefix)
        };
        if let Some(evicted) = evicted {
            debug!(prefix = %evicted, "evicting least-recently-used prefix");
            self.store.delete(&evicted);
        }

        if let Some(entry) = self.store.get(&digest.prefix) {
            debug!(prefix = %digest.prefix, "range cache hit");
            return BreachResult::verdict(entry.suffixes.contains(&digest.suffix), true);
        }

        if !options.allow_network {
            debug!(prefix = %digest.prefix, "cache miss with network disallowed");
            return BreachResult::offline();
        }

        match self.fetch_with_retry(&digest.prefix, options.timeout).await {
            Ok(suffixes) => {
                let entry = CacheEntry {
                    prefix: digest.prefix.clone(),
                    suffixes: suffixes.into_iter().collect(),
                    fetched_at: now_ms(),
                };
                self.store.put(&entry);
                BreachResult::verdict(entry.suffixes.contains(&digest.suffix), false)
            }
            Err(e) => {
                warn!(prefix = %digest.prefix, error = %e, "range lookup failed, verdict unknown");
                BreachResult::offline()
            }
        }
    }

    /// Empties both cache tiers. Always succeeds, even when the durable
    /// backing is unavailable.
    pub fn clear_cache(&self) {
        let mut lru = match self.lru.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        lru.clear();
        self.store.clear();
    }

    /// One paced fetch plus backoff-and-retry on throttling. Timeouts and
    /// hard HTTP failures are terminal for the call; only throttling
    /// responses consume the retry budget.
    async fn fetch_with_retry(&self, prefix: &str, timeout: Duration) -> Result<Vec<String>, Error> {
        let mut attempt = 0u32;
        loop {
            self.pacer.schedule().await;
            match self.client.fetch_range(prefix, timeout).await {
                Ok(suffixes) => return Ok(suffixes),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.max_retries {
                        return Err(Error::MaxRetriesExceeded {
                            prefix: prefix.to_string(),
                            retries: self.max_retries,
                        });
                    }
                    let delay = self.pacer.backoff_delay(attempt);
                    debug!(prefix, attempt, delay_ms = delay.as_millis() as u64,
                        "throttled, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    enum FakeBehavior {
        /// Serve canned buckets; unknown prefixes get an empty bucket.
        Buckets(HashMap<String, Vec<String>>),
        AlwaysThrottled,
        AlwaysTimeout,
    }

    struct FakeRangeClient {
        behavior: FakeBehavior,
        requests: StdMutex<Vec<String>>,
    }

    impl FakeRangeClient {
        fn with_buckets(buckets: HashMap<String, Vec<String>>) -> Self {
            Self { behavior: FakeBehavior::Buckets(buckets), requests: StdMutex::new(Vec::new()) }
        }

        fn throttled() -> Self {
            Self { behavior: FakeBehavior::AlwaysThrottled, requests: StdMutex::new(Vec::new()) }
        }

        fn timing_out() -> Self {
            Self { behavior: FakeBehavior::AlwaysTimeout, requests: StdMutex::new(Vec::new()) }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl RangeLookup for FakeRangeClient {
        async fn fetch_range(
            &self,
            prefix: &str,
            timeout: Duration,
        ) -> Result<Vec<String>, Error> {
            self.requests.lock().unwrap().push(prefix.to_string());
            match &self.behavior {
                FakeBehavior::Buckets(buckets) => {
                    Ok(buckets.get(prefix).cloned().unwrap_or_default())
                }
                FakeBehavior::AlwaysThrottled => {
                    Err(Error::Throttled { prefix: prefix.to_string() })
                }
                FakeBehavior::AlwaysTimeout => {
                    Err(Error::Timeout { prefix: prefix.to_string(), timeout })
                }
            }
        }
    }

    fn fast_config(dir: Option<&tempfile::TempDir>) -> CheckerConfig {
        CheckerConfig {
            min_request_interval: Duration::from_millis(10),
            db_path: dir.map(|d| d.path().join("range_cache.sqlite")),
            ..CheckerConfig::default()
        }
    }

    /// Bucket containing the true suffix of "password" plus unrelated noise.
    fn password_bucket() -> HashMap<String, Vec<String>> {
        let mut buckets = HashMap::new();
        buckets.insert(
            "5BAA6".to_string(),
            vec![
                "1E4C9B93F3F0682250B6CF8331B7EE68FD8".to_string(),
                "00000000000000000000000000000000000".to_string(),
            ],
        );
        buckets
    }

    #[tokio::test]
    async fn test_offline_cold_cache_makes_no_network_calls() {
        let client = FakeRangeClient::with_buckets(password_bucket());
        let checker = BreachChecker::with_client(fast_config(None), client);

        let options = CheckOptions { allow_network: false, ..CheckOptions::default() };
        let result = checker.check_password("password", &options).await;

        assert_eq!(
            result,
            BreachResult {
                checked: false,
                breached: None,
                count: None,
                offline: true,
                cached: false
            }
        );
        assert!(checker.client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_breached_password_then_cached() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeRangeClient::with_buckets(password_bucket());
        let checker = BreachChecker::with_client(fast_config(Some(&dir)), client);
        let options = CheckOptions::default();

        let first = checker.check_password("password", &options).await;
        assert!(first.checked);
        assert_eq!(first.breached, Some(true));
        assert_eq!(first.count, Some(1));
        assert!(!first.cached);

        let second = checker.check_password("password", &options).await;
        assert!(second.checked);
        assert_eq!(second.breached, Some(true));
        assert!(second.cached);

        // The second call was served from the durable cache.
        assert_eq!(checker.client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unbreached_password() {
        let client = FakeRangeClient::with_buckets(password_bucket());
        let checker = BreachChecker::with_client(fast_config(None), client);

        let result = checker.check_password("Xk9#mQ2!vL7", &CheckOptions::default()).await;
        assert!(result.checked);
        assert_eq!(result.breached, Some(false));
        assert_eq!(result.count, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_exhausts_retry_budget() {
        let client = FakeRangeClient::throttled();
        let checker = BreachChecker::with_client(fast_config(None), client);

        let start = tokio::time::Instant::now();
        let result = checker.check_password("password", &CheckOptions::default()).await;

        assert!(!result.checked);
        assert!(result.offline);
        // Initial attempt plus the full retry budget.
        assert_eq!(checker.client.requests().len(), (MAX_RETRIES + 1) as usize);
        // At least the summed backoff sequence elapsed: 100 + 200 + 400 ms.
        assert!(start.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_timeout_fails_fast_without_retry() {
        let client = FakeRangeClient::timing_out();
        let checker = BreachChecker::with_client(fast_config(None), client);

        let result = checker.check_password("password", &CheckOptions::default()).await;
        assert!(!result.checked);
        assert!(result.offline);
        assert_eq!(checker.client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeRangeClient::with_buckets(password_bucket());
        let checker = BreachChecker::with_client(fast_config(Some(&dir)), client);
        let options = CheckOptions::default();

        checker.check_password("password", &options).await;
        checker.clear_cache();
        checker.clear_cache();

        let result = checker.check_password("password", &options).await;
        assert!(!result.cached);
        assert_eq!(checker.client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_eviction_deletes_durable_row() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeRangeClient::with_buckets(password_bucket());
        let config = CheckerConfig { cache_capacity: 1, ..fast_config(Some(&dir)) };
        let checker = BreachChecker::with_client(config, client);
        let options = CheckOptions::default();

        checker.check_password("password", &options).await;
        // A different prefix evicts 5BAA6 from the volatile tier, which
        // must also delete its durable row.
        checker.check_password("Xk9#mQ2!vL7", &options).await;

        let result = checker.check_password("password", &options).await;
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_only_prefix_reaches_the_network() {
        let password = "hunter2";
        let client = FakeRangeClient::with_buckets(HashMap::new());
        let checker = BreachChecker::with_client(fast_config(None), client);

        checker.check_password(password, &CheckOptions::default()).await;

        let digest = digest_password(password);
        let requests = checker.client.requests();
        assert_eq!(requests.len(), 1);
        for sent in &requests {
            assert_eq!(sent.len(), 5);
            assert_eq!(sent, &digest.prefix);
            assert!(!sent.contains(password));
            assert!(!sent.contains(&digest.suffix));
        }
    }
}
