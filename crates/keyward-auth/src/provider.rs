//! The public key provider.
//!
//! [`KeyProvider`] combines the snapshot cache with its refresh scheduler. It
//! is constructed once per authentication domain and shared by reference
//! (typically `Arc<KeyProvider>`) with every token validator that needs it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{ProviderConfig, RefreshPolicy};
use crate::error::{AuthError, Result};
use crate::fetch::{HttpKeySetFetcher, KeySetSource};
use crate::materialize::VerificationKey;
use crate::refresh::{NoopObserver, RefreshObserver, RefreshScheduler, RefreshTrigger};

/// Builder for a [`KeyProvider`] with an explicit key source.
pub struct KeyProviderBuilder {
    source: Arc<dyn KeySetSource>,
    policy: RefreshPolicy,
    observer: Arc<dyn RefreshObserver>,
}

impl KeyProviderBuilder {
    /// Start building a provider that reads keys from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self {
            source,
            policy: RefreshPolicy::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Use `policy` for refresh cadence.
    #[must_use]
    pub const fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Report refresh outcomes to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Load the key set once and start the background refresh task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial load (usually `AuthError::FetchFailed`);
    /// no provider is created without a first snapshot.
    pub async fn start(self) -> Result<KeyProvider> {
        let scheduler = Arc::new(RefreshScheduler::new(
            self.source,
            self.policy,
            self.observer,
        ));

        if let Err(err) = scheduler.run_cycle(RefreshTrigger::Initial).await {
            tracing::error!(
                source = %scheduler.source_description(),
                error = %err,
                "Initial key set load failed"
            );
            return Err(err);
        }

        let task = tokio::spawn(Arc::clone(&scheduler).run());
        Ok(KeyProvider {
            scheduler,
            task: Some(task),
        })
    }
}

/// Operator-facing summary of a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Where keys are fetched from.
    pub source: String,
    /// Generation of the current snapshot.
    pub generation: u64,
    /// Key IDs in the current snapshot, sorted.
    pub key_ids: Vec<String>,
    /// When the current snapshot was fetched.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Seconds since the current snapshot was fetched.
    pub age_seconds: u64,
    /// Seconds until the next scheduled refresh.
    pub next_refresh_in_seconds: u64,
    /// Refresh failures since the last success.
    pub consecutive_failures: u32,
    /// Whether a refresh cycle is running right now.
    pub refresh_in_flight: bool,
}

/// Rotating verification key provider.
pub struct KeyProvider {
    scheduler: Arc<RefreshScheduler>,
    task: Option<JoinHandle<()>>,
}

impl KeyProvider {
    /// Create a provider from configuration, fetching over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` for invalid configuration and the initial
    /// load error (usually `AuthError::FetchFailed`) if the first key set
    /// cannot be loaded.
    pub async fn new(config: &ProviderConfig) -> Result<Self> {
        let (source, policy) = config.validate()?;
        let fetcher = HttpKeySetFetcher::new(source, policy.fetch_timeout)?;
        Self::builder(Arc::new(fetcher))
            .with_policy(policy)
            .start()
            .await
    }

    /// Build a provider around a custom key source.
    #[must_use]
    pub fn builder(source: Arc<dyn KeySetSource>) -> KeyProviderBuilder {
        KeyProviderBuilder::new(source)
    }

    /// Get the verification key for `kid`.
    ///
    /// Never waits on the network. On a miss an early refresh is requested
    /// (subject to the minimum interval) and `KeyNotFound` is returned at once.
    ///
    /// # Errors
    ///
    /// - `AuthError::KeyNotFound` if `kid` is not in the current snapshot.
    /// - `AuthError::StaleKeySet` if a staleness ceiling is configured and exceeded.
    /// - `AuthError::ShutDown` after [`shutdown`](Self::shutdown).
    pub fn get_key(&self, kid: &str) -> Result<Arc<VerificationKey>> {
        if self.scheduler.is_shut_down() {
            return Err(AuthError::ShutDown);
        }

        let snapshot = self
            .scheduler
            .cache()
            .snapshot()
            .ok_or_else(|| AuthError::Internal("key cache is empty".to_string()))?;

        if let Some(ceiling) = self.scheduler.policy().max_staleness {
            let age = snapshot.fetched_at().elapsed();
            if age > ceiling {
                tracing::warn!(
                    age_secs = age.as_secs(),
                    max_staleness_secs = ceiling.as_secs(),
                    "Refusing to serve stale key set"
                );
                self.scheduler.request_refresh();
                return Err(AuthError::StaleKeySet {
                    age_seconds: age.as_secs(),
                });
            }
        }

        if let Some(key) = snapshot.get(kid) {
            return Ok(key);
        }

        let scheduled = self.scheduler.request_refresh();
        tracing::debug!(kid = %kid, refresh_scheduled = scheduled, "Key not found in key set");
        Err(AuthError::KeyNotFound(kid.to_string()))
    }

    /// Ask for an early refresh, rate-limited by the minimum interval.
    ///
    /// Returns whether a refresh was scheduled.
    pub fn request_refresh(&self) -> bool {
        self.scheduler.request_refresh()
    }

    /// Refresh now, bypassing the rate limit.
    ///
    /// Waits for any cycle already running, then runs a new one. Returns the
    /// number of keys installed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FetchFailed` if the refresh fails (the previous
    /// snapshot stays in place) or `AuthError::ShutDown` after shutdown.
    pub async fn refresh_now(&self) -> Result<usize> {
        self.scheduler.run_cycle(RefreshTrigger::Forced).await
    }

    /// Key IDs in the current snapshot, sorted.
    #[must_use]
    pub fn key_ids(&self) -> Vec<String> {
        self.scheduler
            .cache()
            .snapshot()
            .map(|snapshot| snapshot.key_ids())
            .unwrap_or_default()
    }

    /// Current provider status.
    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        let stats = self.scheduler.stats();
        let snapshot = self.scheduler.cache().snapshot();
        let now = Instant::now();

        ProviderStatus {
            source: self.scheduler.source_description(),
            generation: snapshot.as_ref().map_or(0, |s| s.generation()),
            key_ids: snapshot.as_ref().map(|s| s.key_ids()).unwrap_or_default(),
            last_refresh: snapshot.as_ref().map(|s| s.fetched_at_utc()),
            age_seconds: snapshot
                .as_ref()
                .map_or(Duration::ZERO, |s| now.duration_since(s.fetched_at()))
                .as_secs(),
            next_refresh_in_seconds: stats.next_refresh_at.saturating_duration_since(now).as_secs(),
            consecutive_failures: stats.consecutive_failures,
            refresh_in_flight: stats.in_flight,
        }
    }

    /// Stop the background refresh task.
    ///
    /// A cycle already running is allowed to finish; its result is discarded.
    /// Lookups fail with `AuthError::ShutDown` afterwards.
    pub fn shutdown(&self) {
        if !self.scheduler.is_shut_down() {
            tracing::info!(source = %self.scheduler.source_description(), "Shutting down key provider");
        }
        self.scheduler.shutdown();
    }

    /// Shut down and wait for the background task to exit.
    pub async fn close(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Key refresh task ended abnormally");
            }
        }
    }
}

impl Drop for KeyProvider {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rsa_document, ScriptedSource};

    async fn provider(source: Arc<ScriptedSource>, policy: RefreshPolicy) -> KeyProvider {
        KeyProvider::builder(source)
            .with_policy(policy)
            .start()
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn get_key_hit_and_miss() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(rsa_document(&["a"]))]));
        let provider = provider(Arc::clone(&source), RefreshPolicy::default()).await;

        assert!(provider.get_key("a").is_ok());
        let err = provider.get_key("missing").unwrap_err();
        assert!(matches!(err, AuthError::KeyNotFound(kid) if kid == "missing"));
        // Miss inside the cooldown does not fetch.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn miss_after_cooldown_picks_up_rotated_key() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(rsa_document(&["old"])),
            Ok(rsa_document(&["old", "new"])),
        ]));
        let provider = provider(Arc::clone(&source), RefreshPolicy::default()).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(matches!(provider.get_key("new"), Err(AuthError::KeyNotFound(_))));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(source.calls(), 2);
        assert!(provider.get_key("new").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_misses_fetch_at_most_once_per_cooldown() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(rsa_document(&["a"]))]));
        let provider = provider(Arc::clone(&source), RefreshPolicy::default()).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        for i in 0..100 {
            let _ = provider.get_key(&format!("bogus-{i}"));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn construction_fails_closed() {
        let source = Arc::new(ScriptedSource::new(vec![Err(AuthError::FetchFailed(
            "connection refused".into(),
        ))]));
        let result = KeyProvider::builder(source).start().await;
        assert!(matches!(result, Err(AuthError::FetchFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_bypasses_cooldown() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(rsa_document(&["a"])),
            Ok(rsa_document(&["b", "c"])),
        ]));
        let provider = provider(Arc::clone(&source), RefreshPolicy::default()).await;

        assert_eq!(provider.refresh_now().await.unwrap(), 2);
        assert_eq!(source.calls(), 2);
        assert_eq!(provider.key_ids(), vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_failure_keeps_keys() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(rsa_document(&["a"])),
            Err(AuthError::FetchFailed("500".into())),
        ]));
        let provider = provider(Arc::clone(&source), RefreshPolicy::default()).await;

        let before = provider.get_key("a").unwrap();
        assert!(matches!(provider.refresh_now().await, Err(AuthError::FetchFailed(_))));
        let after = provider.get_key("a").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(provider.status().consecutive_failures, 1);
        assert_eq!(provider.status().next_refresh_in_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_refused_past_ceiling() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(rsa_document(&["a"]))]));
        let mut policy = RefreshPolicy::default();
        policy.refresh_interval = Duration::from_secs(10 * 3600);
        policy.max_staleness = Some(Duration::from_secs(2 * 3600));
        let provider = provider(Arc::clone(&source), policy).await;

        tokio::time::sleep(Duration::from_secs(3600 + 60)).await;
        assert!(provider.get_key("a").is_ok());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(matches!(
            provider.get_key("a"),
            Err(AuthError::StaleKeySet { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(rsa_document(&["k2", "k1"]))]));
        let provider = provider(source, RefreshPolicy::default()).await;
        tokio::time::sleep(Duration::from_secs(100)).await;

        let status = provider.status();
        assert_eq!(status.source, "scripted");
        assert_eq!(status.generation, 1);
        assert_eq!(status.key_ids, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(status.age_seconds, 100);
        assert_eq!(status.next_refresh_in_seconds, 3500);
        assert_eq!(status.consecutive_failures, 0);
        assert!(!status.refresh_in_flight);
        assert!(status.last_refresh.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn builder_wires_observer() {
        use std::sync::atomic::{AtomicU64, Ordering};

        #[derive(Default)]
        struct LastGeneration(AtomicU64);

        impl RefreshObserver for LastGeneration {
            fn on_refresh_success(&self, generation: u64, _key_count: usize) {
                self.0.store(generation, Ordering::SeqCst);
            }
        }

        let observer = Arc::new(LastGeneration::default());
        let source = Arc::new(ScriptedSource::new(vec![Ok(rsa_document(&["a"]))]));
        let provider = KeyProvider::builder(source)
            .with_observer(Arc::clone(&observer) as Arc<dyn RefreshObserver>)
            .start()
            .await
            .unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);

        provider.refresh_now().await.unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_lookups_and_refreshes() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(rsa_document(&["a"]))]));
        let provider = provider(Arc::clone(&source), RefreshPolicy::default()).await;

        provider.shutdown();
        assert!(matches!(provider.get_key("a"), Err(AuthError::ShutDown)));
        assert!(!provider.request_refresh());
        assert!(matches!(provider.refresh_now().await, Err(AuthError::ShutDown)));

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(source.calls(), 1);
        provider.close().await;
    }
}
