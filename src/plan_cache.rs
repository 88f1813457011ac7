use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;

use crate::config::CacheConfig;
use crate::error::PlanError;
use crate::query_planner::{QueryPlanner, RequestPlan};

/// Planner outcome as stored in the cache: errors are cached too.
pub type CachedPlan = Result<Arc<RequestPlan>, PlanError>;

#[async_trait]
pub trait RequestCache {
    async fn get_plan(&self, key: &str) -> Option<CachedPlan>;

    /// Upserts a plan outcome. A racing insert for the same key overwrites.
    async fn set_plan(&self, key: String, plan: CachedPlan);
}

#[derive(Clone)]
struct CacheEntry {
    outcome: CachedPlan,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache with a per-entry lifetime: plans keep `plan_ttl`, other
/// entries fall back to the shorter `default_ttl`.
pub struct MokaRequestCache {
    inner: Cache<String, CacheEntry>,
    default_ttl: Duration,
    plan_ttl: Duration,
}

impl MokaRequestCache {
    pub fn new(config: &CacheConfig) -> Self {
        MokaRequestCache {
            inner: Cache::builder()
                .max_capacity(config.max_entries)
                .expire_after(EntryExpiry)
                .build(),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            plan_ttl: Duration::from_secs(config.plan_ttl_secs),
        }
    }

    /// Stores an outcome under the default eviction window.
    pub fn insert(&self, key: String, outcome: CachedPlan) {
        self.insert_with_ttl(key, outcome, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: String, outcome: CachedPlan, ttl: Duration) {
        self.inner.insert(key, CacheEntry { outcome, ttl });
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

#[async_trait]
impl RequestCache for MokaRequestCache {
    async fn get_plan(&self, key: &str) -> Option<CachedPlan> {
        self.inner.get(key).map(|entry| entry.outcome)
    }

    async fn set_plan(&self, key: String, plan: CachedPlan) {
        self.insert_with_ttl(key, plan, self.plan_ttl);
    }
}

/// Memoizes planner output keyed by request text and operation name.
pub struct PlanCache {
    cache: Option<Box<dyn RequestCache + Send + Sync>>,
    planner: Box<dyn QueryPlanner + Send + Sync>,
}

impl PlanCache {
    pub fn new(
        cache: Option<Box<dyn RequestCache + Send + Sync>>,
        planner: Box<dyn QueryPlanner + Send + Sync>,
    ) -> Self {
        PlanCache { cache, planner }
    }

    pub fn from_config(config: &CacheConfig, planner: Box<dyn QueryPlanner + Send + Sync>) -> Self {
        let cache = config
            .enabled
            .then(|| Box::new(MokaRequestCache::new(config)) as Box<dyn RequestCache + Send + Sync>);
        PlanCache::new(cache, planner)
    }

    /// Returns the cached outcome for `query`, planning it on a miss. Entries
    /// built against another registry version are rebuilt and overwritten.
    pub async fn get_or_build(&self, query: &str, operation_name: Option<&str>) -> CachedPlan {
        let Some(cache) = &self.cache else {
            return self.build(query, operation_name).await;
        };
        let key = match operation_name {
            Some(name) => format!("{query}\0{name}"),
            None => query.to_string(),
        };
        let current = self.planner.schema_version();
        match cache.get_plan(&key).await {
            Some(Ok(plan)) if plan.schema_version == current => {
                tracing::trace!("plan cache hit");
                return Ok(plan);
            }
            Some(Err(err)) => {
                tracing::trace!("plan cache hit (error)");
                return Err(err);
            }
            Some(Ok(plan)) => {
                tracing::debug!(
                    cached = plan.schema_version,
                    current,
                    "discarding plan built for an older schema"
                );
            }
            None => tracing::trace!("plan cache miss"),
        }
        let outcome = self.build(query, operation_name).await;
        cache.set_plan(key, outcome.clone()).await;
        outcome
    }

    async fn build(&self, query: &str, operation_name: Option<&str>) -> CachedPlan {
        self.planner
            .plan_query(query, operation_name)
            .await
            .map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::PlanCost;
    use crate::types::OperationMode;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct CountingPlanner {
        calls: Arc<AtomicUsize>,
        version: Arc<AtomicU64>,
    }

    #[async_trait]
    impl QueryPlanner for CountingPlanner {
        async fn plan_query(
            &self,
            query: &str,
            _operation_name: Option<&str>,
        ) -> Result<RequestPlan, PlanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.starts_with('!') {
                return Err(PlanError::NoOperation);
            }
            Ok(RequestPlan {
                mode: OperationMode::Query,
                operation_name: None,
                variables: Vec::new(),
                selection_set: Vec::new(),
                cost: PlanCost::default(),
                schema_version: self.schema_version(),
            })
        }

        fn schema_version(&self) -> u64 {
            self.version.load(Ordering::SeqCst)
        }
    }

    fn cache() -> (PlanCache, Arc<AtomicUsize>, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let version = Arc::new(AtomicU64::new(1));
        let planner = CountingPlanner {
            calls: calls.clone(),
            version: version.clone(),
        };
        (
            PlanCache::from_config(&CacheConfig::default(), Box::new(planner)),
            calls,
            version,
        )
    }

    #[tokio::test]
    async fn repeated_text_plans_once() {
        let (cache, calls, _) = cache();
        for _ in 0..3 {
            cache.get_or_build("{ a }", None).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.get_or_build("{ a }", Some("Named")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_cached() {
        let (cache, calls, _) = cache();
        assert_eq!(cache.get_or_build("!", None).await, Err(PlanError::NoOperation));
        assert_eq!(cache.get_or_build("!", None).await, Err(PlanError::NoOperation));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_plans_are_rebuilt() {
        let (cache, calls, version) = cache();
        cache.get_or_build("{ a }", None).await.unwrap();
        version.store(2, Ordering::SeqCst);
        let plan = cache.get_or_build("{ a }", None).await.unwrap();
        assert_eq!(plan.schema_version, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_plans() {
        let calls = Arc::new(AtomicUsize::new(0));
        let planner = CountingPlanner {
            calls: calls.clone(),
            version: Arc::new(AtomicU64::new(1)),
        };
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = PlanCache::from_config(&config, Box::new(planner));
        cache.get_or_build("{ a }", None).await.unwrap();
        cache.get_or_build("{ a }", None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn upserts_overwrite_silently() {
        let cache = MokaRequestCache::new(&CacheConfig::default());
        cache.set_plan("k".into(), Err(PlanError::NoOperation)).await;
        cache
            .set_plan("k".into(), Err(PlanError::OperationNameRequired))
            .await;
        assert_eq!(
            cache.get_plan("k").await,
            Some(Err(PlanError::OperationNameRequired))
        );
        assert_eq!(cache.entry_count(), 1);
    }
}
