use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::connectors::apple_common::ExecutionResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ExecutionResult,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

/// Entity groups whose cached reads a write can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    Todos,
    Projects,
    Tags,
}

impl InvalidationScope {
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            InvalidationScope::Todos => &["todos_", "list_", "search_", "tagged_"],
            InvalidationScope::Projects => &["projects_", "todos_", "list_", "search_", "tagged_"],
            InvalidationScope::Tags => &["tags_", "tagged_"],
        }
    }
}

/// TTL cache for successful read results. Clones share storage, so one
/// instance built at startup serves every caller.
#[derive(Debug, Clone)]
pub struct ResultCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    max_size: usize,
}

impl ResultCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_size: max_size.max(1),
        }
    }

    /// Returns `None` for unknown or expired keys; expired entries are
    /// removed on the way out.
    pub async fn get(&self, key: &str) -> Option<ExecutionResult> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(target: "things::cache", key, "evicted stale entry");
                None
            }
            None => None,
        }
    }

    /// Stores `value` for `ttl`. Failed results are refused and `false` is
    /// returned.
    pub async fn set(&self, key: &str, value: ExecutionResult, ttl: Duration) -> bool {
        if !value.success {
            return false;
        }

        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if !entries.contains_key(key) && entries.len() >= self.max_size {
            entries.retain(|_, entry| entry.is_fresh(now));
            if entries.len() >= self.max_size {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                ttl,
            },
        );
        true
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Drop every key starting with one of the scope's prefixes.
    pub async fn invalidate(&self, scope: InvalidationScope) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !scope.prefixes().iter().any(|p| key.starts_with(p)));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(target: "things::cache", ?scope, removed, "invalidated");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::apple_common::{ExecutionMethod, FailureKind};

    fn ok(output: &str) -> ExecutionResult {
        ExecutionResult::succeeded(output.to_string(), 0.01, ExecutionMethod::AppleScript)
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = ResultCache::new(10);
        let ttl = Duration::from_secs(5);
        cache.set("projects_all", ok("P"), ttl).await;

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(cache.get("projects_all").await.unwrap().output_text(), "P");

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(cache.get("projects_all").await.is_none());
        // lazily removed
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = ResultCache::new(10);
        let failed = ExecutionResult::failed(
            "boom",
            FailureKind::NonZeroExit,
            0.1,
            ExecutionMethod::AppleScript,
        );
        assert!(!cache.set("todos_all", failed, Duration::from_secs(60)).await);
        assert!(cache.get("todos_all").await.is_none());
    }

    #[tokio::test]
    async fn invalidation_is_scoped() {
        let cache = ResultCache::new(10);
        let ttl = Duration::from_secs(60);
        cache.set("todos_all", ok("t"), ttl).await;
        cache.set("list_today_50", ok("l"), ttl).await;
        cache.set("tags_all", ok("g"), ttl).await;
        cache.set("areas_all", ok("a"), ttl).await;

        assert_eq!(cache.invalidate(InvalidationScope::Tags).await, 1);
        assert!(cache.get("tags_all").await.is_none());
        assert!(cache.get("todos_all").await.is_some());

        assert_eq!(cache.invalidate(InvalidationScope::Todos).await, 2);
        assert!(cache.get("areas_all").await.is_some());

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_oldest() {
        let cache = ResultCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a", ok("1"), ttl).await;
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("b", ok("2"), ttl).await;
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("c", ok("3"), ttl).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let cache = ResultCache::new(10);
        let other = cache.clone();
        cache.set("areas_all", ok("a"), Duration::from_secs(60)).await;
        assert!(other.get("areas_all").await.is_some());
    }
}
