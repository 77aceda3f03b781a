//! LLM 分析结果缓存
//!
//! 键为 (用户输入, 会话上下文) 的 SHA-256；容量满时按插入顺序淘汰最旧项，过期项在读取时删除。
//! 仅缓存通过校验的 LLM 结果，降级结果不入缓存。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::orchestration::context::SessionContext;
use crate::orchestration::types::IntentAnalysisResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 100;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// 缓存键：输入与上下文 JSON 拼接后取 SHA-256 十六进制
pub fn cache_key(user_input: &str, context: &SessionContext) -> String {
    let context_json = serde_json::to_string(context).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(user_input.as_bytes());
    hasher.update([0u8]);
    hasher.update(context_json.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

struct CacheEntry {
    value: IntentAnalysisResult,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl CacheInner {
    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

pub struct AnalysisCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

impl AnalysisCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<IntentAnalysisResult> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<IntentAnalysisResult> {
        let mut inner = self.lock();
        let lookup = inner.entries.get(key).map(|entry| {
            (now.saturating_duration_since(entry.inserted_at) < self.ttl).then(|| entry.value.clone())
        });
        let fresh = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                inner.remove(key);
                None
            }
            None => None,
        };
        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, value: IntentAnalysisResult) {
        self.insert_at(key, value, Instant::now());
    }

    pub(crate) fn insert_at(&self, key: String, value: IntentAnalysisResult, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else {
            while inner.entries.len() >= self.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(intent: &str) -> IntentAnalysisResult {
        let mut result = IntentAnalysisResult::emergency_fallback("test");
        result.primary_intent = intent.to_string();
        result
    }

    #[test]
    fn test_cache_key_depends_on_context() {
        let empty = SessionContext::new();
        let with_email = SessionContext::from_value(serde_json::json!({"current_email_context": {"n": 1}}));
        assert_eq!(cache_key("hi", &empty), cache_key("hi", &empty));
        assert_ne!(cache_key("hi", &empty), cache_key("hi", &with_email));
        assert_ne!(cache_key("hi", &empty), cache_key("hello", &empty));
        assert_eq!(cache_key("hi", &empty).len(), 64);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = AnalysisCache::new(10, Duration::from_secs(60));
        let now = Instant::now();
        cache.insert_at("k".to_string(), sample("a"), now);

        assert!(cache.get_at("k", now + Duration::from_secs(59)).is_some());
        assert!(cache.get_at("k", now + Duration::from_secs(61)).is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = AnalysisCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), sample("a"));
        cache.insert("b".to_string(), sample("b"));
        cache.insert("a".to_string(), sample("a2"));
        cache.insert("c".to_string(), sample("c"));

        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").unwrap().primary_intent, "a2");
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = AnalysisCache::new(0, Duration::from_secs(60));
        cache.insert("a".to_string(), sample("a"));
        assert!(cache.get("a").is_none());
    }
}
