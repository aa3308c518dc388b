use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

/// 容量为 0 时使用的默认容量
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// 有界 LRU 响应缓存
///
/// 命中会刷新条目的新近度，超出容量时淘汰最久未使用的条目。
pub struct ResponseCache<V> {
    entries: Mutex<LruCache<String, V>>,
    capacity: usize,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CACHE_CAPACITY
        } else {
            capacity
        };
        let size = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(LruCache::new(size)),
            capacity,
        }
    }

    /// 读取并刷新新近度
    pub async fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().await.get(key).cloned()
    }

    /// 写入，已存在则覆盖
    pub async fn put(&self, key: String, value: V) {
        self.entries.lock().await.put(key, value);
    }

    /// 是否存在（不影响新近度）
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_capacity_uses_default() {
        let cache: ResponseCache<u32> = ResponseCache::new(0);
        assert_eq!(cache.capacity(), DEFAULT_CACHE_CAPACITY);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = ResponseCache::new(2);
        cache.put("a".to_string(), 1).await;
        cache.put("b".to_string(), 2).await;

        // 访问 a 之后 b 成为最久未使用
        assert_eq!(cache.get("a").await, Some(1));
        cache.put("c".to_string(), 3).await;

        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert!(cache.contains("c").await);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = ResponseCache::new(1);
        cache.put("k".to_string(), 1).await;
        cache.put("k".to_string(), 2).await;

        assert_eq!(cache.get("k").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }
}
