use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// 令牌桶
///
/// 令牌按时间连续补充，上限为桶容量；创建时桶是满的。
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64, // tokens per second
    state: Mutex<TokenState>,
}

struct TokenState {
    current: f64,
    last_refill: Instant,
}

impl TokenState {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.current = (self.current + elapsed.as_secs_f64() * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            refill_rate: refill_rate.max(0.0),
            state: Mutex::new(TokenState {
                current: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 尝试获取指定数量的令牌（非阻塞）
    pub async fn try_acquire(&self, tokens: f64) -> bool {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);

        if state.current >= tokens {
            state.current -= tokens;
            debug!(tokens = tokens, remaining = state.current, "Tokens acquired");
            true
        } else {
            debug!(tokens = tokens, available = state.current, "Insufficient tokens");
            false
        }
    }

    /// 获取当前可用令牌数
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);
        state.current
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_acquire() {
        let bucket = TokenBucket::new(10, 5.0);

        assert!(bucket.try_acquire(5.0).await);
        assert_eq!(bucket.available().await, 5.0);

        assert!(bucket.try_acquire(5.0).await);
        assert_eq!(bucket.available().await, 0.0);

        assert!(!bucket.try_acquire(1.0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refill() {
        let bucket = TokenBucket::new(10, 10.0); // 每秒补充 10 个

        assert!(bucket.try_acquire(10.0).await);
        assert!(!bucket.try_acquire(1.0).await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(bucket.available().await, 5.0);

        // 不超过容量
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(bucket.available().await, 10.0);
    }
}
