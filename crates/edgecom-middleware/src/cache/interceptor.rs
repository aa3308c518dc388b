use super::ResponseCache;
use crate::chain::{Interceptor, Next, RequestContext};
use crate::status::Status;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// 计算缓存键：`<方法名>:<请求的规范化 JSON>`
///
/// 对象字段按键名排序，字段相同的请求得到相同的键。
pub fn cache_key<T: Serialize>(method: &str, req: &T) -> Result<String, serde_json::Error> {
    let value = canonicalize(serde_json::to_value(req)?);
    Ok(format!("{}:{}", method, value))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// 缓存拦截器，仅缓存成功的响应
pub struct CacheInterceptor<Resp> {
    cache: Arc<ResponseCache<Resp>>,
}

impl<Resp: Clone> CacheInterceptor<Resp> {
    pub fn new(cache: Arc<ResponseCache<Resp>>) -> Self {
        Self { cache }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Arc::new(ResponseCache::new(capacity)))
    }

    pub fn cache(&self) -> &Arc<ResponseCache<Resp>> {
        &self.cache
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for CacheInterceptor<Resp>
where
    Req: Serialize + Send + 'static,
    Resp: Clone + Send + Sync + 'static,
{
    async fn intercept(
        &self,
        ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status> {
        let key = match cache_key(&ctx.method, &req) {
            Ok(key) => key,
            Err(e) => {
                warn!(method = %ctx.method, error = %e, "Request not cacheable");
                return next.run(ctx, req).await;
            }
        };

        if let Some(cached) = self.cache.get(&key).await {
            debug!(request_id = ctx.request_id(), method = %ctx.method, "Cache hit");
            return Ok(cached);
        }

        let resp = next.run(ctx, req).await?;
        self.cache.put(key, resp.clone()).await;

        Ok(resp)
    }
}
