use std::sync::Arc;

use tonic::async_trait;
use tracing::debug;

use super::ModernKv;
use crate::scope::read_scope;
use crate::scoped_timer::ScopedTimer;
use crate::store::ensure_key;
use crate::ReadApi;
use crate::StoreResult;

/// Point reads over the modern generation
pub struct ModernReadApi {
    kv: Arc<dyn ModernKv>,
}

impl ModernReadApi {
    pub fn new(kv: Arc<dyn ModernKv>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl ReadApi for ModernReadApi {
    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>> {
        ensure_key(key)?;
        let _timer = ScopedTimer::new("modern::get");

        let (scope, _guard) = read_scope();
        let result = scope.run(self.kv.range(&scope, key.as_bytes())).await.inspect_err(|e| {
            debug!(key, error = %e, "modern read failed");
        })?;

        if result.count == 0 {
            return Ok(None);
        }
        Ok(result
            .kvs
            .into_iter()
            .next()
            .map(|kv| String::from_utf8_lossy(&kv.value).into_owned()))
    }
}
