use std::sync::Arc;

use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use super::GetOptions;
use super::LegacyKeysApi;
use crate::scope::read_scope;
use crate::scoped_timer::ScopedTimer;
use crate::store::ensure_key;
use crate::ReadApi;
use crate::StoreResult;

/// Point reads over the legacy keys API
pub struct LegacyReadApi {
    keys: Arc<dyn LegacyKeysApi>,
}

impl LegacyReadApi {
    pub fn new(keys: Arc<dyn LegacyKeysApi>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl ReadApi for LegacyReadApi {
    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>> {
        ensure_key(key)?;
        let _timer = ScopedTimer::new("legacy::get");

        let (scope, _guard) = read_scope();
        match scope.run(self.keys.get(&scope, key, GetOptions::default())).await {
            Ok(response) => Ok(Some(response.node.value)),
            Err(e) if e.is_key_not_found() => {
                trace!(key, "key not found");
                Ok(None)
            }
            Err(e) => {
                debug!(key, error = %e, "legacy read failed");
                Err(e)
            }
        }
    }
}
