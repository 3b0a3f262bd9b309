use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::playbook::catalogue::Catalogue;
use crate::playbook::PlaybookVersion;
use crate::types::DbId;

/// Process-wide cache of validated catalogues keyed by `(tenant, version)`.
///
/// Versions are immutable, so an entry never needs invalidation. Publishing
/// creates a new version id and therefore a new entry.
#[derive(Default)]
pub struct CatalogueCache {
    entries: RwLock<HashMap<(DbId, DbId), Arc<Catalogue>>>,
}

impl CatalogueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, tenant_id: DbId, version_id: DbId) -> Option<Arc<Catalogue>> {
        self.entries.read().await.get(&(tenant_id, version_id)).cloned()
    }

    /// Return the cached catalogue or load it with `fetch`.
    ///
    /// A version that fails validation is not cached; the error is returned
    /// to every caller until the row is fixed.
    pub async fn get_or_load<F, Fut>(
        &self,
        tenant_id: DbId,
        version_id: DbId,
        fetch: F,
    ) -> Result<Arc<Catalogue>, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<PlaybookVersion>, CoreError>>,
    {
        if let Some(hit) = self.get(tenant_id, version_id).await {
            return Ok(hit);
        }

        let row = fetch()
            .await?
            .ok_or_else(|| CoreError::not_found("playbook_version", version_id))?;
        let catalogue = match Catalogue::load(row.id, row.raw_json.as_bytes()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    version_id = %version_id,
                    error = %e,
                    "Persisted playbook version failed validation",
                );
                return Err(e);
            }
        };

        let mut entries = self.entries.write().await;
        let entry = entries
            .entry((tenant_id, version_id))
            .or_insert_with(|| Arc::clone(&catalogue));
        tracing::debug!(tenant_id = %tenant_id, version_id = %version_id, "Catalogue cached");
        Ok(Arc::clone(entry))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{new_id, now};

    fn version(tenant_id: DbId, raw: &str) -> PlaybookVersion {
        PlaybookVersion {
            id: new_id(),
            tenant_id,
            version: "v1".into(),
            checksum: crate::playbook::checksum(raw.as_bytes()),
            raw_json: raw.into(),
            created_at: now(),
        }
    }

    const VALID: &str = r#"{"playbook_id":"pb","version":"v1","worlds":[{"id":"w","nodes":[
        {"id":"A","type":"info","title":{"en":"A"}}]}]}"#;

    #[tokio::test]
    async fn loads_once_and_shares() {
        let cache = CatalogueCache::new();
        let tenant = new_id();
        let v = version(tenant, VALID);
        let id = v.id;

        let first = cache
            .get_or_load(tenant, id, || async { Ok(Some(v.clone())) })
            .await
            .unwrap();
        let second = cache
            .get_or_load(tenant, id, || async {
                Err(CoreError::Storage("cache miss on second load".into()))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn invalid_version_is_not_cached() {
        let cache = CatalogueCache::new();
        let tenant = new_id();
        let v = version(tenant, r#"{"playbook_id":"pb","version":"v1","worlds":[]"#);
        let id = v.id;
        let result = cache
            .get_or_load(tenant, id, || async { Ok(Some(v)) })
            .await;
        assert!(matches!(result, Err(CoreError::BadCatalogue(_))));
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn missing_version_is_not_found() {
        let cache = CatalogueCache::new();
        let result = cache
            .get_or_load(new_id(), new_id(), || async { Ok(None) })
            .await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }
}
