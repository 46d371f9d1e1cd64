use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::rbac::Grants;
use crate::store::Store;
use crate::utils::error::AppError;

/// Per-user cache of resolved grants. Writers call [`PermissionCache::invalidate`]
/// once their role or permission change has committed.
#[derive(Clone, Default)]
pub struct PermissionCache {
    entries: Arc<RwLock<HashMap<i64, Arc<Grants>>>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grants(&self, store: &dyn Store, user_id: i64) -> Result<Arc<Grants>, AppError> {
        if let Some(grants) = self.entries.read().await.get(&user_id) {
            return Ok(grants.clone());
        }

        let roles = store.user_roles(user_id).await?;
        let direct = store.user_permissions(user_id).await?;
        let grants = Arc::new(Grants::resolve(&roles, &direct));
        debug!(user_id, roles = ?roles, "Resolved permissions");

        self.entries.write().await.insert(user_id, grants.clone());
        Ok(grants)
    }

    pub async fn invalidate(&self, user_id: i64) {
        self.entries.write().await.remove(&user_id);
    }
}
