use std::sync::Arc;

use crate::auth::cache::PermissionCache;
use crate::auth::identity::IdentityVerifier;
use crate::auth::session::SessionKeys;
use crate::config::Config;
use crate::payment::PaymentGateway;
use crate::store::Store;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub permissions: PermissionCache,
    pub identity: Arc<dyn IdentityVerifier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub sessions: SessionKeys,
    pub config: Arc<Config>,
}
