use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::utils::error::AppError;

const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Subject and profile claims of a verified identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub photo: Option<String>,
}

/// Verifies an opaque identity credential issued by the identity provider.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, AppError>;
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Firebase ID token verification against Google's published signing keys.
pub struct FirebaseVerifier {
    project_id: String,
    http: reqwest::Client,
    keys: RwLock<Option<(Instant, Arc<JwkSet>)>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            http: reqwest::Client::new(),
            keys: RwLock::new(None),
        }
    }

    async fn key_set(&self, force_refresh: bool) -> Result<Arc<JwkSet>, AppError> {
        if !force_refresh {
            if let Some((fetched_at, keys)) = self.keys.read().await.as_ref() {
                if fetched_at.elapsed() < JWKS_TTL {
                    return Ok(keys.clone());
                }
            }
        }

        let keys: JwkSet = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AppError::AuthError(format!("Unable to fetch signing keys: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::AuthError(format!("Malformed signing keys: {e}")))?;

        info!(keys = keys.keys.len(), "Refreshed identity provider signing keys");
        let keys = Arc::new(keys);
        *self.keys.write().await = Some((Instant::now(), keys.clone()));
        Ok(keys)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, AppError> {
        let header = decode_header(id_token)
            .map_err(|_| AppError::AuthError("Malformed identity token".to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::AuthError("Identity token has no key id".to_string()))?;

        let mut keys = self.key_set(false).await?;
        if keys.find(&kid).is_none() {
            // Google rotates keys; a miss may mean the cached set is stale.
            keys = self.key_set(true).await?;
        }
        let jwk = keys
            .find(&kid)
            .ok_or_else(|| AppError::AuthError("Unknown identity token key".to_string()))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AppError::AuthError(format!("Unusable signing key: {e}")))?;

        let claims = decode::<FirebaseClaims>(id_token, &key, &self.validation())
            .map_err(|e| {
                warn!(error = %e, "Identity token rejected");
                AppError::AuthError("Invalid identity token".to_string())
            })?
            .claims;

        let email = claims
            .email
            .ok_or_else(|| AppError::AuthError("Identity token carries no email".to_string()))?;

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email,
            name: claims.name,
            photo: claims.picture,
        })
    }
}
