#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use tiket_server::auth::cache::PermissionCache;
use tiket_server::auth::identity::{IdentityVerifier, VerifiedIdentity};
use tiket_server::auth::session::SessionKeys;
use tiket_server::auth::{AuthUser, Role};
use tiket_server::config::Config;
use tiket_server::models::event::{Event, NewEvent};
use tiket_server::models::ticket_type::{NewTicketType, TicketType};
use tiket_server::payment::notification::{compute_signature, signature_matches, MidtransNotification};
use tiket_server::payment::{GatewayError, GatewayStatus, OrderDescriptor, PaymentGateway, PaymentPage};
use tiket_server::state::AppState;
use tiket_server::models::user::{NewUser, UserStatus};
use tiket_server::store::{MemoryStore, Store};

pub const SERVER_KEY: &str = "SB-Mid-server-test-key";

/// Accepts tokens shaped `valid:<uid>:<email>`.
pub struct StubIdentity;

#[async_trait]
impl IdentityVerifier for StubIdentity {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, tiket_server::utils::error::AppError> {
        let mut parts = id_token.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("valid"), Some(uid), Some(email)) => Ok(VerifiedIdentity {
                uid: uid.to_string(),
                email: email.to_string(),
                name: None,
                photo: None,
            }),
            _ => Err(tiket_server::utils::error::AppError::AuthError(
                "Invalid Firebase token".to_string(),
            )),
        }
    }
}

#[derive(Default)]
pub struct StubGateway {
    pub pages_opened: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment_page(&self, order: &OrderDescriptor) -> Result<PaymentPage, GatewayError> {
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentPage {
            token: format!("snap-{}", order.order_id),
            redirect_url: format!("https://pay.example.com/{}", order.order_id),
        })
    }

    async fn transaction_status(&self, order_id: &str) -> Result<GatewayStatus, GatewayError> {
        Ok(GatewayStatus {
            order_id: Some(order_id.to_string()),
            transaction_status: Some("pending".to_string()),
            ..Default::default()
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature: &str,
    ) -> bool {
        signature_matches(order_id, status_code, gross_amount, SERVER_KEY, signature)
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_ttl_minutes: 60,
        firebase_project_id: "tiket-test".to_string(),
        midtrans_server_key: SERVER_KEY.to_string(),
        midtrans_is_production: false,
        midtrans_finish_url: "http://localhost:5173/profile".to_string(),
        is_production: false,
        cors_allowed_origins: None,
    }
}

pub fn app_state() -> AppState {
    app_state_with(Arc::new(MemoryStore::new()))
}

pub fn app_state_with(store: Arc<dyn Store>) -> AppState {
    let config = test_config();
    AppState {
        store,
        permissions: PermissionCache::new(),
        identity: Arc::new(StubIdentity),
        payments: Arc::new(StubGateway::default()),
        sessions: SessionKeys::new(&config.jwt_secret, config.jwt_ttl_minutes),
        config: Arc::new(config),
    }
}

/// Creates a user holding `role` and a live session, returned as the extractor would build it.
pub async fn seed_user(state: &AppState, name: &str, role: Role) -> AuthUser {
    let now = Utc::now();
    let user = state
        .store
        .create_user(
            NewUser {
                firebase_uid: format!("uid-{name}"),
                name: name.to_string(),
                email: format!("{name}@example.com"),
                phone: None,
                photo: None,
                status: UserStatus::Active,
            },
            &[role],
            now,
        )
        .await
        .unwrap();
    let session = state.sessions.issue(user.id, now).unwrap();
    state
        .store
        .set_session_token(user.id, Some(&session.token), Some(session.expires_at))
        .await
        .unwrap();
    let user = state.store.find_user(user.id).await.unwrap().unwrap();
    let grants = state
        .permissions
        .grants(state.store.as_ref(), user.id)
        .await
        .unwrap();
    AuthUser {
        user,
        grants,
        token: session.token,
    }
}

/// An ongoing event owned by `owner`.
pub async fn seed_event(state: &AppState, owner: &AuthUser, name: &str, is_paid: bool) -> Event {
    let now = Utc::now();
    state
        .store
        .create_event(
            NewEvent {
                name: name.to_string(),
                description: None,
                venue: "Aula Utama".to_string(),
                start_time: now - Duration::hours(1),
                end_time: now + Duration::days(1),
                is_paid,
                banner: None,
            },
            owner.id(),
            now,
        )
        .await
        .unwrap()
}

pub async fn seed_ticket_type(state: &AppState, event: &Event, price: i64, quota: i32) -> TicketType {
    state
        .store
        .create_ticket_type(
            NewTicketType {
                event_id: event.id,
                name: if price == 0 { "Gratis" } else { "Reguler" }.to_string(),
                price: Decimal::from(price),
                quota,
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

pub fn signed_notification(order_id: &str, transaction_status: &str, gross_amount: &str) -> MidtransNotification {
    let status_code = if transaction_status == "settlement" { "200" } else { "201" };
    MidtransNotification {
        order_id: order_id.to_string(),
        status_code: status_code.to_string(),
        gross_amount: gross_amount.to_string(),
        signature_key: compute_signature(order_id, status_code, gross_amount, SERVER_KEY),
        transaction_status: transaction_status.to_string(),
        fraud_status: None,
        payment_type: Some("bank_transfer".to_string()),
        transaction_time: Some("2025-03-01 10:15:00".to_string()),
    }
}
