pub mod midtrans;
pub mod notification;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::error::AppError;

pub use midtrans::MidtransGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway request failed: {0}")]
    Transport(String),

    #[error("Payment gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Amount {0} cannot be charged")]
    InvalidAmount(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::ExternalServiceError(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// Everything the gateway needs to open a hosted payment page for one order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDescriptor {
    pub order_id: String,
    pub gross_amount: i64,
    pub item_id: String,
    pub item_name: String,
    pub item_price: i64,
    pub quantity: i32,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPage {
    pub token: String,
    pub redirect_url: String,
}

/// Gateway-side view of an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub order_id: Option<String>,
    pub transaction_status: Option<String>,
    pub fraud_status: Option<String>,
    pub payment_type: Option<String>,
    pub gross_amount: Option<String>,
    pub transaction_time: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_page(&self, order: &OrderDescriptor) -> Result<PaymentPage, GatewayError>;

    async fn transaction_status(&self, order_id: &str) -> Result<GatewayStatus, GatewayError>;

    /// Validates the signature carried by an inbound notification.
    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature: &str,
    ) -> bool;
}
