use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::payment::notification::signature_matches;
use crate::payment::{GatewayError, GatewayStatus, OrderDescriptor, PaymentGateway, PaymentPage};

const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com/snap/v1/transactions";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com/snap/v1/transactions";
const SANDBOX_API_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_API_URL: &str = "https://api.midtrans.com";

/// Snap and Core API client authenticated with the merchant server key.
pub struct MidtransGateway {
    http: reqwest::Client,
    server_key: String,
    snap_url: &'static str,
    api_url: &'static str,
    finish_url: String,
}

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
    item_details: [ItemDetails<'a>; 1],
    callbacks: Callbacks<'a>,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
}

#[derive(Serialize)]
struct ItemDetails<'a> {
    id: &'a str,
    price: i64,
    quantity: i32,
    name: &'a str,
}

#[derive(Serialize)]
struct Callbacks<'a> {
    finish: &'a str,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

impl MidtransGateway {
    pub fn new(server_key: impl Into<String>, is_production: bool, finish_url: impl Into<String>) -> Self {
        let (snap_url, api_url) = if is_production {
            (PRODUCTION_SNAP_URL, PRODUCTION_API_URL)
        } else {
            (SANDBOX_SNAP_URL, SANDBOX_API_URL)
        };
        Self {
            http: reqwest::Client::new(),
            server_key: server_key.into(),
            snap_url,
            api_url,
            finish_url: finish_url.into(),
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %body, "Midtrans rejected request");
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_payment_page(&self, order: &OrderDescriptor) -> Result<PaymentPage, GatewayError> {
        let request = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &order.order_id,
                gross_amount: order.gross_amount,
            },
            customer_details: CustomerDetails {
                first_name: &order.customer_name,
                email: &order.customer_email,
                phone: order.customer_phone.as_deref().unwrap_or(""),
            },
            item_details: [ItemDetails {
                id: &order.item_id,
                price: order.item_price,
                quantity: order.quantity,
                name: &order.item_name,
            }],
            callbacks: Callbacks {
                finish: &self.finish_url,
            },
        };

        debug!(order_id = %order.order_id, amount = order.gross_amount, "Requesting Snap token");
        let response = self
            .http
            .post(self.snap_url)
            .basic_auth(&self.server_key, Some(""))
            .json(&request)
            .send()
            .await?;
        let snap: SnapResponse = Self::ensure_success(response).await?.json().await?;

        Ok(PaymentPage {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }

    async fn transaction_status(&self, order_id: &str) -> Result<GatewayStatus, GatewayError> {
        let url = format!("{}/v2/{}/status", self.api_url, order_id);
        let response = self
            .http
            .get(url)
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await?;
        Ok(Self::ensure_success(response).await?.json().await?)
    }

    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature: &str,
    ) -> bool {
        signature_matches(order_id, status_code, gross_amount, &self.server_key, signature)
    }
}
