use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha512};

use crate::models::transaction::TransactionStatus;

/// Body of the gateway's HTTP notification.
#[derive(Debug, Clone, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub payment_type: Option<String>,
    pub transaction_time: Option<String>,
}

/// Local effect of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Payment captured: confirm the transaction.
    Settle,
    /// Still waiting on the customer; only metadata changes.
    Pending,
    /// Denied, expired or cancelled at the gateway.
    Fail,
    /// Nothing to apply (e.g. a capture still under fraud review).
    Ignore,
}

impl NotificationOutcome {
    pub fn target_status(self) -> Option<TransactionStatus> {
        match self {
            NotificationOutcome::Settle => Some(TransactionStatus::Paid),
            NotificationOutcome::Pending => Some(TransactionStatus::Pending),
            NotificationOutcome::Fail => Some(TransactionStatus::Failed),
            NotificationOutcome::Ignore => None,
        }
    }
}

pub fn classify(transaction_status: &str, fraud_status: Option<&str>) -> NotificationOutcome {
    match transaction_status {
        "capture" if fraud_status == Some("accept") => NotificationOutcome::Settle,
        "settlement" => NotificationOutcome::Settle,
        "pending" => NotificationOutcome::Pending,
        "deny" | "expire" | "cancel" => NotificationOutcome::Fail,
        _ => NotificationOutcome::Ignore,
    }
}

impl MidtransNotification {
    pub fn outcome(&self) -> NotificationOutcome {
        classify(&self.transaction_status, self.fraud_status.as_deref())
    }

    /// Gateway timestamps are `YYYY-MM-DD HH:MM:SS` in Western Indonesia time (UTC+7).
    pub fn transaction_time_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.transaction_time.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
        let offset = chrono::FixedOffset::east_opt(7 * 3600)?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Lowercase hex SHA-512 of `order_id + status_code + gross_amount + server_key`.
pub fn compute_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn signature_matches(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
    signature: &str,
) -> bool {
    let expected = compute_signature(order_id, status_code, gross_amount, server_key);
    let presented = signature.trim().to_ascii_lowercase();
    expected.len() == presented.len()
        && expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
