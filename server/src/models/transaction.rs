use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::event::Event;
use crate::models::ticket_type::TicketType;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Free,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Free => "free",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }

    /// `paid` and `free` own tickets.
    pub fn is_success(self) -> bool {
        matches!(self, TransactionStatus::Paid | TransactionStatus::Free)
    }

    /// Every transition leaves `pending`; terminal states have no way out.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        self == TransactionStatus::Pending && next != TransactionStatus::Pending
    }

    pub fn transition(self, next: TransactionStatus) -> Result<TransactionStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "paid" => Ok(TransactionStatus::Paid),
            "free" => Ok(TransactionStatus::Free),
            "failed" => Ok(TransactionStatus::Failed),
            "expired" => Ok(TransactionStatus::Expired),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Transaction cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::ValidationError(format!(
            "Only pending transactions can be changed. Current status: {}",
            err.from
        ))
    }
}

/// Reasons a registration or purchase is refused before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("This ticket type requires payment")]
    PaidTicketType,

    #[error("This ticket type is free, use free registration instead")]
    FreeTicketType,

    #[error("This event requires payment")]
    PaidEvent,

    #[error("You are already registered for this event")]
    AlreadyRegistered,

    #[error("Insufficient quota. Remaining: {remaining}")]
    InsufficientQuota { remaining: i32 },

    #[error("This event has already finished")]
    EventFinished,
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::AlreadyRegistered
            | RegistrationError::InsufficientQuota { .. } => AppError::conflict(err.to_string()),
            RegistrationError::PaidTicketType
            | RegistrationError::FreeTicketType
            | RegistrationError::PaidEvent
            | RegistrationError::EventFinished => AppError::ValidationError(err.to_string()),
        }
    }
}

/// Preconditions of the free path, checked inside the registering unit.
pub fn check_free_registration(
    event: &Event,
    ticket_type: &TicketType,
    quantity: i32,
    already_registered: bool,
    now: DateTime<Utc>,
) -> Result<(), RegistrationError> {
    if !ticket_type.is_free() {
        return Err(RegistrationError::PaidTicketType);
    }
    if event.is_paid {
        return Err(RegistrationError::PaidEvent);
    }
    if event.is_finished(now) {
        return Err(RegistrationError::EventFinished);
    }
    if already_registered {
        return Err(RegistrationError::AlreadyRegistered);
    }
    if !ticket_type.is_available(quantity) {
        return Err(RegistrationError::InsufficientQuota {
            remaining: ticket_type.quota,
        });
    }
    Ok(())
}

/// Preconditions of the paid path. Quota is only checked here, not held.
pub fn check_paid_purchase(
    event: &Event,
    ticket_type: &TicketType,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<(), RegistrationError> {
    if ticket_type.is_free() {
        return Err(RegistrationError::FreeTicketType);
    }
    if event.is_finished(now) {
        return Err(RegistrationError::EventFinished);
    }
    if !ticket_type.is_available(quantity) {
        return Err(RegistrationError::InsufficientQuota {
            remaining: ticket_type.quota,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub ticket_type_id: i64,
    pub quantity: i32,
    pub total_price: Decimal,
    pub order_id: String,
    pub status: TransactionStatus,
    pub payment_type: Option<String>,
    pub snap_token: Option<String>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub ticket_type_id: i64,
    pub quantity: i32,
    pub total_price: Decimal,
    pub order_id: String,
    pub status: TransactionStatus,
    pub payment_type: Option<String>,
    pub snap_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Paid,
    Free,
}

impl OrderKind {
    fn prefix(self) -> &'static str {
        match self {
            OrderKind::Paid => "ORD",
            OrderKind::Free => "FREE",
        }
    }
}

/// `ORD-<unix>-<8 upper alnum>` or `FREE-<unix>-<8 upper alnum>`.
pub fn generate_order_id(kind: OrderKind, now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("{}-{}-{}", kind.prefix(), now.timestamp(), suffix)
}
