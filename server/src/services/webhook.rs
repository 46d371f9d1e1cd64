use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::models::transaction::TransactionStatus;
use crate::payment::notification::MidtransNotification;
use crate::payment::GatewayStatus;
use crate::services::transactions::show_by_order;
use crate::state::AppState;
use crate::store::{StatusChange, StatusChangeOutcome};
use crate::utils::error::AppError;

#[derive(Debug, Serialize)]
pub struct NotificationAck {
    pub order_id: String,
    pub status: TransactionStatus,
    pub applied: bool,
    pub tickets_issued: usize,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusReport {
    pub order_id: String,
    pub local_status: TransactionStatus,
    pub gateway: GatewayStatus,
}

/// Applies one gateway notification. Redelivery of a notification that was
/// already applied is acknowledged without touching the transaction.
pub async fn handle_notification(
    state: &AppState,
    notification: MidtransNotification,
) -> Result<NotificationAck, AppError> {
    let signed = state.payments.verify_signature(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        &notification.signature_key,
    );
    if !signed {
        warn!(order_id = %notification.order_id, "Payment notification with invalid signature");
        return Err(AppError::AuthError("Invalid notification signature".to_string()));
    }

    info!(
        order_id = %notification.order_id,
        transaction_status = %notification.transaction_status,
        fraud_status = ?notification.fraud_status,
        payment_type = ?notification.payment_type,
        "Payment notification received"
    );

    let Some(target) = notification.outcome().target_status() else {
        let transaction = state
            .store
            .find_transaction_by_order(&notification.order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction {} not found", notification.order_id))
            })?;
        return Ok(NotificationAck {
            order_id: transaction.order_id,
            status: transaction.status,
            applied: false,
            tickets_issued: 0,
        });
    };

    let outcome = state
        .store
        .change_status(StatusChange {
            order_id: notification.order_id.clone(),
            target,
            gateway_status: Some(notification.transaction_status.clone()),
            payment_type: notification.payment_type.clone(),
            transaction_time: notification.transaction_time_utc(),
            now: Utc::now(),
        })
        .await?;

    let ack = match outcome {
        StatusChangeOutcome::Applied {
            transaction,
            tickets,
        } => {
            info!(
                order_id = %transaction.order_id,
                status = %transaction.status,
                tickets = tickets.len(),
                "Payment notification applied"
            );
            NotificationAck {
                order_id: transaction.order_id,
                status: transaction.status,
                applied: true,
                tickets_issued: tickets.len(),
            }
        }
        StatusChangeOutcome::Duplicate(transaction) => {
            info!(order_id = %transaction.order_id, "Duplicate payment notification ignored");
            NotificationAck {
                order_id: transaction.order_id,
                status: transaction.status,
                applied: false,
                tickets_issued: 0,
            }
        }
        StatusChangeOutcome::Stale(transaction) => {
            warn!(
                order_id = %transaction.order_id,
                status = %transaction.status,
                requested = %target,
                "Late payment notification for a closed transaction"
            );
            NotificationAck {
                order_id: transaction.order_id,
                status: transaction.status,
                applied: false,
                tickets_issued: 0,
            }
        }
    };
    Ok(ack)
}

pub async fn payment_status(
    state: &AppState,
    user: &AuthUser,
    order_id: &str,
) -> Result<PaymentStatusReport, AppError> {
    let local = show_by_order(state, user, order_id).await?;
    let gateway = state.payments.transaction_status(order_id).await?;
    Ok(PaymentStatusReport {
        order_id: local.transaction.order_id,
        local_status: local.transaction.status,
        gateway,
    })
}
