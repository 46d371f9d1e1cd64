use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{AuthUser, Capability, Role};
use crate::models::ticket::Ticket;
use crate::models::transaction::{
    check_paid_purchase, generate_order_id, NewTransaction, OrderKind, Transaction,
    TransactionStatus, TransitionError,
};
use crate::payment::{GatewayError, OrderDescriptor};
use crate::services::events::{is_owner, require_event, require_ticket_type};
use crate::state::AppState;
use crate::store::{FreeRegistration, StatusChange, StatusChangeOutcome, TransactionFilter};
use crate::utils::error::AppError;
use crate::utils::validation::validate_request;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterFreeRequest {
    pub ticket_type_id: i64,
    /// One registration covers at most five tickets.
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 5, message = "The quantity must be between 1 and 5."))]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseRequest {
    pub ticket_type_id: i64,
    #[validate(range(min = 1, message = "The quantity must be at least 1."))]
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct TransactionWithTickets {
    pub transaction: Transaction,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseCreated {
    pub transaction: Transaction,
    pub snap_token: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub struct RegistrationCheck {
    pub event_id: i64,
    pub can_register: bool,
    pub is_registered: bool,
}

fn whole_amount(amount: Decimal) -> Result<i64, GatewayError> {
    amount
        .round_dp(0)
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidAmount(amount.to_string()))
}

fn applied(
    outcome: StatusChangeOutcome,
    target: TransactionStatus,
) -> Result<TransactionWithTickets, AppError> {
    match outcome {
        StatusChangeOutcome::Applied {
            transaction,
            tickets,
        } => Ok(TransactionWithTickets {
            transaction,
            tickets,
        }),
        StatusChangeOutcome::Duplicate(tx) | StatusChangeOutcome::Stale(tx) => {
            Err(TransitionError {
                from: tx.status,
                to: target,
            }
            .into())
        }
    }
}

pub async fn require_transaction(state: &AppState, id: i64) -> Result<Transaction, AppError> {
    state
        .store
        .find_transaction(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {id} not found")))
}

/// Buyer, admins, holders of `transaksi.view-all` and the event owner may read a transaction.
async fn ensure_can_view(
    state: &AppState,
    user: &AuthUser,
    transaction: &Transaction,
) -> Result<(), AppError> {
    if transaction.user_id == user.id()
        || user.is_admin()
        || user.can(Capability::TransactionViewAll)
    {
        return Ok(());
    }
    let ticket_type = require_ticket_type(state, transaction.ticket_type_id).await?;
    if is_owner(state, ticket_type.event_id, user.id()).await? {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "You do not have access to this transaction".to_string(),
    ))
}

pub async fn register_free(
    state: &AppState,
    user: &AuthUser,
    request: RegisterFreeRequest,
) -> Result<TransactionWithTickets, AppError> {
    user.require(Capability::TransactionCreate)?;
    validate_request(&request)?;

    let now = Utc::now();
    let (transaction, tickets) = state
        .store
        .register_free(FreeRegistration {
            user_id: user.id(),
            ticket_type_id: request.ticket_type_id,
            quantity: request.quantity,
            order_id: generate_order_id(OrderKind::Free, now),
            now,
        })
        .await?;

    info!(
        order_id = %transaction.order_id,
        user_id = user.id(),
        tickets = tickets.len(),
        "Free registration completed"
    );
    Ok(TransactionWithTickets {
        transaction,
        tickets,
    })
}

/// Opens a hosted payment page and records the pending transaction.
/// Tickets and the quota decrement wait for payment confirmation.
pub async fn purchase(
    state: &AppState,
    user: &AuthUser,
    request: PurchaseRequest,
) -> Result<PurchaseCreated, AppError> {
    user.require(Capability::TransactionCreate)?;
    validate_request(&request)?;

    let now = Utc::now();
    let ticket_type = require_ticket_type(state, request.ticket_type_id).await?;
    let event = require_event(state, ticket_type.event_id).await?;
    check_paid_purchase(&event, &ticket_type, request.quantity, now)?;

    let order_id = generate_order_id(OrderKind::Paid, now);
    let total_price = ticket_type.checked_total(request.quantity)?;
    let descriptor = OrderDescriptor {
        order_id: order_id.clone(),
        gross_amount: whole_amount(total_price)?,
        item_id: ticket_type.id.to_string(),
        item_name: format!("{} - {}", ticket_type.name, event.name),
        item_price: whole_amount(ticket_type.price)?,
        quantity: request.quantity,
        customer_name: user.user.name.clone(),
        customer_email: user.user.email.clone(),
        customer_phone: user.user.phone.clone(),
    };
    let page = state.payments.create_payment_page(&descriptor).await?;

    let transaction = state
        .store
        .create_pending(
            NewTransaction {
                user_id: user.id(),
                ticket_type_id: ticket_type.id,
                quantity: request.quantity,
                total_price,
                order_id,
                status: TransactionStatus::Pending,
                payment_type: None,
                snap_token: Some(page.token.clone()),
            },
            now,
        )
        .await?;

    info!(order_id = %transaction.order_id, user_id = user.id(), total = %total_price, "Pending purchase created");
    Ok(PurchaseCreated {
        transaction,
        snap_token: page.token,
        redirect_url: page.redirect_url,
    })
}

pub async fn list(
    state: &AppState,
    user: &AuthUser,
    status: Option<&str>,
) -> Result<Vec<Transaction>, AppError> {
    user.require(Capability::TransactionView)?;
    let status = status
        .map(|s| s.parse::<TransactionStatus>())
        .transpose()
        .map_err(AppError::ValidationError)?;

    let mut filter = TransactionFilter {
        status,
        ..Default::default()
    };
    if user.is_admin() || user.can(Capability::TransactionViewAll) {
        // unrestricted
    } else if user.has_role(Role::Eo) {
        filter.event_owner_id = Some(user.id());
    } else {
        filter.user_id = Some(user.id());
    }
    state.store.list_transactions(filter).await
}

pub async fn show(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> Result<TransactionWithTickets, AppError> {
    let transaction = require_transaction(state, id).await?;
    ensure_can_view(state, user, &transaction).await?;
    let tickets = state.store.tickets_for_transaction(transaction.id).await?;
    Ok(TransactionWithTickets {
        transaction,
        tickets,
    })
}

pub async fn show_by_order(
    state: &AppState,
    user: &AuthUser,
    order_id: &str,
) -> Result<TransactionWithTickets, AppError> {
    let transaction = state
        .store
        .find_transaction_by_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {order_id} not found")))?;
    ensure_can_view(state, user, &transaction).await?;
    let tickets = state.store.tickets_for_transaction(transaction.id).await?;
    Ok(TransactionWithTickets {
        transaction,
        tickets,
    })
}

/// Pending transactions count as registered here so the buyer is not sent
/// to a second checkout while one is open.
pub async fn can_register(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
) -> Result<RegistrationCheck, AppError> {
    require_event(state, event_id).await?;
    let is_registered = state
        .store
        .has_registration(user.id(), event_id, true)
        .await?;
    Ok(RegistrationCheck {
        event_id,
        can_register: !is_registered,
        is_registered,
    })
}

async fn change(
    state: &AppState,
    transaction: &Transaction,
    target: TransactionStatus,
) -> Result<TransactionWithTickets, AppError> {
    let outcome = state
        .store
        .change_status(StatusChange {
            order_id: transaction.order_id.clone(),
            target,
            gateway_status: None,
            payment_type: None,
            transaction_time: None,
            now: Utc::now(),
        })
        .await?;
    applied(outcome, target)
}

pub async fn cancel(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> Result<TransactionWithTickets, AppError> {
    let transaction = require_transaction(state, id).await?;
    if transaction.user_id != user.id() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only cancel your own transactions".to_string(),
        ));
    }
    let result = change(state, &transaction, TransactionStatus::Expired).await?;
    info!(order_id = %transaction.order_id, by = user.id(), "Transaction cancelled");
    Ok(result)
}

/// Manual confirmation: same unit as a settled payment notification.
pub async fn approve(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> Result<TransactionWithTickets, AppError> {
    user.require(Capability::TransactionApprove)?;
    let transaction = require_transaction(state, id).await?;
    let result = change(state, &transaction, TransactionStatus::Paid).await?;
    info!(
        order_id = %transaction.order_id,
        by = user.id(),
        tickets = result.tickets.len(),
        "Transaction approved"
    );
    Ok(result)
}

pub async fn reject(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> Result<TransactionWithTickets, AppError> {
    user.require(Capability::TransactionReject)?;
    let transaction = require_transaction(state, id).await?;
    let result = change(state, &transaction, TransactionStatus::Failed).await?;
    info!(order_id = %transaction.order_id, by = user.id(), "Transaction rejected");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_charged_in_whole_units() {
        assert_eq!(whole_amount(Decimal::new(150_000_00, 2)).unwrap(), 150_000);
        assert_eq!(whole_amount(Decimal::new(1_999_50, 2)).unwrap(), 2_000);
    }

    #[test]
    fn free_quantity_is_bounded() {
        let request = |quantity| RegisterFreeRequest {
            ticket_type_id: 1,
            quantity,
        };
        assert!(validate_request(&request(5)).is_ok());
        for quantity in [0, 6] {
            let err = validate_request(&request(quantity)).unwrap_err();
            assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        }

        let parsed: RegisterFreeRequest =
            serde_json::from_str(r#"{"ticket_type_id": 3}"#).unwrap();
        assert_eq!(parsed.quantity, 1);
    }

    #[test]
    fn purchase_needs_a_positive_quantity() {
        let request = PurchaseRequest {
            ticket_type_id: 1,
            quantity: 0,
        };
        match validate_request(&request) {
            Err(AppError::InvalidInput(fields)) => assert!(fields.contains("quantity")),
            other => panic!("expected invalid input, got {other:?}"),
        }
    }
}
