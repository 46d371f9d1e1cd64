use std::borrow::Cow;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::utils::error::AppError;
use crate::utils::validation::{not_blank, FieldErrors};

/// Threshold below which a ticket type is reported as almost gone.
const LOW_QUOTA_THRESHOLD: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("Insufficient quota: requested {requested}, remaining {remaining}")]
    Insufficient { requested: i32, remaining: i32 },

    #[error("Quantity must be positive, got {0}")]
    NonPositive(i32),
}

impl From<QuotaError> for AppError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Insufficient { remaining, .. } => {
                AppError::conflict(format!("Insufficient quota. Remaining: {remaining}"))
            }
            QuotaError::NonPositive(_) => AppError::ValidationError(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    AlmostGone,
    SoldOut,
}

/// A priced ticket category of an event, carrying its remaining quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: Decimal,
    pub quota: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    pub fn is_available(&self, quantity: i32) -> bool {
        self.quota >= quantity
    }

    pub fn availability(&self) -> Availability {
        if self.quota <= 0 {
            Availability::SoldOut
        } else if self.quota < LOW_QUOTA_THRESHOLD {
            Availability::AlmostGone
        } else {
            Availability::Available
        }
    }

    /// Removes `quantity` units, leaving the quota untouched on failure.
    pub fn decrease_quota(&mut self, quantity: i32) -> Result<(), QuotaError> {
        if quantity <= 0 {
            return Err(QuotaError::NonPositive(quantity));
        }
        if !self.is_available(quantity) {
            return Err(QuotaError::Insufficient {
                requested: quantity,
                remaining: self.quota,
            });
        }
        self.quota -= quantity;
        Ok(())
    }

    /// Returns `quantity` units to the pool. No upper bound is enforced.
    ///
    /// Cancelling a ticket does not call this: a cancelled ticket keeps its
    /// unit, so the only caller is the quota ledger property test.
    pub fn increase_quota(&mut self, quantity: i32) -> Result<(), QuotaError> {
        if quantity <= 0 {
            return Err(QuotaError::NonPositive(quantity));
        }
        self.quota = self.quota.saturating_add(quantity);
        Ok(())
    }

    pub fn total_for(&self, quantity: i32) -> Decimal {
        self.price * Decimal::from(quantity)
    }

    /// [`Self::total_for`], refused when it does not fit the total column.
    pub fn checked_total(&self, quantity: i32) -> Result<Decimal, AppError> {
        match self.price.checked_mul(Decimal::from(quantity)) {
            Some(total) if total <= max_amount() => Ok(total),
            _ => {
                let mut errors = FieldErrors::new();
                errors.add(
                    "quantity",
                    "The total price may not be greater than 999999999999.99.",
                );
                Err(AppError::InvalidInput(errors))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTicketType {
    pub event_id: i64,
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The name may not be greater than 255 characters.")
    )]
    pub name: String,
    #[validate(custom(function = "valid_price"))]
    pub price: Decimal,
    #[validate(range(min = 0, message = "The quota must be at least 0."))]
    pub quota: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TicketTypePatch {
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The name may not be greater than 255 characters.")
    )]
    pub name: Option<String>,
    #[validate(custom(function = "valid_price"))]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "The quota must be at least 0."))]
    pub quota: Option<i32>,
}

impl TicketTypePatch {
    pub fn apply(self, ticket_type: &mut TicketType, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            ticket_type.name = name;
        }
        if let Some(price) = self.price {
            ticket_type.price = price;
        }
        if let Some(quota) = self.quota {
            ticket_type.quota = quota;
        }
        ticket_type.updated_at = now;
    }
}

/// Largest amount a `NUMERIC(14, 2)` price or total column holds.
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

fn valid_price(price: &Decimal) -> Result<(), ValidationError> {
    let message = if price.is_sign_negative() && !price.is_zero() {
        "The price must be at least 0."
    } else if *price > max_amount() {
        "The price may not be greater than 999999999999.99."
    } else {
        return Ok(());
    };
    let mut error = ValidationError::new("range");
    error.message = Some(Cow::from(message));
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::validation::field_errors;
    use proptest::prelude::*;

    fn ticket_type(price: i64, quota: i32) -> TicketType {
        let now = Utc::now();
        TicketType {
            id: 1,
            event_id: 1,
            name: "Regular".to_string(),
            price: Decimal::from(price),
            quota,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn decrease_fails_without_side_effect() {
        let mut tt = ticket_type(50_000, 2);
        let err = tt.decrease_quota(3).unwrap_err();
        assert_eq!(
            err,
            QuotaError::Insufficient {
                requested: 3,
                remaining: 2
            }
        );
        assert_eq!(tt.quota, 2);
    }

    #[test]
    fn decrease_to_zero_is_allowed() {
        let mut tt = ticket_type(0, 2);
        tt.decrease_quota(2).unwrap();
        assert_eq!(tt.quota, 0);
        assert_eq!(tt.availability(), Availability::SoldOut);
    }

    #[test]
    fn zero_price_is_free() {
        assert!(ticket_type(0, 1).is_free());
        assert!(!ticket_type(1, 1).is_free());
    }

    #[test]
    fn availability_labels() {
        assert_eq!(ticket_type(0, 9).availability(), Availability::AlmostGone);
        assert_eq!(ticket_type(0, 10).availability(), Availability::Available);
    }

    #[test]
    fn negative_price_and_quota_are_rejected() {
        let new_type = NewTicketType {
            event_id: 1,
            name: "VIP".into(),
            price: Decimal::from(-1),
            quota: -5,
        };
        let errors = field_errors(&new_type);
        assert!(errors.contains("price"));
        assert!(errors.contains("quota"));
        assert!(!errors.contains("name"));

        let patch = TicketTypePatch {
            quota: Some(0),
            ..Default::default()
        };
        assert!(field_errors(&patch).is_empty());

        let blank = TicketTypePatch {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert!(field_errors(&blank).contains("name"));
    }

    #[test]
    fn price_is_capped_at_column_precision() {
        let mut new_type = NewTicketType {
            event_id: 1,
            name: "Platinum".into(),
            price: max_amount(),
            quota: 1,
        };
        assert!(field_errors(&new_type).is_empty());

        new_type.price = Decimal::from(1_000_000_000_000i64);
        let value = field_errors(&new_type).to_value();
        assert_eq!(
            value["price"][0],
            "The price may not be greater than 999999999999.99."
        );
    }

    #[test]
    fn oversized_total_is_invalid_input() {
        let tt = ticket_type(500_000_000_000, 10);
        assert_eq!(tt.checked_total(1).unwrap(), Decimal::from(500_000_000_000i64));

        let err = tt.checked_total(2).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[derive(Debug, Clone)]
    enum LedgerOp {
        Confirm(i32),
        Restore(i32),
    }

    fn ledger_op() -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            (1..6i32).prop_map(LedgerOp::Confirm),
            (1..6i32).prop_map(LedgerOp::Restore),
        ]
    }

    proptest! {
        #[test]
        fn quota_matches_confirmed_and_restored(
            initial in 0..50i32,
            ops in proptest::collection::vec(ledger_op(), 0..40),
        ) {
            let mut tt = ticket_type(10_000, initial);
            let mut confirmed = 0;
            let mut restored = 0;

            for op in ops {
                match op {
                    LedgerOp::Confirm(qty) => {
                        if tt.decrease_quota(qty).is_ok() {
                            confirmed += qty;
                        }
                    }
                    LedgerOp::Restore(qty) => {
                        tt.increase_quota(qty).unwrap();
                        restored += qty;
                    }
                }
                prop_assert!(tt.quota >= 0);
            }

            prop_assert_eq!(tt.quota, initial - confirmed + restored);
        }
    }
}
