use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Used,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Used => "used",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TicketStatus::Active),
            "used" => Ok(TicketStatus::Used),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attendance {
    NotAttended,
    Attended,
}

impl Attendance {
    pub fn as_str(self) -> &'static str {
        match self {
            Attendance::NotAttended => "not_attended",
            Attendance::Attended => "attended",
        }
    }
}

impl FromStr for Attendance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_attended" => Ok(Attendance::NotAttended),
            "attended" => Ok(Attendance::Attended),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketError {
    #[error("Ticket has already been used")]
    AlreadyUsed,

    #[error("Ticket has been cancelled")]
    Cancelled,

    #[error("Ticket has already been checked in")]
    AlreadyCheckedIn,

    #[error("Cannot cancel a used ticket")]
    CancelUsed,
}

impl From<TicketError> for AppError {
    fn from(err: TicketError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub transaction_id: i64,
    pub qr_code: String,
    pub status: TicketStatus,
    pub attendance: Attendance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn can_be_used(&self) -> bool {
        self.status == TicketStatus::Active && self.attendance == Attendance::NotAttended
    }

    /// Why the ticket cannot be checked in, or `None` when it can.
    pub fn check_in_rejection(&self) -> Option<TicketError> {
        match (self.status, self.attendance) {
            (TicketStatus::Used, _) => Some(TicketError::AlreadyUsed),
            (TicketStatus::Cancelled, _) => Some(TicketError::Cancelled),
            (TicketStatus::Active, Attendance::Attended) => Some(TicketError::AlreadyCheckedIn),
            (TicketStatus::Active, Attendance::NotAttended) => None,
        }
    }

    /// Moves both axes together: `active/not_attended` to `used/attended`.
    pub fn mark_used(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        if let Some(reason) = self.check_in_rejection() {
            return Err(reason);
        }
        self.status = TicketStatus::Used;
        self.attendance = Attendance::Attended;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        if self.status == TicketStatus::Used {
            return Err(TicketError::CancelUsed);
        }
        self.status = TicketStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}

/// `TKT-<order id>-<sequence>-<8 upper hex>`.
pub fn generate_qr_code(order_id: &str, sequence: i32) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!(
        "TKT-{}-{}-{}",
        order_id,
        sequence,
        simple[..8].to_ascii_uppercase()
    )
}

/// QR codes for a batch of `quantity` tickets, numbered from 1.
pub fn generate_batch(order_id: &str, quantity: i32) -> Vec<String> {
    (1..=quantity)
        .map(|sequence| generate_qr_code(order_id, sequence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ticket(status: TicketStatus, attendance: Attendance) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 1,
            transaction_id: 1,
            qr_code: "TKT-ORD-1-1-ABC123".into(),
            status,
            attendance,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_ticket_checks_in_once() {
        let mut t = ticket(TicketStatus::Active, Attendance::NotAttended);
        assert!(t.can_be_used());
        t.mark_used(Utc::now()).unwrap();
        assert_eq!(t.status, TicketStatus::Used);
        assert_eq!(t.attendance, Attendance::Attended);
        assert_eq!(t.mark_used(Utc::now()), Err(TicketError::AlreadyUsed));
    }

    #[test]
    fn rejection_reason_follows_state() {
        assert_eq!(
            ticket(TicketStatus::Cancelled, Attendance::NotAttended).check_in_rejection(),
            Some(TicketError::Cancelled)
        );
        assert_eq!(
            ticket(TicketStatus::Active, Attendance::Attended).check_in_rejection(),
            Some(TicketError::AlreadyCheckedIn)
        );
    }

    #[test]
    fn used_ticket_cannot_be_cancelled() {
        let mut t = ticket(TicketStatus::Used, Attendance::Attended);
        assert_eq!(t.cancel(Utc::now()), Err(TicketError::CancelUsed));
        assert_eq!(t.status, TicketStatus::Used);

        let mut active = ticket(TicketStatus::Active, Attendance::NotAttended);
        active.cancel(Utc::now()).unwrap();
        assert_eq!(active.status, TicketStatus::Cancelled);
        assert!(active.mark_used(Utc::now()).is_err());
    }

    #[test]
    fn qr_codes_embed_order_and_sequence() {
        let codes = generate_batch("ORD-1700000000-ABCDEFGH", 3);
        assert_eq!(codes.len(), 3);
        for (i, code) in codes.iter().enumerate() {
            let prefix = format!("TKT-ORD-1700000000-ABCDEFGH-{}-", i + 1);
            assert!(code.starts_with(&prefix), "{code}");
            let suffix = &code[prefix.len()..];
            assert_eq!(suffix.len(), 8);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
        assert_ne!(codes[0], codes[1]);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        CheckIn,
        Cancel,
    }

    proptest! {
        #[test]
        fn attended_implies_used(ops in prop::collection::vec(
            prop_oneof![Just(Op::CheckIn), Just(Op::Cancel)], 0..8)
        ) {
            let mut t = ticket(TicketStatus::Active, Attendance::NotAttended);
            for op in ops {
                let _ = match op {
                    Op::CheckIn => t.mark_used(Utc::now()),
                    Op::Cancel => t.cancel(Utc::now()),
                };
                prop_assert!(t.attendance != Attendance::Attended || t.status == TicketStatus::Used);
                prop_assert!(!(t.status == TicketStatus::Cancelled && t.attendance == Attendance::Attended));
            }
        }
    }
}
