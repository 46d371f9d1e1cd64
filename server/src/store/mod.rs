//! Persistence boundary. Every method is one atomic unit: it either applies
//! all of its writes or none of them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::rbac::{Capability, Role};
use crate::models::event::{Event, EventMember, EventPatch, NewEvent};
use crate::models::scan_history::ScanHistory;
use crate::models::ticket::{Attendance, Ticket, TicketError, TicketStatus};
use crate::models::ticket_type::{NewTicketType, TicketType, TicketTypePatch};
use crate::models::transaction::{NewTransaction, Transaction, TransactionStatus};
use crate::models::user::{NewUser, User, UserPatch, UserStatus};
use crate::utils::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A ticket together with what it was bought for.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub transaction: Transaction,
    pub ticket_type: TicketType,
    pub event: Event,
}

impl TicketDetails {
    pub fn holder_id(&self) -> i64 {
        self.transaction.user_id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanEntry {
    #[serde(flatten)]
    pub scan: ScanHistory,
    pub qr_code: String,
    pub scanner_name: String,
}

/// Ticket counts of one event, over tickets of success-state transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TicketCounts {
    pub total: i64,
    pub active: i64,
    pub used: i64,
    pub cancelled: i64,
    pub checked_in: i64,
    pub not_checked_in: i64,
}

/// An event together with the caller's place in its committee.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopScanner {
    pub user_id: i64,
    pub name: String,
    pub total_scans: i64,
}

/// Scan counts across every event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatistics {
    pub total_scans: i64,
    pub scans_today: i64,
    pub scans_this_month: i64,
    /// The five most active scanners, busiest first.
    pub top_scanners: Vec<TopScanner>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive match on name, email or phone.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketTypeFilter {
    pub event_id: Option<i64>,
    /// Only ticket types of events this user owns.
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub attendance: Option<Attendance>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub user_id: Option<i64>,
    /// Only transactions of events this user owns.
    pub event_owner_id: Option<i64>,
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Clone)]
pub struct FreeRegistration {
    pub user_id: i64,
    pub ticket_type_id: i64,
    pub quantity: i32,
    pub order_id: String,
    pub now: DateTime<Utc>,
}

/// A requested move of a transaction out of `pending`, keyed by order id.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order_id: String,
    pub target: TransactionStatus,
    /// Gateway status that caused the change. When present, `(order_id, target)`
    /// is recorded and a repeat of the same pair is reported as a duplicate.
    pub gateway_status: Option<String>,
    pub payment_type: Option<String>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum StatusChangeOutcome {
    Applied {
        transaction: Transaction,
        tickets: Vec<Ticket>,
    },
    /// Already applied, or the same notification seen before.
    Duplicate(Transaction),
    /// The transaction already sits in another terminal state.
    Stale(Transaction),
}

#[derive(Debug, Clone)]
pub enum CheckInOutcome {
    CheckedIn {
        details: TicketDetails,
        scan: ScanHistory,
    },
    AlreadyScanned {
        details: TicketDetails,
        scan: ScanHistory,
    },
    Rejected {
        details: TicketDetails,
        reason: TicketError,
    },
}

#[async_trait]
pub trait Store: Send + Sync {
    // users and grants
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_by_identity(&self, firebase_uid: &str, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, filter: UserFilter) -> Result<Vec<User>, AppError>;
    /// Inserts the user holding `roles`. `Conflict` when the email or identity is taken.
    async fn create_user(&self, new_user: NewUser, roles: &[Role], now: DateTime<Utc>) -> Result<User, AppError>;
    async fn update_user(&self, id: i64, patch: UserPatch, now: DateTime<Utc>) -> Result<User, AppError>;
    async fn link_firebase_uid(&self, user_id: i64, firebase_uid: &str) -> Result<(), AppError>;
    async fn set_session_token(
        &self,
        user_id: i64,
        token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;
    async fn user_roles(&self, user_id: i64) -> Result<Vec<Role>, AppError>;
    async fn user_permissions(&self, user_id: i64) -> Result<Vec<Capability>, AppError>;
    async fn assign_role(&self, user_id: i64, role: Role) -> Result<(), AppError>;
    async fn remove_role(&self, user_id: i64, role: Role) -> Result<(), AppError>;
    async fn grant_permission(&self, user_id: i64, capability: Capability) -> Result<(), AppError>;
    async fn revoke_permission(&self, user_id: i64, capability: Capability) -> Result<(), AppError>;

    // events
    async fn list_events(&self, owner_id: Option<i64>) -> Result<Vec<Event>, AppError>;
    async fn find_event(&self, id: i64) -> Result<Option<Event>, AppError>;
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, AppError>;
    /// Events `user_id` belongs to, latest start first.
    async fn managed_events(&self, user_id: i64) -> Result<Vec<ManagedEvent>, AppError>;
    /// Inserts the event with a collision-free slug and `owner_id` as its only owner.
    async fn create_event(&self, new_event: NewEvent, owner_id: i64, now: DateTime<Utc>) -> Result<Event, AppError>;
    async fn update_event(&self, id: i64, patch: EventPatch, now: DateTime<Utc>) -> Result<Event, AppError>;
    async fn delete_event(&self, id: i64) -> Result<(), AppError>;
    async fn event_members(&self, event_id: i64) -> Result<Vec<EventMember>, AppError>;
    async fn add_event_member(&self, event_id: i64, user_id: i64) -> Result<EventMember, AppError>;
    async fn remove_event_member(&self, event_id: i64, user_id: i64) -> Result<(), AppError>;
    /// Moves the owner flag; the previous owner stays on as a member.
    async fn transfer_ownership(&self, event_id: i64, new_owner_id: i64) -> Result<(), AppError>;

    // ticket types
    async fn list_ticket_types(&self, event_id: i64) -> Result<Vec<TicketType>, AppError>;
    async fn search_ticket_types(&self, filter: TicketTypeFilter) -> Result<Vec<TicketType>, AppError>;
    async fn find_ticket_type(&self, id: i64) -> Result<Option<TicketType>, AppError>;
    async fn create_ticket_type(&self, new_type: NewTicketType, now: DateTime<Utc>) -> Result<TicketType, AppError>;
    async fn update_ticket_type(&self, id: i64, patch: TicketTypePatch, now: DateTime<Utc>) -> Result<TicketType, AppError>;
    async fn delete_ticket_type(&self, id: i64) -> Result<(), AppError>;

    // transactions
    async fn has_registration(&self, user_id: i64, event_id: i64, include_pending: bool) -> Result<bool, AppError>;
    /// Free transaction, its ticket batch and the quota decrement, together.
    async fn register_free(&self, registration: FreeRegistration) -> Result<(Transaction, Vec<Ticket>), AppError>;
    async fn create_pending(&self, new_transaction: NewTransaction, now: DateTime<Utc>) -> Result<Transaction, AppError>;
    async fn find_transaction(&self, id: i64) -> Result<Option<Transaction>, AppError>;
    async fn find_transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>, AppError>;
    async fn list_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, AppError>;
    /// Moving to `paid` also generates the ticket batch and decrements quota.
    /// A `pending` target only records payment metadata on a pending transaction.
    async fn change_status(&self, change: StatusChange) -> Result<StatusChangeOutcome, AppError>;

    // tickets
    async fn tickets_for_user(&self, user_id: i64) -> Result<Vec<TicketDetails>, AppError>;
    async fn tickets_for_transaction(&self, transaction_id: i64) -> Result<Vec<Ticket>, AppError>;
    /// Tickets of success-state transactions of one event, newest first.
    async fn tickets_for_event(&self, event_id: i64, filter: TicketFilter) -> Result<Vec<TicketDetails>, AppError>;
    async fn find_ticket(&self, id: i64) -> Result<Option<TicketDetails>, AppError>;
    async fn find_ticket_by_qr(&self, qr_code: &str) -> Result<Option<TicketDetails>, AppError>;
    /// `NotFound` when no ticket carries `qr_code`.
    async fn check_in(&self, qr_code: &str, scanned_by: i64, now: DateTime<Utc>) -> Result<CheckInOutcome, AppError>;
    async fn cancel_ticket(&self, id: i64, now: DateTime<Utc>) -> Result<Ticket, AppError>;
    async fn ticket_counts(&self, event_id: i64) -> Result<TicketCounts, AppError>;

    // scan history
    async fn scan_for_ticket(&self, ticket_id: i64) -> Result<Option<ScanEntry>, AppError>;
    async fn scans_for_event(&self, event_id: i64) -> Result<Vec<ScanEntry>, AppError>;
    async fn scans_by_user(&self, user_id: i64) -> Result<Vec<ScanEntry>, AppError>;
    /// One page of every scan, newest first, with the overall count.
    async fn list_scans(&self, limit: i64, offset: i64) -> Result<(Vec<ScanEntry>, i64), AppError>;
    async fn scan_statistics(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> Result<ScanStatistics, AppError>;
}
