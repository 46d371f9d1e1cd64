use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::auth::rbac::{Capability, Role};
use crate::models::event::{slugify, unique_slug, Event, EventMember, EventPatch, NewEvent};
use crate::models::scan_history::ScanHistory;
use crate::models::ticket::{generate_batch, Attendance, Ticket, TicketStatus};
use crate::models::ticket_type::{NewTicketType, TicketType, TicketTypePatch};
use crate::models::transaction::{
    check_free_registration, NewTransaction, Transaction, TransactionStatus,
};
use crate::models::user::{NewUser, User, UserPatch};
use crate::store::{
    CheckInOutcome, FreeRegistration, ManagedEvent, ScanEntry, ScanStatistics, StatusChange,
    StatusChangeOutcome, Store, TicketCounts, TicketDetails, TicketFilter, TicketTypeFilter,
    TopScanner, TransactionFilter, UserFilter,
};
use crate::utils::error::AppError;

#[derive(Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<i64, User>,
    roles: BTreeSet<(i64, Role)>,
    permissions: BTreeSet<(i64, Capability)>,
    events: BTreeMap<i64, Event>,
    members: Vec<EventMember>,
    ticket_types: BTreeMap<i64, TicketType>,
    transactions: BTreeMap<i64, Transaction>,
    tickets: BTreeMap<i64, Ticket>,
    /// Keyed by ticket id: at most one scan per ticket.
    scans: BTreeMap<i64, ScanHistory>,
    receipts: HashSet<(String, TransactionStatus)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn event_of_ticket_type(&self, ticket_type_id: i64) -> Option<i64> {
        self.ticket_types.get(&ticket_type_id).map(|tt| tt.event_id)
    }

    fn owner_of(&self, event_id: i64) -> Option<i64> {
        self.members
            .iter()
            .find(|m| m.event_id == event_id && m.is_owner)
            .map(|m| m.user_id)
    }

    fn details(&self, ticket: &Ticket) -> Option<TicketDetails> {
        let transaction = self.transactions.get(&ticket.transaction_id)?;
        let ticket_type = self.ticket_types.get(&transaction.ticket_type_id)?;
        let event = self.events.get(&ticket_type.event_id)?;
        Some(TicketDetails {
            ticket: ticket.clone(),
            transaction: transaction.clone(),
            ticket_type: ticket_type.clone(),
            event: event.clone(),
        })
    }

    fn scan_entry(&self, scan: &ScanHistory) -> ScanEntry {
        ScanEntry {
            scan: scan.clone(),
            qr_code: self
                .tickets
                .get(&scan.ticket_id)
                .map(|t| t.qr_code.clone())
                .unwrap_or_default(),
            scanner_name: self
                .users
                .get(&scan.scanned_by)
                .map(|u| u.name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Scans newest first.
    fn scan_entries<'a>(&self, scans: impl Iterator<Item = &'a ScanHistory>) -> Vec<ScanEntry> {
        let mut entries: Vec<ScanEntry> = scans.map(|scan| self.scan_entry(scan)).collect();
        entries.sort_by(|a, b| b.scan.scanned_at.cmp(&a.scan.scanned_at));
        entries
    }

    fn identity_taken(&self, email: &str, firebase_uid: Option<&str>, except: Option<i64>) -> bool {
        self.users.values().any(|u| {
            Some(u.id) != except
                && (u.email == email
                    || (firebase_uid.is_some() && u.firebase_uid.as_deref() == firebase_uid))
        })
    }

    fn has_registration(&self, user_id: i64, event_id: i64, include_pending: bool) -> bool {
        self.transactions.values().any(|tx| {
            tx.user_id == user_id
                && self.event_of_ticket_type(tx.ticket_type_id) == Some(event_id)
                && (tx.status.is_success()
                    || (include_pending && tx.status == TransactionStatus::Pending))
        })
    }

    fn slug_for(&self, name: &str, except: Option<i64>) -> String {
        unique_slug(&slugify(name), |candidate| {
            self.events
                .values()
                .any(|e| e.slug == candidate && Some(e.id) != except)
        })
    }

    fn insert_tickets(&mut self, transaction: &Transaction, now: DateTime<Utc>) -> Vec<Ticket> {
        generate_batch(&transaction.order_id, transaction.quantity)
            .into_iter()
            .map(|qr_code| {
                let ticket = Ticket {
                    id: self.next_id(),
                    transaction_id: transaction.id,
                    qr_code,
                    status: TicketStatus::Active,
                    attendance: Attendance::NotAttended,
                    created_at: now,
                    updated_at: now,
                };
                self.tickets.insert(ticket.id, ticket.clone());
                ticket
            })
            .collect()
    }
}

/// In-process store over plain collections. One mutex guards every table, so
/// each method observes and writes a consistent snapshot.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{what} {id} not found"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_identity(
        &self,
        firebase_uid: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock().await;
        let by_uid = tables
            .users
            .values()
            .find(|u| u.firebase_uid.as_deref() == Some(firebase_uid));
        Ok(by_uid
            .or_else(|| tables.users.values().find(|u| u.email == email))
            .cloned())
    }

    async fn list_users(&self, filter: UserFilter) -> Result<Vec<User>, AppError> {
        let tables = self.tables.lock().await;
        let needle = filter.search.map(|s| s.to_lowercase());
        Ok(tables
            .users
            .values()
            .rev()
            .filter(|u| {
                needle.as_deref().map_or(true, |needle| {
                    u.name.to_lowercase().contains(needle)
                        || u.email.to_lowercase().contains(needle)
                        || u.phone.as_deref().map_or(false, |p| p.contains(needle))
                })
            })
            .filter(|u| filter.role.map_or(true, |role| tables.roles.contains(&(u.id, role))))
            .filter(|u| filter.status.map_or(true, |status| u.status == status))
            .cloned()
            .collect())
    }

    async fn create_user(
        &self,
        new_user: NewUser,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.identity_taken(&new_user.email, Some(&new_user.firebase_uid), None) {
            return Err(AppError::conflict("Email is already registered"));
        }
        let user = User {
            id: tables.next_id(),
            firebase_uid: Some(new_user.firebase_uid),
            name: new_user.name,
            email: new_user.email,
            phone: new_user.phone,
            photo: new_user.photo,
            status: new_user.status,
            api_token: None,
            token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        for role in roles {
            tables.roles.insert((user.id, *role));
        }
        Ok(user)
    }

    async fn update_user(
        &self,
        id: i64,
        patch: UserPatch,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut tables = self.tables.lock().await;
        let mut user = tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("User", id))?;
        patch.apply(&mut user, now);
        if tables.identity_taken(&user.email, None, Some(id)) {
            return Err(AppError::conflict("Email is already registered"));
        }
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn link_firebase_uid(&self, user_id: i64, firebase_uid: &str) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| not_found("User", user_id))?;
        user.firebase_uid = Some(firebase_uid.to_string());
        Ok(())
    }

    async fn set_session_token(
        &self,
        user_id: i64,
        token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| not_found("User", user_id))?;
        user.api_token = token.map(str::to_string);
        user.token_expires_at = expires_at;
        Ok(())
    }

    async fn user_roles(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .roles
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, role)| *role)
            .collect())
    }

    async fn user_permissions(&self, user_id: i64) -> Result<Vec<Capability>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .permissions
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, cap)| *cap)
            .collect())
    }

    async fn assign_role(&self, user_id: i64, role: Role) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(not_found("User", user_id));
        }
        tables.roles.insert((user_id, role));
        Ok(())
    }

    async fn remove_role(&self, user_id: i64, role: Role) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.roles.remove(&(user_id, role)) {
            return Err(AppError::NotFound(format!(
                "User {user_id} does not hold role {role}"
            )));
        }
        Ok(())
    }

    async fn grant_permission(&self, user_id: i64, capability: Capability) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(not_found("User", user_id));
        }
        tables.permissions.insert((user_id, capability));
        Ok(())
    }

    async fn revoke_permission(&self, user_id: i64, capability: Capability) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.permissions.remove(&(user_id, capability)) {
            return Err(AppError::NotFound(format!(
                "User {user_id} does not hold permission {capability}"
            )));
        }
        Ok(())
    }

    async fn list_events(&self, owner_id: Option<i64>) -> Result<Vec<Event>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .values()
            .filter(|e| owner_id.map_or(true, |owner| tables.owner_of(e.id) == Some(owner)))
            .cloned()
            .collect())
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>, AppError> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.events.values().find(|e| e.slug == slug).cloned())
    }

    async fn managed_events(&self, user_id: i64) -> Result<Vec<ManagedEvent>, AppError> {
        let tables = self.tables.lock().await;
        let mut managed: Vec<ManagedEvent> = tables
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                tables.events.get(&m.event_id).map(|event| ManagedEvent {
                    event: event.clone(),
                    is_owner: m.is_owner,
                })
            })
            .collect();
        managed.sort_by(|a, b| b.event.start_time.cmp(&a.event.start_time));
        Ok(managed)
    }

    async fn create_event(
        &self,
        new_event: NewEvent,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        let mut tables = self.tables.lock().await;
        let slug = tables.slug_for(&new_event.name, None);
        let event = Event {
            id: tables.next_id(),
            name: new_event.name,
            slug,
            description: new_event.description,
            venue: new_event.venue,
            start_time: new_event.start_time,
            end_time: new_event.end_time,
            is_paid: new_event.is_paid,
            banner: new_event.banner,
            created_at: now,
            updated_at: now,
        };
        tables.events.insert(event.id, event.clone());
        tables.members.push(EventMember {
            event_id: event.id,
            user_id: owner_id,
            is_owner: true,
        });
        Ok(event)
    }

    async fn update_event(
        &self,
        id: i64,
        patch: EventPatch,
        now: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        let mut tables = self.tables.lock().await;
        let mut event = tables
            .events
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Event", id))?;

        let renamed = patch.name.as_ref().filter(|name| **name != event.name).cloned();
        patch.apply(&mut event, now);
        if let Some(name) = renamed {
            event.slug = tables.slug_for(&name, Some(id));
        }
        tables.events.insert(id, event.clone());
        Ok(event)
    }

    async fn delete_event(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.events.contains_key(&id) {
            return Err(not_found("Event", id));
        }
        let has_transactions = tables
            .transactions
            .values()
            .any(|tx| tables.event_of_ticket_type(tx.ticket_type_id) == Some(id));
        if has_transactions {
            return Err(AppError::conflict(
                "Event has transactions and cannot be deleted",
            ));
        }
        tables.events.remove(&id);
        tables.members.retain(|m| m.event_id != id);
        tables.ticket_types.retain(|_, tt| tt.event_id != id);
        Ok(())
    }

    async fn event_members(&self, event_id: i64) -> Result<Vec<EventMember>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .members
            .iter()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn add_event_member(&self, event_id: i64, user_id: i64) -> Result<EventMember, AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.events.contains_key(&event_id) {
            return Err(not_found("Event", event_id));
        }
        if !tables.users.contains_key(&user_id) {
            return Err(not_found("User", user_id));
        }
        if tables
            .members
            .iter()
            .any(|m| m.event_id == event_id && m.user_id == user_id)
        {
            return Err(AppError::conflict("User is already a member of this event"));
        }
        let member = EventMember {
            event_id,
            user_id,
            is_owner: false,
        };
        tables.members.push(member.clone());
        Ok(member)
    }

    async fn remove_event_member(&self, event_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let position = tables
            .members
            .iter()
            .position(|m| m.event_id == event_id && m.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Event member not found".to_string()))?;
        if tables.members[position].is_owner {
            return Err(AppError::ValidationError(
                "The event owner cannot be removed".to_string(),
            ));
        }
        tables.members.remove(position);
        Ok(())
    }

    async fn transfer_ownership(&self, event_id: i64, new_owner_id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.events.contains_key(&event_id) {
            return Err(not_found("Event", event_id));
        }
        if !tables.users.contains_key(&new_owner_id) {
            return Err(not_found("User", new_owner_id));
        }
        for member in tables.members.iter_mut().filter(|m| m.event_id == event_id) {
            member.is_owner = member.user_id == new_owner_id;
        }
        let already_member = tables
            .members
            .iter()
            .any(|m| m.event_id == event_id && m.user_id == new_owner_id);
        if !already_member {
            tables.members.push(EventMember {
                event_id,
                user_id: new_owner_id,
                is_owner: true,
            });
        }
        Ok(())
    }

    async fn list_ticket_types(&self, event_id: i64) -> Result<Vec<TicketType>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .ticket_types
            .values()
            .filter(|tt| tt.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn search_ticket_types(&self, filter: TicketTypeFilter) -> Result<Vec<TicketType>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .ticket_types
            .values()
            .filter(|tt| filter.event_id.map_or(true, |id| tt.event_id == id))
            .filter(|tt| {
                filter
                    .owner_id
                    .map_or(true, |owner| tables.owner_of(tt.event_id) == Some(owner))
            })
            .cloned()
            .collect())
    }

    async fn find_ticket_type(&self, id: i64) -> Result<Option<TicketType>, AppError> {
        Ok(self.tables.lock().await.ticket_types.get(&id).cloned())
    }

    async fn create_ticket_type(
        &self,
        new_type: NewTicketType,
        now: DateTime<Utc>,
    ) -> Result<TicketType, AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.events.contains_key(&new_type.event_id) {
            return Err(not_found("Event", new_type.event_id));
        }
        let ticket_type = TicketType {
            id: tables.next_id(),
            event_id: new_type.event_id,
            name: new_type.name,
            price: new_type.price,
            quota: new_type.quota,
            created_at: now,
            updated_at: now,
        };
        tables.ticket_types.insert(ticket_type.id, ticket_type.clone());
        Ok(ticket_type)
    }

    async fn update_ticket_type(
        &self,
        id: i64,
        patch: TicketTypePatch,
        now: DateTime<Utc>,
    ) -> Result<TicketType, AppError> {
        let mut tables = self.tables.lock().await;
        let ticket_type = tables
            .ticket_types
            .get_mut(&id)
            .ok_or_else(|| not_found("Ticket type", id))?;
        patch.apply(ticket_type, now);
        Ok(ticket_type.clone())
    }

    async fn delete_ticket_type(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.ticket_types.contains_key(&id) {
            return Err(not_found("Ticket type", id));
        }
        if tables.transactions.values().any(|tx| tx.ticket_type_id == id) {
            return Err(AppError::conflict(
                "Ticket type has transactions and cannot be deleted",
            ));
        }
        tables.ticket_types.remove(&id);
        Ok(())
    }

    async fn has_registration(
        &self,
        user_id: i64,
        event_id: i64,
        include_pending: bool,
    ) -> Result<bool, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.has_registration(user_id, event_id, include_pending))
    }

    async fn register_free(
        &self,
        registration: FreeRegistration,
    ) -> Result<(Transaction, Vec<Ticket>), AppError> {
        let mut tables = self.tables.lock().await;
        let mut ticket_type = tables
            .ticket_types
            .get(&registration.ticket_type_id)
            .cloned()
            .ok_or_else(|| not_found("Ticket type", registration.ticket_type_id))?;
        let event = tables
            .events
            .get(&ticket_type.event_id)
            .cloned()
            .ok_or_else(|| not_found("Event", ticket_type.event_id))?;
        let registered = tables.has_registration(registration.user_id, event.id, false);

        check_free_registration(
            &event,
            &ticket_type,
            registration.quantity,
            registered,
            registration.now,
        )?;
        ticket_type.decrease_quota(registration.quantity)?;
        ticket_type.updated_at = registration.now;

        let transaction = Transaction {
            id: tables.next_id(),
            user_id: registration.user_id,
            ticket_type_id: ticket_type.id,
            quantity: registration.quantity,
            total_price: Decimal::ZERO,
            order_id: registration.order_id,
            status: TransactionStatus::Free,
            payment_type: Some("free".to_string()),
            snap_token: None,
            transaction_time: Some(registration.now),
            created_at: registration.now,
            updated_at: registration.now,
        };
        tables.transactions.insert(transaction.id, transaction.clone());
        let tickets = tables.insert_tickets(&transaction, registration.now);
        tables.ticket_types.insert(ticket_type.id, ticket_type);
        Ok((transaction, tickets))
    }

    async fn create_pending(
        &self,
        new_transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let mut tables = self.tables.lock().await;
        if tables
            .transactions
            .values()
            .any(|tx| tx.order_id == new_transaction.order_id)
        {
            return Err(AppError::conflict("Order id already exists"));
        }
        let transaction = Transaction {
            id: tables.next_id(),
            user_id: new_transaction.user_id,
            ticket_type_id: new_transaction.ticket_type_id,
            quantity: new_transaction.quantity,
            total_price: new_transaction.total_price,
            order_id: new_transaction.order_id,
            status: new_transaction.status,
            payment_type: new_transaction.payment_type,
            snap_token: new_transaction.snap_token,
            transaction_time: None,
            created_at: now,
            updated_at: now,
        };
        tables.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn find_transaction(&self, id: i64) -> Result<Option<Transaction>, AppError> {
        Ok(self.tables.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .values()
            .find(|tx| tx.order_id == order_id)
            .cloned())
    }

    async fn list_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .values()
            .rev()
            .filter(|tx| filter.user_id.map_or(true, |id| tx.user_id == id))
            .filter(|tx| filter.status.map_or(true, |status| tx.status == status))
            .filter(|tx| {
                filter.event_owner_id.map_or(true, |owner| {
                    tables
                        .event_of_ticket_type(tx.ticket_type_id)
                        .and_then(|event_id| tables.owner_of(event_id))
                        == Some(owner)
                })
            })
            .cloned()
            .collect())
    }

    async fn change_status(&self, change: StatusChange) -> Result<StatusChangeOutcome, AppError> {
        let mut tables = self.tables.lock().await;
        let mut transaction = tables
            .transactions
            .values()
            .find(|tx| tx.order_id == change.order_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", change.order_id)))?;

        let receipt = (change.order_id.clone(), change.target);
        if change.gateway_status.is_some() && tables.receipts.contains(&receipt) {
            return Ok(StatusChangeOutcome::Duplicate(transaction));
        }
        if change.target != TransactionStatus::Pending && transaction.status == change.target {
            return Ok(StatusChangeOutcome::Duplicate(transaction));
        }
        if transaction.status != TransactionStatus::Pending {
            return Ok(StatusChangeOutcome::Stale(transaction));
        }

        match change.target {
            TransactionStatus::Pending => {}
            TransactionStatus::Free => {
                return Err(AppError::ValidationError(
                    "Free status is only reached through free registration".to_string(),
                ));
            }
            TransactionStatus::Paid => {
                let mut ticket_type = tables
                    .ticket_types
                    .get(&transaction.ticket_type_id)
                    .cloned()
                    .ok_or_else(|| not_found("Ticket type", transaction.ticket_type_id))?;
                ticket_type.decrease_quota(transaction.quantity)?;
                ticket_type.updated_at = change.now;
                tables.ticket_types.insert(ticket_type.id, ticket_type);
                transaction.status = transaction.status.transition(change.target)?;
            }
            TransactionStatus::Failed | TransactionStatus::Expired => {
                transaction.status = transaction.status.transition(change.target)?;
            }
        }

        transaction.payment_type = change.payment_type.or(transaction.payment_type);
        transaction.transaction_time = change.transaction_time.or(transaction.transaction_time);
        transaction.updated_at = change.now;

        let tickets = if transaction.status == TransactionStatus::Paid {
            tables.insert_tickets(&transaction, change.now)
        } else {
            Vec::new()
        };
        tables.transactions.insert(transaction.id, transaction.clone());
        if change.gateway_status.is_some() {
            tables.receipts.insert(receipt);
        }
        Ok(StatusChangeOutcome::Applied {
            transaction,
            tickets,
        })
    }

    async fn tickets_for_user(&self, user_id: i64) -> Result<Vec<TicketDetails>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .rev()
            .filter_map(|t| tables.details(t))
            .filter(|d| d.holder_id() == user_id && d.transaction.status.is_success())
            .collect())
    }

    async fn tickets_for_transaction(&self, transaction_id: i64) -> Result<Vec<Ticket>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .filter(|t| t.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn tickets_for_event(
        &self,
        event_id: i64,
        filter: TicketFilter,
    ) -> Result<Vec<TicketDetails>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .rev()
            .filter_map(|t| tables.details(t))
            .filter(|d| d.event.id == event_id && d.transaction.status.is_success())
            .filter(|d| filter.status.map_or(true, |s| d.ticket.status == s))
            .filter(|d| filter.attendance.map_or(true, |a| d.ticket.attendance == a))
            .collect())
    }

    async fn find_ticket(&self, id: i64) -> Result<Option<TicketDetails>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.get(&id).and_then(|t| tables.details(t)))
    }

    async fn find_ticket_by_qr(&self, qr_code: &str) -> Result<Option<TicketDetails>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.qr_code == qr_code)
            .and_then(|t| tables.details(t)))
    }

    async fn check_in(
        &self,
        qr_code: &str,
        scanned_by: i64,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, AppError> {
        let mut tables = self.tables.lock().await;
        let mut details = tables
            .tickets
            .values()
            .find(|t| t.qr_code == qr_code)
            .and_then(|t| tables.details(t))
            .ok_or_else(|| AppError::NotFound("Invalid QR code".to_string()))?;

        if let Some(scan) = tables.scans.get(&details.ticket.id) {
            return Ok(CheckInOutcome::AlreadyScanned {
                details,
                scan: scan.clone(),
            });
        }
        if let Err(reason) = details.ticket.mark_used(now) {
            return Ok(CheckInOutcome::Rejected { details, reason });
        }

        let scan = ScanHistory {
            id: tables.next_id(),
            ticket_id: details.ticket.id,
            scanned_by,
            scanned_at: now,
        };
        tables.tickets.insert(details.ticket.id, details.ticket.clone());
        tables.scans.insert(scan.ticket_id, scan.clone());
        Ok(CheckInOutcome::CheckedIn { details, scan })
    }

    async fn cancel_ticket(&self, id: i64, now: DateTime<Utc>) -> Result<Ticket, AppError> {
        let mut tables = self.tables.lock().await;
        let ticket = tables
            .tickets
            .get_mut(&id)
            .ok_or_else(|| not_found("Ticket", id))?;
        ticket.cancel(now)?;
        Ok(ticket.clone())
    }

    async fn ticket_counts(&self, event_id: i64) -> Result<TicketCounts, AppError> {
        let tables = self.tables.lock().await;
        let mut counts = TicketCounts::default();
        for details in tables.tickets.values().filter_map(|t| tables.details(t)) {
            if details.event.id != event_id || !details.transaction.status.is_success() {
                continue;
            }
            counts.total += 1;
            match details.ticket.status {
                TicketStatus::Active => counts.active += 1,
                TicketStatus::Used => counts.used += 1,
                TicketStatus::Cancelled => counts.cancelled += 1,
            }
            match details.ticket.attendance {
                Attendance::Attended => counts.checked_in += 1,
                Attendance::NotAttended => counts.not_checked_in += 1,
            }
        }
        Ok(counts)
    }

    async fn scan_for_ticket(&self, ticket_id: i64) -> Result<Option<ScanEntry>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.scans.get(&ticket_id).map(|scan| tables.scan_entry(scan)))
    }

    async fn scans_for_event(&self, event_id: i64) -> Result<Vec<ScanEntry>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.scan_entries(tables.scans.values().filter(|scan| {
            tables
                .tickets
                .get(&scan.ticket_id)
                .and_then(|t| tables.details(t))
                .map_or(false, |d| d.event.id == event_id)
        })))
    }

    async fn scans_by_user(&self, user_id: i64) -> Result<Vec<ScanEntry>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.scan_entries(tables.scans.values().filter(|scan| scan.scanned_by == user_id)))
    }

    async fn list_scans(&self, limit: i64, offset: i64) -> Result<(Vec<ScanEntry>, i64), AppError> {
        let tables = self.tables.lock().await;
        let entries = tables.scan_entries(tables.scans.values());
        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn scan_statistics(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> Result<ScanStatistics, AppError> {
        let tables = self.tables.lock().await;
        let mut per_scanner: BTreeMap<i64, i64> = BTreeMap::new();
        let mut stats = ScanStatistics::default();
        for scan in tables.scans.values() {
            stats.total_scans += 1;
            if scan.scanned_at >= day_start {
                stats.scans_today += 1;
            }
            if scan.scanned_at >= month_start {
                stats.scans_this_month += 1;
            }
            *per_scanner.entry(scan.scanned_by).or_default() += 1;
        }

        let mut top: Vec<(i64, i64)> = per_scanner.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        stats.top_scanners = top
            .into_iter()
            .take(5)
            .map(|(user_id, total_scans)| TopScanner {
                user_id,
                name: tables
                    .users
                    .get(&user_id)
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                total_scans,
            })
            .collect();
        Ok(stats)
    }
}
