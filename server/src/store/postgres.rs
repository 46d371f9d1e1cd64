use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::warn;

use crate::auth::rbac::{Capability, Role};
use crate::models::event::{slugify, unique_slug, Event, EventMember, EventPatch, NewEvent};
use crate::models::scan_history::ScanHistory;
use crate::models::ticket::{generate_batch, Ticket};
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

const USER_COLUMNS: &str = "id, firebase_uid, name, email, phone, photo, status, api_token, token_expires_at, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, name, slug, description, venue, start_time, end_time, is_paid, banner, created_at, updated_at";
const TICKET_TYPE_COLUMNS: &str = "id, event_id, name, price, quota, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, user_id, ticket_type_id, quantity, total_price, order_id, status, payment_type, snap_token, transaction_time, created_at, updated_at";
const TICKET_COLUMNS: &str = "id, transaction_id, qr_code, status, attendance, created_at, updated_at";

const DETAILS_FROM: &str = "FROM tickets t \
    JOIN transactions x ON x.id = t.transaction_id \
    JOIN ticket_types tt ON tt.id = x.ticket_type_id \
    JOIN events e ON e.id = tt.event_id";

const SCAN_ENTRY_SELECT: &str = "SELECT s.id, s.ticket_id, s.scanned_by, s.scanned_at, t.qr_code, \
    COALESCE(u.name, 'Unknown') AS scanner_name \
    FROM scan_history s \
    JOIN tickets t ON t.id = s.ticket_id \
    LEFT JOIN users u ON u.id = s.scanned_by";

const SUCCESS_STATUSES: &str = "('paid', 'free')";

/// `alias.col AS alias_col` for every column, so joined rows decode by prefix.
fn qualified(alias: &str, columns: &str) -> String {
    columns
        .split(", ")
        .map(|c| format!("{alias}.{c} AS {alias}_{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn details_select() -> String {
    format!(
        "SELECT {}, {}, {}, {} {DETAILS_FROM}",
        qualified("t", TICKET_COLUMNS),
        qualified("x", TRANSACTION_COLUMNS),
        qualified("tt", TICKET_TYPE_COLUMNS),
        qualified("e", EVENT_COLUMNS),
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn parse<T: FromStr<Err = String>>(value: String) -> Result<T, AppError> {
    value.parse().map_err(AppError::InternalServerError)
}

fn col(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

fn user_from(row: &PgRow) -> Result<User, AppError> {
    Ok(User {
        id: row.try_get("id")?,
        firebase_uid: row.try_get("firebase_uid")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        photo: row.try_get("photo")?,
        status: parse(row.try_get("status")?)?,
        api_token: row.try_get("api_token")?,
        token_expires_at: row.try_get("token_expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from(row: &PgRow, p: &str) -> Result<Event, AppError> {
    Ok(Event {
        id: row.try_get(col(p, "id").as_str())?,
        name: row.try_get(col(p, "name").as_str())?,
        slug: row.try_get(col(p, "slug").as_str())?,
        description: row.try_get(col(p, "description").as_str())?,
        venue: row.try_get(col(p, "venue").as_str())?,
        start_time: row.try_get(col(p, "start_time").as_str())?,
        end_time: row.try_get(col(p, "end_time").as_str())?,
        is_paid: row.try_get(col(p, "is_paid").as_str())?,
        banner: row.try_get(col(p, "banner").as_str())?,
        created_at: row.try_get(col(p, "created_at").as_str())?,
        updated_at: row.try_get(col(p, "updated_at").as_str())?,
    })
}

fn ticket_type_from(row: &PgRow, p: &str) -> Result<TicketType, AppError> {
    Ok(TicketType {
        id: row.try_get(col(p, "id").as_str())?,
        event_id: row.try_get(col(p, "event_id").as_str())?,
        name: row.try_get(col(p, "name").as_str())?,
        price: row.try_get(col(p, "price").as_str())?,
        quota: row.try_get(col(p, "quota").as_str())?,
        created_at: row.try_get(col(p, "created_at").as_str())?,
        updated_at: row.try_get(col(p, "updated_at").as_str())?,
    })
}

fn transaction_from(row: &PgRow, p: &str) -> Result<Transaction, AppError> {
    Ok(Transaction {
        id: row.try_get(col(p, "id").as_str())?,
        user_id: row.try_get(col(p, "user_id").as_str())?,
        ticket_type_id: row.try_get(col(p, "ticket_type_id").as_str())?,
        quantity: row.try_get(col(p, "quantity").as_str())?,
        total_price: row.try_get(col(p, "total_price").as_str())?,
        order_id: row.try_get(col(p, "order_id").as_str())?,
        status: parse(row.try_get(col(p, "status").as_str())?)?,
        payment_type: row.try_get(col(p, "payment_type").as_str())?,
        snap_token: row.try_get(col(p, "snap_token").as_str())?,
        transaction_time: row.try_get(col(p, "transaction_time").as_str())?,
        created_at: row.try_get(col(p, "created_at").as_str())?,
        updated_at: row.try_get(col(p, "updated_at").as_str())?,
    })
}

fn ticket_from(row: &PgRow, p: &str) -> Result<Ticket, AppError> {
    Ok(Ticket {
        id: row.try_get(col(p, "id").as_str())?,
        transaction_id: row.try_get(col(p, "transaction_id").as_str())?,
        qr_code: row.try_get(col(p, "qr_code").as_str())?,
        status: parse(row.try_get(col(p, "status").as_str())?)?,
        attendance: parse(row.try_get(col(p, "attendance").as_str())?)?,
        created_at: row.try_get(col(p, "created_at").as_str())?,
        updated_at: row.try_get(col(p, "updated_at").as_str())?,
    })
}

fn details_from(row: &PgRow) -> Result<TicketDetails, AppError> {
    Ok(TicketDetails {
        ticket: ticket_from(row, "t_")?,
        transaction: transaction_from(row, "x_")?,
        ticket_type: ticket_type_from(row, "tt_")?,
        event: event_from(row, "e_")?,
    })
}

fn scan_from(row: &PgRow) -> Result<ScanHistory, AppError> {
    Ok(ScanHistory {
        id: row.try_get("id")?,
        ticket_id: row.try_get("ticket_id")?,
        scanned_by: row.try_get("scanned_by")?,
        scanned_at: row.try_get("scanned_at")?,
    })
}

fn scan_entry_from(row: &PgRow) -> Result<ScanEntry, AppError> {
    Ok(ScanEntry {
        scan: scan_from(row)?,
        qr_code: row.try_get("qr_code")?,
        scanner_name: row.try_get("scanner_name")?,
    })
}

fn member_from(row: &PgRow) -> Result<EventMember, AppError> {
    Ok(EventMember {
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        is_owner: row.try_get("is_owner")?,
    })
}

fn not_found(what: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{what} {id} not found"))
}

/// PostgreSQL-backed store. Multi-row units run in one database transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn exists(conn: &mut PgConnection, sql: &str, id: i64) -> Result<bool, AppError> {
    let row = sqlx::query(sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(row.try_get::<bool, _>(0)?)
}

async fn user_exists(conn: &mut PgConnection, user_id: i64) -> Result<bool, AppError> {
    exists(conn, "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)", user_id).await
}

async fn event_exists(conn: &mut PgConnection, event_id: i64) -> Result<bool, AppError> {
    exists(conn, "SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)", event_id).await
}

/// First free slug derived from `name`, ignoring the event `except`.
async fn resolve_slug(
    conn: &mut PgConnection,
    name: &str,
    except: Option<i64>,
) -> Result<String, AppError> {
    let base = slugify(name);
    let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
        "SELECT slug FROM events \
         WHERE (slug = $1 OR slug LIKE $1 || '-%') AND ($2::BIGINT IS NULL OR id <> $2)",
    )
    .bind(&base)
    .bind(except)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();
    Ok(unique_slug(&base, |candidate| taken.contains(candidate)))
}

async fn registration_exists(
    conn: &mut PgConnection,
    user_id: i64,
    event_id: i64,
    include_pending: bool,
) -> Result<bool, AppError> {
    let mut statuses = vec![
        TransactionStatus::Paid.as_str().to_string(),
        TransactionStatus::Free.as_str().to_string(),
    ];
    if include_pending {
        statuses.push(TransactionStatus::Pending.as_str().to_string());
    }
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM transactions x \
         JOIN ticket_types tt ON tt.id = x.ticket_type_id \
         WHERE x.user_id = $1 AND tt.event_id = $2 AND x.status = ANY($3))",
    )
    .bind(user_id)
    .bind(event_id)
    .bind(statuses)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get::<bool, _>(0)?)
}

async fn insert_tickets(
    conn: &mut PgConnection,
    transaction: &Transaction,
    now: DateTime<Utc>,
) -> Result<Vec<Ticket>, AppError> {
    let sql = format!(
        "INSERT INTO tickets (transaction_id, qr_code, status, attendance, created_at, updated_at) \
         VALUES ($1, $2, 'active', 'not_attended', $3, $3) RETURNING {TICKET_COLUMNS}"
    );
    let mut tickets = Vec::with_capacity(transaction.quantity.max(0) as usize);
    for qr_code in generate_batch(&transaction.order_id, transaction.quantity) {
        let row = sqlx::query(&sql)
            .bind(transaction.id)
            .bind(qr_code)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?;
        tickets.push(ticket_from(&row, "")?);
    }
    Ok(tickets)
}

async fn lock_ticket_type(conn: &mut PgConnection, id: i64) -> Result<TicketType, AppError> {
    let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found("Ticket type", id))?;
    ticket_type_from(&row, "")
}

async fn store_quota(conn: &mut PgConnection, ticket_type: &TicketType) -> Result<(), AppError> {
    sqlx::query("UPDATE ticket_types SET quota = $2, updated_at = $3 WHERE id = $1")
        .bind(ticket_type.id)
        .bind(ticket_type.quota)
        .bind(ticket_type.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_from(&row))
            .transpose()
    }

    async fn find_user_by_identity(
        &self,
        firebase_uid: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE firebase_uid = $1 OR email = $2 \
             ORDER BY (firebase_uid = $1) DESC NULLS LAST LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(firebase_uid)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_from(&row))
            .transpose()
    }

    async fn list_users(&self, filter: UserFilter) -> Result<Vec<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u \
             WHERE ($1::TEXT IS NULL OR u.name ILIKE $1 OR u.email ILIKE $1 OR u.phone ILIKE $1) \
               AND ($2::TEXT IS NULL OR EXISTS ( \
                    SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = $2)) \
               AND ($3::TEXT IS NULL OR u.status = $3) \
             ORDER BY u.id DESC"
        );
        sqlx::query(&sql)
            .bind(filter.search.map(|s| format!("%{s}%")))
            .bind(filter.role.map(|r| r.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from)
            .collect()
    }

    async fn create_user(
        &self,
        new_user: NewUser,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO users (firebase_uid, name, email, phone, photo, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new_user.firebase_uid)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.phone)
            .bind(&new_user.photo)
            .bind(new_user.status.as_str())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::conflict("Email is already registered")
                } else {
                    e.into()
                }
            })?;
        let user = user_from(&row)?;

        for role in roles {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user.id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(user)
    }

    async fn update_user(
        &self,
        id: i64,
        patch: UserPatch,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found("User", id))?;
        let mut user = user_from(&row)?;
        patch.apply(&mut user, now);

        sqlx::query(
            "UPDATE users SET name = $2, email = $3, phone = $4, photo = $5, status = $6, \
             updated_at = $7 WHERE id = $1",
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.photo)
        .bind(user.status.as_str())
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Email is already registered")
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;
        Ok(user)
    }

    async fn link_firebase_uid(&self, user_id: i64, firebase_uid: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET firebase_uid = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(firebase_uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_session_token(
        &self,
        user_id: i64,
        token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET api_token = $2, token_expires_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_roles(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        let names: Vec<String> =
            sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        names.into_iter().map(parse::<Role>).collect()
    }

    async fn user_permissions(&self, user_id: i64) -> Result<Vec<Capability>, AppError> {
        let names: Vec<String> = sqlx::query_scalar::<_, String>(
            "SELECT capability FROM user_permissions WHERE user_id = $1 ORDER BY capability",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names
            .into_iter()
            .filter_map(|name| match name.parse() {
                Ok(cap) => Some(cap),
                Err(e) => {
                    warn!(user_id, error = %e, "Ignoring stored permission");
                    None
                }
            })
            .collect())
    }

    async fn assign_role(&self, user_id: i64, role: Role) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        if !user_exists(&mut conn, user_id).await? {
            return Err(not_found("User", user_id));
        }
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn remove_role(&self, user_id: i64, role: Role) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role = $2")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "User {user_id} does not hold role {role}"
            )));
        }
        Ok(())
    }

    async fn grant_permission(&self, user_id: i64, capability: Capability) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        if !user_exists(&mut conn, user_id).await? {
            return Err(not_found("User", user_id));
        }
        sqlx::query(
            "INSERT INTO user_permissions (user_id, capability) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(capability.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn revoke_permission(&self, user_id: i64, capability: Capability) -> Result<(), AppError> {
        let result =
            sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND capability = $2")
                .bind(user_id)
                .bind(capability.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "User {user_id} does not hold permission {capability}"
            )));
        }
        Ok(())
    }

    async fn list_events(&self, owner_id: Option<i64>) -> Result<Vec<Event>, AppError> {
        let sql = format!(
            "SELECT {} FROM events e WHERE $1::BIGINT IS NULL OR EXISTS ( \
                SELECT 1 FROM event_members m \
                WHERE m.event_id = e.id AND m.is_owner AND m.user_id = $1) \
             ORDER BY e.id",
            qualified("e", EVENT_COLUMNS)
        );
        sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| event_from(row, "e_"))
            .collect()
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| event_from(&row, ""))
            .transpose()
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE slug = $1");
        sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| event_from(&row, ""))
            .transpose()
    }

    async fn managed_events(&self, user_id: i64) -> Result<Vec<ManagedEvent>, AppError> {
        let sql = format!(
            "SELECT {}, m.is_owner FROM events e \
             JOIN event_members m ON m.event_id = e.id \
             WHERE m.user_id = $1 ORDER BY e.start_time DESC, e.id DESC",
            qualified("e", EVENT_COLUMNS)
        );
        sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<ManagedEvent, AppError> {
                Ok(ManagedEvent {
                    event: event_from(row, "e_")?,
                    is_owner: row.try_get("is_owner")?,
                })
            })
            .collect()
    }

    async fn create_event(
        &self,
        new_event: NewEvent,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        let mut tx = self.pool.begin().await?;
        let slug = resolve_slug(&mut tx, &new_event.name, None).await?;

        let sql = format!(
            "INSERT INTO events (name, slug, description, venue, start_time, end_time, is_paid, banner, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new_event.name)
            .bind(&slug)
            .bind(&new_event.description)
            .bind(&new_event.venue)
            .bind(new_event.start_time)
            .bind(new_event.end_time)
            .bind(new_event.is_paid)
            .bind(&new_event.banner)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::conflict(format!("Slug '{slug}' was taken concurrently, retry"))
                } else {
                    e.into()
                }
            })?;
        let event = event_from(&row, "")?;

        sqlx::query("INSERT INTO event_members (event_id, user_id, is_owner) VALUES ($1, $2, TRUE)")
            .bind(event.id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn update_event(
        &self,
        id: i64,
        patch: EventPatch,
        now: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found("Event", id))?;
        let mut event = event_from(&row, "")?;

        let renamed = patch.name.as_ref().filter(|name| **name != event.name).cloned();
        patch.apply(&mut event, now);
        if let Some(name) = renamed {
            event.slug = resolve_slug(&mut tx, &name, Some(id)).await?;
        }

        sqlx::query(
            "UPDATE events SET name = $2, slug = $3, description = $4, venue = $5, \
             start_time = $6, end_time = $7, is_paid = $8, banner = $9, updated_at = $10 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&event.name)
        .bind(&event.slug)
        .bind(&event.description)
        .bind(&event.venue)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.is_paid)
        .bind(&event.banner)
        .bind(event.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn delete_event(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let has_transactions = exists(
            &mut tx,
            "SELECT EXISTS (SELECT 1 FROM transactions x \
             JOIN ticket_types tt ON tt.id = x.ticket_type_id WHERE tt.event_id = $1)",
            id,
        )
        .await?;
        if has_transactions {
            return Err(AppError::conflict(
                "Event has transactions and cannot be deleted",
            ));
        }
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("Event", id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn event_members(&self, event_id: i64) -> Result<Vec<EventMember>, AppError> {
        sqlx::query(
            "SELECT event_id, user_id, is_owner FROM event_members \
             WHERE event_id = $1 ORDER BY is_owner DESC, user_id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(member_from)
        .collect()
    }

    async fn add_event_member(&self, event_id: i64, user_id: i64) -> Result<EventMember, AppError> {
        let mut conn = self.pool.acquire().await?;
        if !event_exists(&mut conn, event_id).await? {
            return Err(not_found("Event", event_id));
        }
        if !user_exists(&mut conn, user_id).await? {
            return Err(not_found("User", user_id));
        }
        let row = sqlx::query(
            "INSERT INTO event_members (event_id, user_id, is_owner) VALUES ($1, $2, FALSE) \
             RETURNING event_id, user_id, is_owner",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("User is already a member of this event")
            } else {
                e.into()
            }
        })?;
        member_from(&row)
    }

    async fn remove_event_member(&self, event_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let is_owner = sqlx::query_scalar::<_, bool>(
            "SELECT is_owner FROM event_members WHERE event_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Event member not found".to_string()))?;
        if is_owner {
            return Err(AppError::ValidationError(
                "The event owner cannot be removed".to_string(),
            ));
        }
        sqlx::query("DELETE FROM event_members WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn transfer_ownership(&self, event_id: i64, new_owner_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(not_found("Event", event_id));
        }
        if !user_exists(&mut tx, new_owner_id).await? {
            return Err(not_found("User", new_owner_id));
        }

        // Demote first: the partial unique index allows one owner row per event.
        sqlx::query("UPDATE event_members SET is_owner = FALSE WHERE event_id = $1 AND is_owner")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO event_members (event_id, user_id, is_owner) VALUES ($1, $2, TRUE) \
             ON CONFLICT (event_id, user_id) DO UPDATE SET is_owner = TRUE",
        )
        .bind(event_id)
        .bind(new_owner_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_ticket_types(&self, event_id: i64) -> Result<Vec<TicketType>, AppError> {
        let sql = format!(
            "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE event_id = $1 ORDER BY id"
        );
        sqlx::query(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| ticket_type_from(row, ""))
            .collect()
    }

    async fn search_ticket_types(&self, filter: TicketTypeFilter) -> Result<Vec<TicketType>, AppError> {
        let sql = format!(
            "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types tt \
             WHERE ($1::BIGINT IS NULL OR tt.event_id = $1) \
               AND ($2::BIGINT IS NULL OR EXISTS ( \
                    SELECT 1 FROM event_members m \
                    WHERE m.event_id = tt.event_id AND m.is_owner AND m.user_id = $2)) \
             ORDER BY tt.id"
        );
        sqlx::query(&sql)
            .bind(filter.event_id)
            .bind(filter.owner_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| ticket_type_from(row, ""))
            .collect()
    }

    async fn find_ticket_type(&self, id: i64) -> Result<Option<TicketType>, AppError> {
        let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| ticket_type_from(&row, ""))
            .transpose()
    }

    async fn create_ticket_type(
        &self,
        new_type: NewTicketType,
        now: DateTime<Utc>,
    ) -> Result<TicketType, AppError> {
        let mut conn = self.pool.acquire().await?;
        if !event_exists(&mut conn, new_type.event_id).await? {
            return Err(not_found("Event", new_type.event_id));
        }
        let sql = format!(
            "INSERT INTO ticket_types (event_id, name, price, quota, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {TICKET_TYPE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new_type.event_id)
            .bind(&new_type.name)
            .bind(new_type.price)
            .bind(new_type.quota)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?;
        ticket_type_from(&row, "")
    }

    async fn update_ticket_type(
        &self,
        id: i64,
        patch: TicketTypePatch,
        now: DateTime<Utc>,
    ) -> Result<TicketType, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut ticket_type = lock_ticket_type(&mut tx, id).await?;
        patch.apply(&mut ticket_type, now);
        sqlx::query(
            "UPDATE ticket_types SET name = $2, price = $3, quota = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(&ticket_type.name)
        .bind(ticket_type.price)
        .bind(ticket_type.quota)
        .bind(ticket_type.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(ticket_type)
    }

    async fn delete_ticket_type(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        lock_ticket_type(&mut tx, id).await?;
        let referenced = exists(
            &mut tx,
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE ticket_type_id = $1)",
            id,
        )
        .await?;
        if referenced {
            return Err(AppError::conflict(
                "Ticket type has transactions and cannot be deleted",
            ));
        }
        sqlx::query("DELETE FROM ticket_types WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn has_registration(
        &self,
        user_id: i64,
        event_id: i64,
        include_pending: bool,
    ) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        registration_exists(&mut conn, user_id, event_id, include_pending).await
    }

    async fn register_free(
        &self,
        registration: FreeRegistration,
    ) -> Result<(Transaction, Vec<Ticket>), AppError> {
        let mut tx = self.pool.begin().await?;

        // Serialises registrations of the same user.
        let user = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(registration.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(not_found("User", registration.user_id));
        }

        let mut ticket_type = lock_ticket_type(&mut tx, registration.ticket_type_id).await?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(ticket_type.event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found("Event", ticket_type.event_id))?;
        let event = event_from(&row, "")?;
        let registered =
            registration_exists(&mut tx, registration.user_id, event.id, false).await?;

        check_free_registration(
            &event,
            &ticket_type,
            registration.quantity,
            registered,
            registration.now,
        )?;
        ticket_type.decrease_quota(registration.quantity)?;
        ticket_type.updated_at = registration.now;

        let sql = format!(
            "INSERT INTO transactions (user_id, ticket_type_id, quantity, total_price, order_id, status, \
             payment_type, transaction_time, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'free', 'free', $6, $6, $6) RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(registration.user_id)
            .bind(ticket_type.id)
            .bind(registration.quantity)
            .bind(Decimal::ZERO)
            .bind(&registration.order_id)
            .bind(registration.now)
            .fetch_one(&mut *tx)
            .await?;
        let transaction = transaction_from(&row, "")?;

        let tickets = insert_tickets(&mut tx, &transaction, registration.now).await?;
        store_quota(&mut tx, &ticket_type).await?;
        tx.commit().await?;
        Ok((transaction, tickets))
    }

    async fn create_pending(
        &self,
        new_transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let sql = format!(
            "INSERT INTO transactions (user_id, ticket_type_id, quantity, total_price, order_id, status, \
             payment_type, snap_token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new_transaction.user_id)
            .bind(new_transaction.ticket_type_id)
            .bind(new_transaction.quantity)
            .bind(new_transaction.total_price)
            .bind(&new_transaction.order_id)
            .bind(new_transaction.status.as_str())
            .bind(&new_transaction.payment_type)
            .bind(&new_transaction.snap_token)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::conflict("Order id already exists")
                } else {
                    e.into()
                }
            })?;
        transaction_from(&row, "")
    }

    async fn find_transaction(&self, id: i64) -> Result<Option<Transaction>, AppError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| transaction_from(&row, ""))
            .transpose()
    }

    async fn find_transaction_by_order(&self, order_id: &str) -> Result<Option<Transaction>, AppError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = $1");
        sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| transaction_from(&row, ""))
            .transpose()
    }

    async fn list_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>, AppError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions x \
             WHERE ($1::BIGINT IS NULL OR x.user_id = $1) \
               AND ($2::TEXT IS NULL OR x.status = $2) \
               AND ($3::BIGINT IS NULL OR EXISTS ( \
                    SELECT 1 FROM ticket_types tt \
                    JOIN event_members m ON m.event_id = tt.event_id AND m.is_owner \
                    WHERE tt.id = x.ticket_type_id AND m.user_id = $3)) \
             ORDER BY x.id DESC"
        );
        sqlx::query(&sql)
            .bind(filter.user_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.event_owner_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| transaction_from(row, ""))
            .collect()
    }

    async fn change_status(&self, change: StatusChange) -> Result<StatusChangeOutcome, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = $1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(&change.order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", change.order_id)))?;
        let mut transaction = transaction_from(&row, "")?;

        if let Some(gateway_status) = &change.gateway_status {
            let inserted = sqlx::query(
                "INSERT INTO payment_notifications (order_id, target_status, gateway_status, received_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(&change.order_id)
            .bind(change.target.as_str())
            .bind(gateway_status)
            .bind(change.now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted == 0 {
                return Ok(StatusChangeOutcome::Duplicate(transaction));
            }
        }

        // Early returns drop `tx`, rolling back the receipt above.
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
                let mut ticket_type = lock_ticket_type(&mut tx, transaction.ticket_type_id).await?;
                ticket_type.decrease_quota(transaction.quantity)?;
                ticket_type.updated_at = change.now;
                store_quota(&mut tx, &ticket_type).await?;
                transaction.status = transaction.status.transition(change.target)?;
            }
            TransactionStatus::Failed | TransactionStatus::Expired => {
                transaction.status = transaction.status.transition(change.target)?;
            }
        }

        transaction.payment_type = change.payment_type.or(transaction.payment_type);
        transaction.transaction_time = change.transaction_time.or(transaction.transaction_time);
        transaction.updated_at = change.now;

        sqlx::query(
            "UPDATE transactions SET status = $2, payment_type = $3, transaction_time = $4, \
             updated_at = $5 WHERE id = $1",
        )
        .bind(transaction.id)
        .bind(transaction.status.as_str())
        .bind(&transaction.payment_type)
        .bind(transaction.transaction_time)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await?;

        let tickets = if transaction.status == TransactionStatus::Paid {
            insert_tickets(&mut tx, &transaction, change.now).await?
        } else {
            Vec::new()
        };
        tx.commit().await?;
        Ok(StatusChangeOutcome::Applied {
            transaction,
            tickets,
        })
    }

    async fn tickets_for_user(&self, user_id: i64) -> Result<Vec<TicketDetails>, AppError> {
        let sql = format!(
            "{} WHERE x.user_id = $1 AND x.status IN {SUCCESS_STATUSES} ORDER BY t.id DESC",
            details_select()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(details_from)
            .collect()
    }

    async fn tickets_for_transaction(&self, transaction_id: i64) -> Result<Vec<Ticket>, AppError> {
        let sql =
            format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE transaction_id = $1 ORDER BY id");
        sqlx::query(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| ticket_from(row, ""))
            .collect()
    }

    async fn tickets_for_event(
        &self,
        event_id: i64,
        filter: TicketFilter,
    ) -> Result<Vec<TicketDetails>, AppError> {
        let sql = format!(
            "{} WHERE e.id = $1 AND x.status IN {SUCCESS_STATUSES} \
               AND ($2::TEXT IS NULL OR t.status = $2) \
               AND ($3::TEXT IS NULL OR t.attendance = $3) \
             ORDER BY t.id DESC",
            details_select()
        );
        sqlx::query(&sql)
            .bind(event_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.attendance.map(|a| a.as_str()))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(details_from)
            .collect()
    }

    async fn find_ticket(&self, id: i64) -> Result<Option<TicketDetails>, AppError> {
        let sql = format!("{} WHERE t.id = $1", details_select());
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| details_from(&row))
            .transpose()
    }

    async fn find_ticket_by_qr(&self, qr_code: &str) -> Result<Option<TicketDetails>, AppError> {
        let sql = format!("{} WHERE t.qr_code = $1", details_select());
        sqlx::query(&sql)
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| details_from(&row))
            .transpose()
    }

    async fn check_in(
        &self,
        qr_code: &str,
        scanned_by: i64,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE t.qr_code = $1 FOR UPDATE OF t", details_select());
        let row = sqlx::query(&sql)
            .bind(qr_code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid QR code".to_string()))?;
        let mut details = details_from(&row)?;

        let existing = sqlx::query(
            "SELECT id, ticket_id, scanned_by, scanned_at FROM scan_history WHERE ticket_id = $1",
        )
        .bind(details.ticket.id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            return Ok(CheckInOutcome::AlreadyScanned {
                scan: scan_from(&row)?,
                details,
            });
        }
        if let Err(reason) = details.ticket.mark_used(now) {
            return Ok(CheckInOutcome::Rejected { details, reason });
        }

        sqlx::query(
            "UPDATE tickets SET status = 'used', attendance = 'attended', updated_at = $2 WHERE id = $1",
        )
        .bind(details.ticket.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO scan_history (ticket_id, scanned_by, scanned_at) VALUES ($1, $2, $3) \
             RETURNING id, ticket_id, scanned_by, scanned_at",
        )
        .bind(details.ticket.id)
        .bind(scanned_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let scan = match inserted {
            Ok(row) => scan_from(&row)?,
            Err(e) if is_unique_violation(&e) => {
                // Lost the race on the unique ticket_id; the winner's row is committed.
                drop(tx);
                let row = sqlx::query(
                    "SELECT id, ticket_id, scanned_by, scanned_at FROM scan_history WHERE ticket_id = $1",
                )
                .bind(details.ticket.id)
                .fetch_one(&self.pool)
                .await?;
                let winner = self
                    .find_ticket(details.ticket.id)
                    .await?
                    .ok_or_else(|| not_found("Ticket", details.ticket.id))?;
                return Ok(CheckInOutcome::AlreadyScanned {
                    details: winner,
                    scan: scan_from(&row)?,
                });
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(CheckInOutcome::CheckedIn { details, scan })
    }

    async fn cancel_ticket(&self, id: i64, now: DateTime<Utc>) -> Result<Ticket, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found("Ticket", id))?;
        let mut ticket = ticket_from(&row, "")?;
        ticket.cancel(now)?;

        sqlx::query("UPDATE tickets SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(ticket.status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ticket)
    }

    async fn ticket_counts(&self, event_id: i64) -> Result<TicketCounts, AppError> {
        let sql = format!(
            "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE t.status = 'active') AS active, \
                COUNT(*) FILTER (WHERE t.status = 'used') AS used, \
                COUNT(*) FILTER (WHERE t.status = 'cancelled') AS cancelled, \
                COUNT(*) FILTER (WHERE t.attendance = 'attended') AS checked_in, \
                COUNT(*) FILTER (WHERE t.attendance = 'not_attended') AS not_checked_in \
             {DETAILS_FROM} WHERE e.id = $1 AND x.status IN {SUCCESS_STATUSES}"
        );
        let row = sqlx::query(&sql)
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(TicketCounts {
            total: row.try_get("total")?,
            active: row.try_get("active")?,
            used: row.try_get("used")?,
            cancelled: row.try_get("cancelled")?,
            checked_in: row.try_get("checked_in")?,
            not_checked_in: row.try_get("not_checked_in")?,
        })
    }

    async fn scan_for_ticket(&self, ticket_id: i64) -> Result<Option<ScanEntry>, AppError> {
        let sql = format!("{SCAN_ENTRY_SELECT} WHERE s.ticket_id = $1");
        sqlx::query(&sql)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| scan_entry_from(&row))
            .transpose()
    }

    async fn scans_for_event(&self, event_id: i64) -> Result<Vec<ScanEntry>, AppError> {
        let sql = format!(
            "{SCAN_ENTRY_SELECT} \
             JOIN transactions x ON x.id = t.transaction_id \
             JOIN ticket_types tt ON tt.id = x.ticket_type_id \
             WHERE tt.event_id = $1 ORDER BY s.scanned_at DESC"
        );
        sqlx::query(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(scan_entry_from)
            .collect()
    }

    async fn scans_by_user(&self, user_id: i64) -> Result<Vec<ScanEntry>, AppError> {
        let sql = format!("{SCAN_ENTRY_SELECT} WHERE s.scanned_by = $1 ORDER BY s.scanned_at DESC");
        sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(scan_entry_from)
            .collect()
    }

    async fn list_scans(&self, limit: i64, offset: i64) -> Result<(Vec<ScanEntry>, i64), AppError> {
        let sql = format!("{SCAN_ENTRY_SELECT} ORDER BY s.scanned_at DESC, s.id DESC LIMIT $1 OFFSET $2");
        let entries = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(scan_entry_from)
            .collect::<Result<Vec<_>, _>>()?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scan_history")
            .fetch_one(&self.pool)
            .await?;
        Ok((entries, total))
    }

    async fn scan_statistics(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> Result<ScanStatistics, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE scanned_at >= $1) AS today, \
                COUNT(*) FILTER (WHERE scanned_at >= $2) AS this_month \
             FROM scan_history",
        )
        .bind(day_start)
        .bind(month_start)
        .fetch_one(&self.pool)
        .await?;

        let top_scanners = sqlx::query(
            "SELECT s.scanned_by, COALESCE(u.name, 'Unknown') AS name, COUNT(*) AS total \
             FROM scan_history s LEFT JOIN users u ON u.id = s.scanned_by \
             GROUP BY s.scanned_by, u.name ORDER BY total DESC, s.scanned_by LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<TopScanner, AppError> {
            Ok(TopScanner {
                user_id: row.try_get("scanned_by")?,
                name: row.try_get("name")?,
                total_scans: row.try_get("total")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(ScanStatistics {
            total_scans: row.try_get("total")?,
            scans_today: row.try_get("today")?,
            scans_this_month: row.try_get("this_month")?,
            top_scanners,
        })
    }
}
