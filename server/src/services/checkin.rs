use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{AuthUser, Capability, Role};
use crate::models::event::Event;
use crate::models::scan_history::ScanHistory;
use crate::models::ticket::{Attendance, Ticket, TicketStatus};
use crate::models::ticket_type::TicketType;
use crate::services::events::{is_owner, require_event, require_manager};
use crate::state::AppState;
use crate::store::{
    CheckInOutcome, ScanEntry, ScanStatistics, TicketCounts, TicketDetails, TicketFilter,
};
use crate::utils::error::AppError;
use crate::utils::validation::{not_blank, validate_request};

#[derive(Debug, Deserialize, Validate)]
pub struct ScanRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The qr code may not be greater than 255 characters.")
    )]
    pub qr_code: String,
}

#[derive(Debug, Serialize)]
pub struct CheckInReceipt {
    pub ticket: Ticket,
    pub event: Event,
    pub ticket_type: TicketType,
    pub order_id: String,
    pub scan: ScanHistory,
    pub scanned_by: String,
}

#[derive(Debug, Serialize)]
pub struct TicketLookup {
    #[serde(flatten)]
    pub details: TicketDetails,
    pub can_check_in: bool,
    pub rejection: Option<String>,
    pub scan: Option<ScanEntry>,
}

#[derive(Debug, Serialize)]
pub struct TicketStatistics {
    pub event_id: i64,
    #[serde(flatten)]
    pub counts: TicketCounts,
    pub check_in_percentage: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventTicketQuery {
    pub status: Option<String>,
    pub attendance: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanPageQuery {
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn first_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

const MAX_SCAN_PAGE: i64 = 100;

#[derive(Debug, Serialize)]
pub struct ScanPage {
    pub entries: Vec<ScanEntry>,
    pub total: i64,
    pub current_page: i64,
    pub per_page: i64,
    pub last_page: i64,
}

/// Start of the UTC day and month containing `now`.
fn period_starts(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = now.date_naive();
    let day_start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    let month_start = day
        .with_day(1)
        .map(|first| Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN)))
        .unwrap_or(day_start);
    (day_start, month_start)
}

fn check_in_percentage(counts: &TicketCounts) -> f64 {
    if counts.total == 0 {
        return 0.0;
    }
    let ratio = counts.checked_in as f64 / counts.total as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

async fn require_ticket(state: &AppState, id: i64) -> Result<TicketDetails, AppError> {
    state
        .store
        .find_ticket(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {id} not found")))
}

/// Redeems a QR code. Duplicate scans answer with the scan on record and change nothing.
pub async fn scan(
    state: &AppState,
    user: &AuthUser,
    request: ScanRequest,
) -> Result<CheckInReceipt, AppError> {
    user.require(Capability::TicketScan)?;
    validate_request(&request)?;

    let qr_code = request.qr_code.trim();
    match state.store.check_in(qr_code, user.id(), Utc::now()).await? {
        CheckInOutcome::CheckedIn { details, scan } => {
            info!(
                ticket_id = details.ticket.id,
                event_id = details.event.id,
                scanned_by = user.id(),
                "Ticket checked in"
            );
            Ok(CheckInReceipt {
                order_id: details.transaction.order_id,
                ticket: details.ticket,
                event: details.event,
                ticket_type: details.ticket_type,
                scan,
                scanned_by: user.user.name.clone(),
            })
        }
        CheckInOutcome::AlreadyScanned { details, scan } => {
            let scanner = state
                .store
                .find_user(scan.scanned_by)
                .await?
                .map(|u| u.name)
                .unwrap_or_else(|| "Unknown".to_string());
            warn!(
                ticket_id = details.ticket.id,
                first_scan = %scan.scanned_at,
                "Duplicate ticket scan"
            );
            Err(AppError::conflict_with(
                "Ticket has already been scanned",
                json!({
                    "ticket": details.ticket,
                    "scan": scan,
                    "scanned_by": scanner,
                    "scanned_at": scan.scanned_at,
                }),
            ))
        }
        CheckInOutcome::Rejected { details, reason } => {
            warn!(ticket_id = details.ticket.id, reason = %reason, "Check-in rejected");
            Err(reason.into())
        }
    }
}

/// Read-only lookup by QR code, reporting whether a scan would succeed.
pub async fn verify(state: &AppState, user: &AuthUser, qr_code: &str) -> Result<TicketLookup, AppError> {
    user.require(Capability::TicketVerify)?;
    let details = state
        .store
        .find_ticket_by_qr(qr_code)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid QR code".to_string()))?;
    let scan = state.store.scan_for_ticket(details.ticket.id).await?;
    let rejection = details.ticket.check_in_rejection().map(|r| r.to_string());

    Ok(TicketLookup {
        can_check_in: rejection.is_none() && scan.is_none(),
        rejection,
        scan,
        details,
    })
}

pub async fn my_tickets(state: &AppState, user: &AuthUser) -> Result<Vec<TicketDetails>, AppError> {
    user.require(Capability::TicketView)?;
    state.store.tickets_for_user(user.id()).await
}

pub async fn show(state: &AppState, user: &AuthUser, id: i64) -> Result<TicketDetails, AppError> {
    user.require(Capability::TicketView)?;
    let details = require_ticket(state, id).await?;
    let allowed = details.holder_id() == user.id()
        || user.has_any_role(&[Role::Admin, Role::Panitia])
        || is_owner(state, details.event.id, user.id()).await?;
    if !allowed {
        return Err(AppError::Forbidden(
            "You do not have access to this ticket".to_string(),
        ));
    }
    Ok(details)
}

/// Cancels an unused ticket. The ticket type's quota is left as it is.
pub async fn cancel(state: &AppState, user: &AuthUser, id: i64) -> Result<Ticket, AppError> {
    let details = require_ticket(state, id).await?;
    if details.holder_id() != user.id() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only cancel your own tickets".to_string(),
        ));
    }
    let ticket = state.store.cancel_ticket(id, Utc::now()).await?;
    info!(ticket_id = id, by = user.id(), "Ticket cancelled");
    Ok(ticket)
}

pub async fn statistics(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
) -> Result<TicketStatistics, AppError> {
    require_manager(state, user, event_id).await?;
    let counts = state.store.ticket_counts(event_id).await?;
    Ok(TicketStatistics {
        event_id,
        check_in_percentage: check_in_percentage(&counts),
        counts,
    })
}

/// Tickets of one event for its owner or an admin, filtered by lifecycle and attendance.
pub async fn tickets_for_event(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
    query: EventTicketQuery,
) -> Result<Vec<TicketDetails>, AppError> {
    user.require(Capability::TicketView)?;
    require_manager(state, user, event_id).await?;
    let filter = TicketFilter {
        status: query
            .status
            .map(|s| s.parse::<TicketStatus>())
            .transpose()
            .map_err(AppError::ValidationError)?,
        attendance: query
            .attendance
            .map(|a| a.parse::<Attendance>())
            .transpose()
            .map_err(AppError::ValidationError)?,
    };
    state.store.tickets_for_event(event_id, filter).await
}

pub async fn scan_for_ticket(
    state: &AppState,
    user: &AuthUser,
    ticket_id: i64,
) -> Result<Option<ScanEntry>, AppError> {
    user.require(Capability::TicketVerify)?;
    require_ticket(state, ticket_id).await?;
    state.store.scan_for_ticket(ticket_id).await
}

pub async fn scans_for_event(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
) -> Result<Vec<ScanEntry>, AppError> {
    user.require(Capability::TicketVerify)?;
    require_event(state, event_id).await?;
    state.store.scans_for_event(event_id).await
}

/// Scans recorded by `scanner_id`. Scanners may read their own, admins anyone's.
pub async fn scans_by_user(
    state: &AppState,
    user: &AuthUser,
    scanner_id: i64,
) -> Result<Vec<ScanEntry>, AppError> {
    if scanner_id != user.id() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only view your own scan history".to_string(),
        ));
    }
    state.store.scans_by_user(scanner_id).await
}

fn require_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only admins can view scan history across events".to_string(),
        ))
    }
}

pub async fn all_scans(
    state: &AppState,
    user: &AuthUser,
    query: ScanPageQuery,
) -> Result<ScanPage, AppError> {
    require_admin(user)?;
    let per_page = query.limit.clamp(1, MAX_SCAN_PAGE);
    let current_page = query.page.max(1);
    let (entries, total) = state
        .store
        .list_scans(per_page, (current_page - 1) * per_page)
        .await?;
    Ok(ScanPage {
        entries,
        total,
        current_page,
        per_page,
        last_page: ((total + per_page - 1) / per_page).max(1),
    })
}

pub async fn scan_statistics(state: &AppState, user: &AuthUser) -> Result<ScanStatistics, AppError> {
    require_admin(user)?;
    let (day_start, month_start) = period_starts(Utc::now());
    state.store.scan_statistics(day_start, month_start).await
}
