use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::auth::{AuthUser, Capability, Role};
use crate::models::event::{Event, EventMember, EventPatch, EventPhase, NewEvent};
use crate::models::ticket_type::{Availability, NewTicketType, TicketType, TicketTypePatch};
use crate::state::AppState;
use crate::store::{ManagedEvent, TicketTypeFilter};
use crate::utils::error::AppError;
use crate::utils::validation::validate_request;

#[derive(Debug, Serialize)]
pub struct TicketTypeView {
    #[serde(flatten)]
    pub ticket_type: TicketType,
    pub is_free: bool,
    pub availability: Availability,
}

impl From<TicketType> for TicketTypeView {
    fn from(ticket_type: TicketType) -> Self {
        Self {
            is_free: ticket_type.is_free(),
            availability: ticket_type.availability(),
            ticket_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub phase: EventPhase,
    pub ticket_types: Vec<TicketTypeView>,
}

async fn view(state: &AppState, event: Event) -> Result<EventView, AppError> {
    let ticket_types = state
        .store
        .list_ticket_types(event.id)
        .await?
        .into_iter()
        .map(TicketTypeView::from)
        .collect();
    Ok(EventView {
        phase: event.phase(Utc::now()),
        event,
        ticket_types,
    })
}

pub async fn require_event(state: &AppState, event_id: i64) -> Result<Event, AppError> {
    state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))
}

pub async fn is_owner(state: &AppState, event_id: i64, user_id: i64) -> Result<bool, AppError> {
    Ok(state
        .store
        .event_members(event_id)
        .await?
        .iter()
        .any(|m| m.is_owner && m.user_id == user_id))
}

/// Loads the event if `user` owns it or is an admin.
pub async fn require_manager(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
) -> Result<Event, AppError> {
    let event = require_event(state, event_id).await?;
    if user.is_admin() || is_owner(state, event_id, user.id()).await? {
        Ok(event)
    } else {
        Err(AppError::Forbidden(
            "Only the event owner or an admin can manage this event".to_string(),
        ))
    }
}

/// Upcoming and ongoing events with their ticket types, for anonymous visitors.
pub async fn list_public(state: &AppState) -> Result<Vec<EventView>, AppError> {
    let now = Utc::now();
    let mut views = Vec::new();
    for event in state.store.list_events(None).await? {
        if !event.is_finished(now) {
            views.push(view(state, event).await?);
        }
    }
    Ok(views)
}

/// Admins see every event, organizers the ones they own, everyone else all of them.
pub async fn list_for(state: &AppState, user: &AuthUser) -> Result<Vec<Event>, AppError> {
    user.require(Capability::EventView)?;
    let owner = (user.has_role(Role::Eo) && !user.can(Capability::EventViewAll))
        .then(|| user.id());
    state.store.list_events(owner).await
}

/// Looks the event up by slug first, then by numeric id.
pub async fn show(state: &AppState, slug_or_id: &str) -> Result<EventView, AppError> {
    let by_slug = state.store.find_event_by_slug(slug_or_id).await?;
    let event = match by_slug {
        Some(event) => Some(event),
        None => match slug_or_id.parse::<i64>() {
            Ok(id) => state.store.find_event(id).await?,
            Err(_) => None,
        },
    };
    let event = event.ok_or_else(|| AppError::NotFound(format!("Event '{slug_or_id}' not found")))?;
    view(state, event).await
}

#[derive(Debug, Serialize)]
pub struct ManagedEventView {
    #[serde(flatten)]
    pub membership: ManagedEvent,
    /// `Owner` or `Panitia`.
    pub my_role: &'static str,
    pub can_manage: bool,
}

#[derive(Debug, Serialize)]
pub struct ManagedEvents {
    pub events: Vec<ManagedEventView>,
    pub total: usize,
    pub as_owner: usize,
    pub as_panitia: usize,
}

/// Events the caller owns or serves on as committee, latest first.
pub async fn list_managed(state: &AppState, user: &AuthUser) -> Result<ManagedEvents, AppError> {
    let events: Vec<ManagedEventView> = state
        .store
        .managed_events(user.id())
        .await?
        .into_iter()
        .map(|membership| ManagedEventView {
            my_role: if membership.is_owner {
                "Owner"
            } else {
                Role::Panitia.as_str()
            },
            can_manage: membership.is_owner,
            membership,
        })
        .collect();
    let as_owner = events.iter().filter(|e| e.can_manage).count();
    Ok(ManagedEvents {
        total: events.len(),
        as_panitia: events.len() - as_owner,
        as_owner,
        events,
    })
}

pub async fn create(state: &AppState, user: &AuthUser, new_event: NewEvent) -> Result<Event, AppError> {
    user.require(Capability::EventCreate)?;
    new_event.check().finish()?;
    let event = state
        .store
        .create_event(new_event, user.id(), Utc::now())
        .await?;
    info!(event_id = event.id, slug = %event.slug, owner = user.id(), "Event created");
    Ok(event)
}

pub async fn update(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
    patch: EventPatch,
) -> Result<Event, AppError> {
    user.require(Capability::EventUpdate)?;
    let current = require_manager(state, user, event_id).await?;
    patch.check(&current).finish()?;
    state.store.update_event(event_id, patch, Utc::now()).await
}

pub async fn delete(state: &AppState, user: &AuthUser, event_id: i64) -> Result<(), AppError> {
    user.require(Capability::EventDelete)?;
    require_manager(state, user, event_id).await?;
    state.store.delete_event(event_id).await?;
    info!(event_id, by = user.id(), "Event deleted");
    Ok(())
}

pub async fn members(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
) -> Result<Vec<EventMember>, AppError> {
    require_manager(state, user, event_id).await?;
    state.store.event_members(event_id).await
}

/// Adds a committee member; the user also gains the `Panitia` role.
pub async fn add_member(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
    member_id: i64,
) -> Result<EventMember, AppError> {
    user.require(Capability::EventUpdate)?;
    require_manager(state, user, event_id).await?;
    let member = state.store.add_event_member(event_id, member_id).await?;
    state.store.assign_role(member_id, Role::Panitia).await?;
    state.permissions.invalidate(member_id).await;
    info!(event_id, member_id, "Event member added");
    Ok(member)
}

pub async fn remove_member(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
    member_id: i64,
) -> Result<(), AppError> {
    user.require(Capability::EventUpdate)?;
    require_manager(state, user, event_id).await?;
    state.store.remove_event_member(event_id, member_id).await
}

pub async fn transfer_ownership(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
    new_owner_id: i64,
) -> Result<(), AppError> {
    user.require(Capability::EventUpdate)?;
    require_manager(state, user, event_id).await?;

    let new_owner_roles = state.store.user_roles(new_owner_id).await?;
    if !new_owner_roles
        .iter()
        .any(|role| matches!(role, Role::Eo | Role::Admin))
    {
        return Err(AppError::ValidationError(
            "The new owner must be an EO or an Admin".to_string(),
        ));
    }

    state.store.transfer_ownership(event_id, new_owner_id).await?;
    info!(event_id, from = user.id(), to = new_owner_id, "Event ownership transferred");
    Ok(())
}

pub async fn list_ticket_types(
    state: &AppState,
    user: &AuthUser,
    event_id: i64,
) -> Result<Vec<TicketTypeView>, AppError> {
    user.require(Capability::TicketTypeView)?;
    require_event(state, event_id).await?;
    Ok(state
        .store
        .list_ticket_types(event_id)
        .await?
        .into_iter()
        .map(TicketTypeView::from)
        .collect())
}

/// Every ticket type, optionally for one event. Organizers without
/// `event.view-all` only see their own events' types.
pub async fn list_all_ticket_types(
    state: &AppState,
    user: &AuthUser,
    event_id: Option<i64>,
) -> Result<Vec<TicketTypeView>, AppError> {
    user.require(Capability::TicketTypeView)?;
    let owner_id = (user.has_role(Role::Eo) && !user.can(Capability::EventViewAll))
        .then(|| user.id());
    Ok(state
        .store
        .search_ticket_types(TicketTypeFilter { event_id, owner_id })
        .await?
        .into_iter()
        .map(TicketTypeView::from)
        .collect())
}

pub async fn require_ticket_type(state: &AppState, id: i64) -> Result<TicketType, AppError> {
    state
        .store
        .find_ticket_type(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket type {id} not found")))
}

pub async fn show_ticket_type(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> Result<TicketTypeView, AppError> {
    user.require(Capability::TicketTypeView)?;
    Ok(require_ticket_type(state, id).await?.into())
}

#[derive(Debug, Serialize)]
pub struct AvailabilityCheck {
    pub ticket_type_id: i64,
    pub requested: i32,
    pub remaining: i32,
    pub available: bool,
    pub total_price: Decimal,
}

pub async fn check_availability(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    quantity: i32,
) -> Result<AvailabilityCheck, AppError> {
    user.require(Capability::TicketTypeView)?;
    if quantity < 1 {
        return Err(AppError::ValidationError(
            "Quantity must be at least 1".to_string(),
        ));
    }
    let ticket_type = require_ticket_type(state, id).await?;
    Ok(AvailabilityCheck {
        ticket_type_id: ticket_type.id,
        requested: quantity,
        remaining: ticket_type.quota,
        available: ticket_type.is_available(quantity),
        total_price: ticket_type.total_for(quantity),
    })
}

pub async fn create_ticket_type(
    state: &AppState,
    user: &AuthUser,
    new_type: NewTicketType,
) -> Result<TicketType, AppError> {
    user.require(Capability::TicketTypeCreate)?;
    validate_request(&new_type)?;
    require_manager(state, user, new_type.event_id).await?;
    state.store.create_ticket_type(new_type, Utc::now()).await
}

pub async fn update_ticket_type(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    patch: TicketTypePatch,
) -> Result<TicketType, AppError> {
    user.require(Capability::TicketTypeUpdate)?;
    validate_request(&patch)?;
    let ticket_type = require_ticket_type(state, id).await?;
    require_manager(state, user, ticket_type.event_id).await?;
    state.store.update_ticket_type(id, patch, Utc::now()).await
}

pub async fn delete_ticket_type(state: &AppState, user: &AuthUser, id: i64) -> Result<(), AppError> {
    user.require(Capability::TicketTypeDelete)?;
    let ticket_type = require_ticket_type(state, id).await?;
    require_manager(state, user, ticket_type.event_id).await?;
    state.store.delete_ticket_type(id).await
}
