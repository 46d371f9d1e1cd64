use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::validation::{field_errors, not_blank, FieldErrors};

const FALLBACK_SLUG: &str = "event";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub venue: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_paid: bool,
    pub banner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Upcoming,
    Ongoing,
    Finished,
}

impl Event {
    pub fn phase(&self, now: DateTime<Utc>) -> EventPhase {
        if self.start_time > now {
            EventPhase::Upcoming
        } else if self.end_time < now {
            EventPhase::Finished
        } else {
            EventPhase::Ongoing
        }
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == EventPhase::Finished
    }
}

/// A row of the event membership table. Exactly one member per event owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMember {
    pub event_id: i64,
    pub user_id: i64,
    pub is_owner: bool,
}

const INVERTED_WINDOW: &str = "The end time must be a date after or equal to start time.";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewEvent {
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The name may not be greater than 255 characters.")
    )]
    pub name: String,
    pub description: Option<String>,
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The venue may not be greater than 255 characters.")
    )]
    pub venue: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_paid: bool,
    pub banner: Option<String>,
}

impl NewEvent {
    /// Field rules plus the time window check.
    pub fn check(&self) -> FieldErrors {
        let mut errors = field_errors(self);
        if self.end_time < self.start_time {
            errors.add("end_time", INVERTED_WINDOW);
        }
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EventPatch {
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The name may not be greater than 255 characters.")
    )]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(
        custom(function = "not_blank"),
        length(max = 255, message = "The venue may not be greater than 255 characters.")
    )]
    pub venue: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_paid: Option<bool>,
    pub banner: Option<String>,
}

impl EventPatch {
    /// Checks the patch against the event it will be applied to.
    pub fn check(&self, current: &Event) -> FieldErrors {
        let mut errors = field_errors(self);
        let start = self.start_time.unwrap_or(current.start_time);
        let end = self.end_time.unwrap_or(current.end_time);
        if end < start {
            errors.add("end_time", INVERTED_WINDOW);
        }
        errors
    }

    pub fn apply(self, event: &mut Event, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            event.name = name;
        }
        if let Some(description) = self.description {
            event.description = Some(description);
        }
        if let Some(venue) = self.venue {
            event.venue = venue;
        }
        if let Some(start_time) = self.start_time {
            event.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            event.end_time = end_time;
        }
        if let Some(is_paid) = self.is_paid {
            event.is_paid = is_paid;
        }
        if let Some(banner) = self.banner {
            event.banner = Some(banner);
        }
        event.updated_at = now;
    }
}

/// Lowercase ASCII slug; runs of other characters collapse into one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// First of `base`, `base-1`, `base-2`, ... for which `taken` is false.
pub fn unique_slug(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
