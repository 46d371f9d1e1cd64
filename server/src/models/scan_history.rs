use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single check-in record of a ticket. Its existence marks the ticket scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHistory {
    pub id: i64,
    pub ticket_id: i64,
    pub scanned_by: i64,
    pub scanned_at: DateTime<Utc>,
}
