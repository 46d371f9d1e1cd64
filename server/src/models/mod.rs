pub mod event;
pub mod scan_history;
pub mod ticket;
pub mod ticket_type;
pub mod transaction;
pub mod user;
