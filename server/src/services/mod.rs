pub mod auth;
pub mod checkin;
pub mod events;
pub mod rbac;
pub mod transactions;
pub mod users;
pub mod webhook;
