pub mod cache;
pub mod extractor;
pub mod identity;
pub mod rbac;
pub mod session;

pub use extractor::AuthUser;
pub use rbac::{Capability, Role};
