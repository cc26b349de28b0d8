//! HTTP handlers for registration, dynamic execution, registry/audit administration and users.

pub mod audits;
pub mod dynamic;
pub mod services;
pub mod users;
