//! API route modules.

pub mod federation;
pub mod health;
