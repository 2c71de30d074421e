//! # meridian-common
//!
//! Shared configuration, validation, and logging setup used across all Meridian crates.
//! This is the foundation layer — no protocol logic, just primitives and contracts.

pub mod config;
pub mod telemetry;
pub mod validation;
