//! Shared domain types for the Pathway gateway.
//!
//! This crate holds the entity structs exchanged with the backend services
//! and the [`EntityType`] enum that cache keys and invalidation rules are
//! derived from. It carries no I/O and no business logic.

pub mod entity;
pub mod types;

pub use entity::EntityType;
pub use types::{EngagementReport, Iep, IepStatus, Student, TenantScoped, TenantSettings};
