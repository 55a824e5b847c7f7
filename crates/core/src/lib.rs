//! `taskmgr-core`: shared identifiers and the domain error model.
//!
//! This crate contains no infrastructure or transport concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AuditEntryId, CorrelationId, SessionId, TaskId};
