//! Store seams
//!
//! Durable storage abstractions consumed by the orchestrator and agents:
//! - PlanStore: plans by id, last-writer-wins
//! - MemoryStore: agent memories with similarity recall
//! - AuditSink: append-only transition log, at-least-once
//!
//! Implementations are in the steward-stores crate.

mod audit_sink;
mod memory_store;
mod plan_store;

pub use audit_sink::AuditSink;
pub use memory_store::MemoryStore;
pub use plan_store::{PlanFilter, PlanStore};

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}
