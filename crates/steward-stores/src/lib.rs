//! # Steward Stores
//!
//! In-memory implementations of the store seams, for development and
//! testing:
//! - `InMemoryPlanStore`: plans by id, last-writer-wins
//! - `InMemoryMemoryStore`: agent memories with TTL expiry and similarity
//!   recall (embedding cosine when available, token overlap otherwise)
//! - `InMemoryAuditSink`: append-only audit journal
//! - `BufferedAuditSink`: bounded queue + dedicated flusher in front of any
//!   inner sink; a full buffer back-pressures the caller

mod audit;
mod memory_store;
mod plan_store;

pub use audit::{BufferedAuditSink, InMemoryAuditSink};
pub use memory_store::InMemoryMemoryStore;
pub use plan_store::InMemoryPlanStore;
