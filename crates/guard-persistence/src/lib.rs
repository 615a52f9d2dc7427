//! Persistence for the trade guardrail engine.
//!
//! - `store`: key/value record store abstraction with an in-memory backend
//! - `audit`: append-only, per-user audit log with sequence numbers
//! - `writer`: optional JSON Lines sink with daily file rotation

pub mod audit;
pub mod error;
pub mod store;
pub mod writer;

pub use audit::{AuditActor, AuditEntry, AuditEvent, AuditLog, AuditRecord};
pub use error::{PersistenceError, PersistenceResult};
pub use store::{InMemoryStore, RecordStore};
pub use writer::JsonLinesWriter;
