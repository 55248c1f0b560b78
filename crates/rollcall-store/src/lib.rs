//! rollcall-store — SQLite persistence for the attendance system.
//!
//! Owns the three persisted entities: identities (with their enrollment
//! embeddings), sessions, and the append-only attendance ledger. The
//! ledger's duplicate-prevention invariant is enforced here with a
//! UNIQUE constraint, not just by the caller's pre-check.

pub mod db;
pub mod records;

pub use db::{AttendanceDb, StoreError};
pub use records::{AttendanceRecord, AttendanceStatus, ReportRow, Session, DEFAULT_SESSION_MINUTES};
