use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Allowed marking window when a session is created without an explicit
/// duration.
pub const DEFAULT_SESSION_MINUTES: i64 = 10;

/// Attendance mark status. Only `Present` is ever produced; absences are
/// represented by the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Present,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
        }
    }
}

/// A named session with its marking window.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub subject: String,
    /// Full date+time of creation; elapsed-window checks compare against
    /// this, so sessions spanning midnight behave correctly.
    pub started_at: NaiveDateTime,
    pub duration_minutes: i64,
}

/// One row of the append-only attendance ledger.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub identity_id: i64,
    pub session_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AttendanceStatus,
}

/// Denormalized report row: ledger joined with identity and session names.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub session: String,
    pub subject: String,
    pub date: String,
    pub time: String,
    pub status: String,
}
