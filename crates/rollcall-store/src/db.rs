//! SQLite-backed attendance database.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::{Embedding, RosterEntry};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::records::{AttendanceRecord, AttendanceStatus, ReportRow, Session};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity {identity_id} has a corrupt embedding blob")]
    CorruptEmbedding { identity_id: i64 },
    #[error("session {id} has an unparseable start timestamp")]
    CorruptStartTime { id: i64 },
    #[error("session '{name}' for subject '{subject}' already exists")]
    DuplicateSession { name: String, subject: String },
    #[error("attendance already recorded for identity {identity_id} in session {session_id} on {date}")]
    DuplicateAttendance {
        identity_id: i64,
        session_id: i64,
        date: NaiveDate,
    },
}

/// Handle to the attendance database.
///
/// Single-connection, single-threaded use; cross-process duplicate marks
/// are prevented by the ledger's UNIQUE constraint rather than by the
/// caller's check-then-insert sequence.
pub struct AttendanceDb {
    conn: Connection,
}

impl AttendanceDb {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS identities (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            embedding BLOB,
            registered_on TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT NOT NULL,
            started_at TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL DEFAULT 10,
            UNIQUE (name, subject)
        );

        CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY,
            identity_id INTEGER NOT NULL,
            session_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            status TEXT NOT NULL,
            UNIQUE (identity_id, session_id, date),
            FOREIGN KEY (identity_id) REFERENCES identities(id),
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE INDEX IF NOT EXISTS idx_attendance_date_time
        ON attendance(date DESC, time DESC);
    ";

    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "attendance database opened");
        Self::initialize(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Persist a new identity with its averaged enrollment embedding.
    ///
    /// Embeddings are immutable once stored; registering the same name
    /// again creates a distinct identity record.
    pub fn register_identity(
        &self,
        name: &str,
        embedding: &Embedding,
        registered_on: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO identities (name, embedding, registered_on) VALUES (?1, ?2, ?3)",
            params![
                name,
                embedding.to_le_bytes(),
                registered_on.format(DATE_FMT).to_string()
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(id, name, "identity registered");
        Ok(id)
    }

    /// Load every identity that has an embedding. Identities with a NULL
    /// embedding are skipped.
    pub fn load_enrolled(&self) -> Result<Vec<RosterEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, embedding FROM identities WHERE embedding IS NOT NULL ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            Ok((id, name, blob))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, name, blob) = row?;
            let embedding = Embedding::from_le_bytes(&blob)
                .ok_or(StoreError::CorruptEmbedding { identity_id: id })?;
            entries.push(RosterEntry {
                id,
                name,
                embedding,
            });
        }
        Ok(entries)
    }

    /// Store a new session. `started_at` is the creation instant captured
    /// by the caller's clock; (name, subject) must be unique.
    pub fn create_session(
        &self,
        name: &str,
        subject: &str,
        started_at: NaiveDateTime,
        duration_minutes: i64,
    ) -> Result<Session, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO sessions (name, subject, started_at, duration_minutes)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                subject,
                started_at.format(DATETIME_FMT).to_string(),
                duration_minutes
            ],
        );

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::DuplicateSession {
                    name: name.to_string(),
                    subject: subject.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        }

        let id = self.conn.last_insert_rowid();
        tracing::info!(id, name, subject, duration_minutes, "session created");
        Ok(Session {
            id,
            name: name.to_string(),
            subject: subject.to_string(),
            started_at,
            duration_minutes,
        })
    }

    /// Composite-key session lookup. Unambiguous: (name, subject) is
    /// unique by construction.
    pub fn find_session(&self, name: &str, subject: &str) -> Result<Option<Session>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, started_at, duration_minutes FROM sessions
                 WHERE name = ?1 AND subject = ?2",
                params![name, subject],
                |row| {
                    let id: i64 = row.get(0)?;
                    let started_at: String = row.get(1)?;
                    let duration_minutes: i64 = row.get(2)?;
                    Ok((id, started_at, duration_minutes))
                },
            )
            .optional()?;

        let Some((id, started_at, duration_minutes)) = row else {
            return Ok(None);
        };

        let started_at = NaiveDateTime::parse_from_str(&started_at, DATETIME_FMT)
            .map_err(|_| StoreError::CorruptStartTime { id })?;

        Ok(Some(Session {
            id,
            name: name.to_string(),
            subject: subject.to_string(),
            started_at,
            duration_minutes,
        }))
    }

    /// Whether the ledger already holds a mark for this identity, session
    /// and date.
    pub fn has_attendance(
        &self,
        identity_id: i64,
        session_id: i64,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT id FROM attendance
                 WHERE identity_id = ?1 AND session_id = ?2 AND date = ?3",
                params![identity_id, session_id, date.format(DATE_FMT).to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Append a mark to the ledger. A UNIQUE violation on
    /// (identity, session, date) surfaces as `DuplicateAttendance`, which
    /// closes the check-then-insert race between concurrent processes.
    pub fn insert_attendance(
        &self,
        identity_id: i64,
        session_id: i64,
        date: NaiveDate,
        time: NaiveTime,
        status: AttendanceStatus,
    ) -> Result<AttendanceRecord, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO attendance (identity_id, session_id, date, time, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                identity_id,
                session_id,
                date.format(DATE_FMT).to_string(),
                time.format(TIME_FMT).to_string(),
                status.as_str()
            ],
        );

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::DuplicateAttendance {
                    identity_id,
                    session_id,
                    date,
                })
            }
            Err(err) => return Err(err.into()),
        }

        Ok(AttendanceRecord {
            id: self.conn.last_insert_rowid(),
            identity_id,
            session_id,
            date,
            time,
            status,
        })
    }

    /// Denormalized ledger view, most recent marks first.
    pub fn attendance_report(&self) -> Result<Vec<ReportRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT i.name, s.name AS session, s.subject, a.date, a.time, a.status
             FROM attendance a
             JOIN identities i ON a.identity_id = i.id
             JOIN sessions s ON a.session_id = s.id
             ORDER BY a.date DESC, a.time DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ReportRow {
                name: row.get(0)?,
                session: row.get(1)?,
                subject: row.get(2)?,
                date: row.get(3)?,
                time: row.get(4)?,
                status: row.get(5)?,
            })
        })?;

        let mut report = Vec::new();
        for row in rows {
            report.push(row?);
        }
        Ok(report)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FMT).unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, TIME_FMT).unwrap()
    }

    fn datetime(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FMT).unwrap()
    }

    #[test]
    fn test_register_and_load_enrolled() {
        let db = AttendanceDb::open_in_memory().unwrap();
        let embedding = Embedding::new(vec![0.5, -0.25, 1.0]);
        let id = db
            .register_identity("ada", &embedding, date("2026-03-02"))
            .unwrap();

        let roster = db.load_enrolled().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, id);
        assert_eq!(roster[0].name, "ada");
        assert_eq!(roster[0].embedding, embedding);
    }

    #[test]
    fn test_load_skips_null_embeddings() {
        let db = AttendanceDb::open_in_memory().unwrap();
        db.register_identity("ada", &Embedding::new(vec![1.0]), date("2026-03-02"))
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO identities (name, embedding, registered_on)
                 VALUES ('ghost', NULL, '2026-03-02')",
                [],
            )
            .unwrap();

        let roster = db.load_enrolled().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "ada");
    }

    #[test]
    fn test_load_rejects_corrupt_blob() {
        let db = AttendanceDb::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO identities (name, embedding, registered_on)
                 VALUES ('bad', x'0102', '2026-03-02')",
                [],
            )
            .unwrap();

        assert!(matches!(
            db.load_enrolled(),
            Err(StoreError::CorruptEmbedding { .. })
        ));
    }

    #[test]
    fn test_re_registration_creates_new_identity() {
        let db = AttendanceDb::open_in_memory().unwrap();
        let first = db
            .register_identity("ada", &Embedding::new(vec![1.0]), date("2026-03-02"))
            .unwrap();
        let second = db
            .register_identity("ada", &Embedding::new(vec![2.0]), date("2026-03-03"))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(db.load_enrolled().unwrap().len(), 2);
    }

    #[test]
    fn test_create_and_find_session() {
        let db = AttendanceDb::open_in_memory().unwrap();
        let created = db
            .create_session("morning", "physics", datetime("2026-03-02 09:00:00"), 10)
            .unwrap();

        let found = db.find_session("morning", "physics").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.started_at, datetime("2026-03-02 09:00:00"));
        assert_eq!(found.duration_minutes, 10);

        assert!(db.find_session("morning", "chemistry").unwrap().is_none());
        assert!(db.find_session("evening", "physics").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let db = AttendanceDb::open_in_memory().unwrap();
        db.create_session("morning", "physics", datetime("2026-03-02 09:00:00"), 10)
            .unwrap();

        let err = db
            .create_session("morning", "physics", datetime("2026-03-02 10:00:00"), 15)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSession { .. }));
    }

    #[test]
    fn test_attendance_insert_and_duplicate_constraint() {
        let db = AttendanceDb::open_in_memory().unwrap();
        let identity = db
            .register_identity("ada", &Embedding::new(vec![1.0]), date("2026-03-02"))
            .unwrap();
        let session = db
            .create_session("morning", "physics", datetime("2026-03-02 09:00:00"), 10)
            .unwrap();

        assert!(!db
            .has_attendance(identity, session.id, date("2026-03-02"))
            .unwrap());

        let record = db
            .insert_attendance(
                identity,
                session.id,
                date("2026-03-02"),
                time("09:01:30"),
                AttendanceStatus::Present,
            )
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);

        assert!(db
            .has_attendance(identity, session.id, date("2026-03-02"))
            .unwrap());

        // Second insert hits the UNIQUE constraint directly, without any
        // application-level pre-check.
        let err = db
            .insert_attendance(
                identity,
                session.id,
                date("2026-03-02"),
                time("09:05:00"),
                AttendanceStatus::Present,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAttendance { .. }));

        // A different day is a fresh mark.
        db.insert_attendance(
            identity,
            session.id,
            date("2026-03-03"),
            time("09:01:00"),
            AttendanceStatus::Present,
        )
        .unwrap();
    }

    #[test]
    fn test_report_orders_by_date_then_time_descending() {
        let db = AttendanceDb::open_in_memory().unwrap();
        let identity = db
            .register_identity("ada", &Embedding::new(vec![1.0]), date("2026-03-01"))
            .unwrap();
        let s1 = db
            .create_session("morning", "physics", datetime("2026-03-01 09:00:00"), 10)
            .unwrap();
        let s2 = db
            .create_session("afternoon", "physics", datetime("2026-03-01 14:00:00"), 10)
            .unwrap();

        db.insert_attendance(
            identity,
            s1.id,
            date("2026-03-01"),
            time("09:01:00"),
            AttendanceStatus::Present,
        )
        .unwrap();
        db.insert_attendance(
            identity,
            s2.id,
            date("2026-03-01"),
            time("14:02:00"),
            AttendanceStatus::Present,
        )
        .unwrap();
        db.insert_attendance(
            identity,
            s1.id,
            date("2026-03-02"),
            time("09:00:30"),
            AttendanceStatus::Present,
        )
        .unwrap();

        let report = db.attendance_report().unwrap();
        assert_eq!(report.len(), 3);
        assert_eq!((report[0].date.as_str(), report[0].time.as_str()), ("2026-03-02", "09:00:30"));
        assert_eq!((report[1].date.as_str(), report[1].time.as_str()), ("2026-03-01", "14:02:00"));
        assert_eq!((report[2].date.as_str(), report[2].time.as_str()), ("2026-03-01", "09:01:00"));
        assert_eq!(report[0].session, "morning");
        assert_eq!(report[0].subject, "physics");
        assert_eq!(report[0].status, "Present");
    }
}
