//! Attendance decision engine.
//!
//! Owns the in-memory roster (loaded once from the store, appended to by
//! registration, never re-read mid-run) and applies the marking rules:
//! resolve the session by its (name, subject) key, enforce the session's
//! time window, reject duplicates, append to the ledger. Every rejection
//! is a reported outcome, never a loop abort.

use std::collections::HashSet;

use chrono::Timelike;
use rollcall_capture::{CaptureError, Clock, FaceEncoder, FrameSource};
use rollcall_core::{
    average_embeddings, EnrollError, EuclideanMatcher, Matcher, RosterEntry,
};
use rollcall_store::{
    AttendanceDb, AttendanceRecord, AttendanceStatus, ReportRow, Session, StoreError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("no session named '{name}' for subject '{subject}'")]
    SessionNotFound { name: String, subject: String },
    #[error("session '{name}' closed {duration_minutes} minutes after start; marking window expired")]
    SessionWindowExpired { name: String, duration_minutes: i64 },
    #[error("identity {identity_id} is already marked present for this session today")]
    DuplicateAttendance { identity_id: i64 },
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("no enrolled identities to match against")]
    EmptyEmbeddingStore,
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),
    #[error("enroll: {0}")]
    Enroll(#[from] EnrollError),
}

/// In-memory embedding store: the enrolled identities eligible for
/// matching. Built once at engine construction; the only mutation is the
/// append made by [`AttendanceEngine::register`].
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn load(db: &AttendanceDb) -> Result<Self, StoreError> {
        let entries = db.load_enrolled()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: RosterEntry) {
        self.entries.push(entry);
    }
}

/// Outcome of one attendance run over a capture feed.
#[derive(Debug, Default)]
pub struct AttendanceSummary {
    pub frames: usize,
    pub faces: usize,
    /// (identity id, name) of everyone newly marked present, in marking order.
    pub marked: Vec<(i64, String)>,
    /// Faces that matched no enrolled identity under the threshold.
    pub unknown: usize,
    /// Recognized identities already marked for this session today.
    pub duplicate: usize,
    /// Recognized identities rejected because the window had closed.
    pub expired: usize,
}

pub struct AttendanceEngine<C: Clock> {
    db: AttendanceDb,
    roster: Roster,
    matcher: EuclideanMatcher,
    threshold: f32,
    clock: C,
}

impl<C: Clock> AttendanceEngine<C> {
    pub fn new(db: AttendanceDb, clock: C, threshold: f32) -> Result<Self, AttendanceError> {
        let roster = Roster::load(&db)?;
        tracing::info!(enrolled = roster.len(), "roster loaded");
        Ok(Self {
            db,
            roster,
            matcher: EuclideanMatcher,
            threshold,
            clock,
        })
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Register a new identity: drain up to `frames` frames from the
    /// source, keep the first detected face's embedding per frame, store
    /// the component-wise mean, and append the identity to the roster so
    /// it is matchable in the same run.
    pub fn register<S, E>(
        &mut self,
        name: &str,
        source: &mut S,
        encoder: &mut E,
        frames: usize,
    ) -> Result<RosterEntry, AttendanceError>
    where
        S: FrameSource,
        E: FaceEncoder<Frame = S::Frame>,
    {
        let mut samples = Vec::new();
        let mut captured = 0usize;

        while captured < frames {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            captured += 1;

            if let Some(face) = encoder.encode(&frame)?.into_iter().next() {
                samples.push(face.embedding);
            }
        }

        if samples.is_empty() {
            return Err(AttendanceError::NoFaceDetected);
        }

        let embedding = average_embeddings(&samples)?;
        let registered_on = self.clock.now().date();
        let id = self.db.register_identity(name, &embedding, registered_on)?;

        tracing::info!(id, name, samples = samples.len(), "registration complete");

        let entry = RosterEntry {
            id,
            name: name.to_string(),
            embedding,
        };
        self.roster.push(entry.clone());
        Ok(entry)
    }

    /// Open a new session. The window start is captured from the engine's
    /// clock at this moment; it is never caller-supplied.
    pub fn create_session(
        &self,
        name: &str,
        subject: &str,
        duration_minutes: i64,
    ) -> Result<Session, AttendanceError> {
        let started_at = self.clock.now();
        Ok(self
            .db
            .create_session(name, subject, started_at, duration_minutes)?)
    }

    /// Mark one identity present in the session addressed by its
    /// (name, subject) key, applying the full decision sequence.
    pub fn mark(
        &self,
        identity_id: i64,
        session_name: &str,
        subject: &str,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let session = self.resolve_session(session_name, subject)?;
        self.mark_in_session(identity_id, &session)
    }

    /// Run attendance over a capture feed until end of stream.
    ///
    /// Each detected face is matched independently; recognized identities
    /// go through the marking sequence once, then an in-run set
    /// short-circuits repeated detections. The set is a query-saving
    /// optimization only; the ledger constraint remains the authoritative
    /// duplicate guard.
    pub fn take_attendance<S, E>(
        &self,
        session_name: &str,
        subject: &str,
        source: &mut S,
        encoder: &mut E,
    ) -> Result<AttendanceSummary, AttendanceError>
    where
        S: FrameSource,
        E: FaceEncoder<Frame = S::Frame>,
    {
        if self.roster.is_empty() {
            return Err(AttendanceError::EmptyEmbeddingStore);
        }

        // Fail fast on an unknown session before consuming the feed.
        let session = self.resolve_session(session_name, subject)?;
        tracing::info!(
            session = session.id,
            name = session_name,
            subject,
            "attendance run started"
        );

        let mut summary = AttendanceSummary::default();
        let mut processed: HashSet<i64> = HashSet::new();

        while let Some(frame) = source.next_frame()? {
            summary.frames += 1;

            for face in encoder.encode(&frame)? {
                summary.faces += 1;

                let result =
                    self.matcher
                        .compare(&face.embedding, self.roster.entries(), self.threshold);
                let (Some(identity_id), Some(name)) = (result.identity_id, result.identity_name)
                else {
                    summary.unknown += 1;
                    tracing::debug!(
                        distance = result.distance,
                        "face matched no enrolled identity"
                    );
                    continue;
                };

                if processed.contains(&identity_id) {
                    continue;
                }

                match self.mark(identity_id, session_name, subject) {
                    Ok(record) => {
                        tracing::info!(
                            identity = identity_id,
                            name = %name,
                            time = %record.time.format("%H:%M:%S"),
                            "marked present"
                        );
                        processed.insert(identity_id);
                        summary.marked.push((identity_id, name));
                    }
                    Err(AttendanceError::DuplicateAttendance { .. }) => {
                        // A ledger duplicate cannot un-duplicate within a
                        // run, so absorb the identity into the set.
                        tracing::warn!(
                            identity = identity_id,
                            name = %name,
                            "already marked for this session today"
                        );
                        processed.insert(identity_id);
                        summary.duplicate += 1;
                    }
                    Err(AttendanceError::SessionWindowExpired { .. }) => {
                        tracing::warn!(
                            identity = identity_id,
                            name = %name,
                            "marking window expired"
                        );
                        summary.expired += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(summary)
    }

    /// Denormalized ledger view, most recent marks first.
    pub fn report(&self) -> Result<Vec<ReportRow>, AttendanceError> {
        Ok(self.db.attendance_report()?)
    }

    fn resolve_session(&self, name: &str, subject: &str) -> Result<Session, AttendanceError> {
        self.db
            .find_session(name, subject)?
            .ok_or_else(|| AttendanceError::SessionNotFound {
                name: name.to_string(),
                subject: subject.to_string(),
            })
    }

    fn mark_in_session(
        &self,
        identity_id: i64,
        session: &Session,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let now = self.clock.now();

        let elapsed_secs = (now - session.started_at).num_seconds();
        if elapsed_secs > session.duration_minutes * 60 {
            return Err(AttendanceError::SessionWindowExpired {
                name: session.name.clone(),
                duration_minutes: session.duration_minutes,
            });
        }

        if self.db.has_attendance(identity_id, session.id, now.date())? {
            return Err(AttendanceError::DuplicateAttendance { identity_id });
        }

        // Subsecond precision is not persisted.
        let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());

        match self.db.insert_attendance(
            identity_id,
            session.id,
            now.date(),
            time,
            AttendanceStatus::Present,
        ) {
            Ok(record) => Ok(record),
            // Raced by another writer between the pre-check and the
            // insert; the constraint is the authoritative guard.
            Err(StoreError::DuplicateAttendance { identity_id, .. }) => {
                Err(AttendanceError::DuplicateAttendance { identity_id })
            }
            Err(err) => Err(err.into()),
        }
    }
}
