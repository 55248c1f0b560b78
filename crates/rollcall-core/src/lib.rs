//! rollcall-core — Face-embedding matching and enrollment.
//!
//! Pure decision logic: Euclidean nearest-neighbor matching against an
//! enrolled roster, and sample averaging for registration. No I/O.

pub mod enroll;
pub mod types;

pub use enroll::{average_embeddings, EnrollError};
pub use types::{
    find_best_match, BoundingBox, Embedding, EuclideanMatcher, MatchResult, Matcher, RosterEntry,
    EMBEDDING_DIM, MATCH_DISTANCE_THRESHOLD,
};
