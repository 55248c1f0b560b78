//! rollcall-capture — The boundary to the external capture pipeline.
//!
//! Frame acquisition and face detection/encoding live outside this
//! system; what crosses the boundary is a stream of per-frame detected
//! faces, each carrying a fixed-length embedding. This crate defines the
//! trait seams for that stream plus the wall clock, and ships a JSON
//! Lines feed reader for pre-encoded captures.

pub mod clock;
pub mod source;

pub use clock::{Clock, SystemClock};
pub use source::{CaptureError, DetectedFace, FaceEncoder, FrameSource, JsonlFeed, PreEncoded};
