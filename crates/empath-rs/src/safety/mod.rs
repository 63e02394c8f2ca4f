//! Crisis screening: keyword detection and the fixed safety response.
//!
//! - [`detector::CrisisDetector`] — case-insensitive, word-boundary keyword
//!   matching over participant messages, with atomic add/remove of keywords
//!   and a never-model-generated safety response.
//!
//! The harness runs the detector before every model call; a match
//! short-circuits the turn entirely (see
//! [`StudyHarness::respond`](crate::study::harness::StudyHarness::respond)).

pub mod detector;

pub use detector::{CrisisDetector, DetectorError};
