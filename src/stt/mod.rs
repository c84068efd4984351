//! Speech recognition for HearSay.
//!
//! A single whisper model instance is shared process-wide: loading the model
//! is expensive, so it happens at most once and every request reuses it.

mod whisper;

pub use whisper::WhisperRecognizer;

use serde::Serialize;

/// A timestamped span of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechSegment {
    /// Segment start time in seconds.
    pub start: f64,
    /// Segment end time in seconds.
    pub end: f64,
    /// Text content for this segment.
    pub text: String,
}

/// Full recognition output for one audio file.
#[derive(Debug, Clone)]
pub struct Recognition {
    /// Space-joined, trimmed transcript text.
    pub text: String,
    /// Detected source language code, or "unknown".
    pub language: String,
    /// Audio duration in seconds.
    pub duration_sec: f64,
    /// Chronological recognition segments.
    pub segments: Vec<SpeechSegment>,
}
