//! Request pipeline for HearSay.
//!
//! Sequences acquisition, audio normalization, recognition, and translation
//! for one request, and guarantees that every temporary file created along
//! the way is cleaned up whether the run succeeds or fails.

use crate::config::Settings;
use crate::error::Result;
use crate::media;
use crate::stt::{SpeechSegment, WhisperRecognizer};
use crate::translate::Translator;
use crate::youtube;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Terminal artifact of one transcription request.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// Where the media came from: "youtube" or "upload".
    pub source: &'static str,
    /// Detected source language code, or "unknown".
    pub detected_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    pub transcript_original: String,
    pub transcript_english: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SpeechSegment>>,
    pub translation_status: TranslationStatus,
}

/// Whether the English text is a real translation or a degraded copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    Ok,
    Failed,
}

/// Scoped guard over request-owned temporary files.
///
/// Dropping the guard deletes every tracked file best-effort; deletion
/// failures are logged and never surface, so cleanup can't mask the
/// request's primary outcome.
#[derive(Default)]
struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// The media-to-transcript pipeline.
///
/// One instance serves all requests; per-request state lives on the stack
/// of the `run_*` call.
pub struct Pipeline {
    settings: Settings,
    recognizer: Arc<WhisperRecognizer>,
    translator: Arc<Translator>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        recognizer: Arc<WhisperRecognizer>,
        translator: Arc<Translator>,
    ) -> Self {
        Self {
            settings,
            recognizer,
            translator,
        }
    }

    /// Transcribe from a YouTube reference (URL, bare ID, or ID&t=...).
    ///
    /// The downloaded file is already canonical audio, so no transcode
    /// stage runs on this path.
    #[instrument(skip(self))]
    pub async fn run_youtube(&self, raw_value: &str) -> Result<TranscriptionResult> {
        let mut scratch = TempFiles::default();

        let target = youtube::normalize(raw_value)?;
        info!("Normalized reference to video {}", target.video_id);

        let audio = youtube::download_best_audio(
            &target,
            &self.settings.download_dir(),
            &self.settings.youtube,
        )
        .await?;
        scratch.track(audio.clone());

        self.finish("youtube", &audio).await
    }

    /// Transcribe from an uploaded file stream.
    #[instrument(skip(self, stream, filename))]
    pub async fn run_upload<S, E>(
        &self,
        stream: S,
        mime: &str,
        filename: Option<&str>,
    ) -> Result<TranscriptionResult>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut scratch = TempFiles::default();

        let saved =
            media::save_upload(stream, mime, filename, &self.settings.upload_dir()).await?;
        scratch.track(saved.clone());

        // distinct output name so an uploaded .m4a is never clobbered in place
        let audio =
            media::extract_audio_to_m4a(&saved, &saved.with_extension("norm.m4a")).await?;
        scratch.track(audio.clone());

        self.finish("upload", &audio).await
    }

    /// Shared tail: recognize, translate with degradation, assemble.
    async fn finish(&self, source: &'static str, audio: &Path) -> Result<TranscriptionResult> {
        let recognition = self.recognizer.transcribe(audio).await?;

        let (transcript_english, translation_status) =
            match self.translator.to_english(&recognition.text).await {
                Ok(translated) => (translated, TranslationStatus::Ok),
                Err(e) => {
                    warn!("Translation failed; returning original transcript: {}", e);
                    (recognition.text.clone(), TranslationStatus::Failed)
                }
            };

        Ok(TranscriptionResult {
            source,
            detected_language: recognition.language,
            duration_sec: Some(recognition.duration_sec),
            transcript_original: recognition.text,
            transcript_english,
            segments: if recognition.segments.is_empty() {
                None
            } else {
                Some(recognition.segments)
            },
            translation_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.m4a");
        let tracked = dir.path().join("tracked.m4a");
        std::fs::write(&kept, b"k").unwrap();
        std::fs::write(&tracked, b"t").unwrap();

        {
            let mut scratch = TempFiles::default();
            scratch.track(tracked.clone());
        }

        assert!(kept.exists());
        assert!(!tracked.exists());
    }

    #[test]
    fn test_temp_files_tolerates_missing() {
        let mut scratch = TempFiles::default();
        scratch.track(PathBuf::from("/nonexistent/never-there.m4a"));
        drop(scratch); // must not panic
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = TranscriptionResult {
            source: "upload",
            detected_language: "no".to_string(),
            duration_sec: Some(12.5),
            transcript_original: "hei".to_string(),
            transcript_english: "hello".to_string(),
            segments: Some(vec![SpeechSegment {
                start: 0.0,
                end: 1.5,
                text: "hei".to_string(),
            }]),
            translation_status: TranslationStatus::Ok,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], "upload");
        assert_eq!(json["detected_language"], "no");
        assert_eq!(json["duration_sec"], 12.5);
        assert_eq!(json["transcript_original"], "hei");
        assert_eq!(json["transcript_english"], "hello");
        assert_eq!(json["translation_status"], "ok");
        assert_eq!(json["segments"][0]["start"], 0.0);
        assert_eq!(json["segments"][0]["end"], 1.5);
        assert_eq!(json["segments"][0]["text"], "hei");
    }

    #[test]
    fn test_empty_segments_are_omitted() {
        let result = TranscriptionResult {
            source: "youtube",
            detected_language: "unknown".to_string(),
            duration_sec: None,
            transcript_original: String::new(),
            transcript_english: String::new(),
            segments: None,
            translation_status: TranslationStatus::Failed,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("segments").is_none());
        assert!(json.get("duration_sec").is_none());
        assert_eq!(json["translation_status"], "failed");
    }
}
