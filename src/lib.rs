//! HearSay - Multilingual transcription to English
//!
//! HearSay converts YouTube videos and uploaded audio/video files into an
//! English transcript. It auto-detects the spoken language and translates
//! the result to English, degrading gracefully to the original text when
//! every translation provider is down.
//!
//! # Overview
//!
//! One request drives one pipeline instance to completion:
//!
//! 1. Normalize the YouTube reference (or accept an uploaded file)
//! 2. Acquire a local audio file (yt-dlp) or normalize the upload (ffmpeg)
//! 3. Recognize speech with a shared local whisper model
//! 4. Translate to English (DeepL, falling back to Google Translate)
//!
//! Temporary files are request-scoped and removed when the pipeline ends,
//! whatever the outcome.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `youtube` - Reference normalization and yt-dlp acquisition
//! - `media` - Upload handling and ffmpeg audio normalization
//! - `stt` - Speech recognition
//! - `translate` - Translation providers with retry and fallback
//! - `pipeline` - Stage sequencing and cleanup
//! - `server` - HTTP API

pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod server;
pub mod stt;
pub mod translate;
pub mod youtube;

pub use error::{HearsayError, Result};
