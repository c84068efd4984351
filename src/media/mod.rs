//! Media file handling.
//!
//! Accepts uploaded files, validates media types, and drives ffmpeg to
//! produce the canonical audio encoding (mono, 16 kHz, AAC in m4a) fed to
//! the speech recognizer.

use crate::error::{HearsayError, Result};
use futures::{pin_mut, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

const AUDIO_EXTS: &[&str] = &[
    "mp3", "aac", "wav", "wma", "ogg", "flac", "m4a", "aiff", "opus", "alac", "amr",
];
const VIDEO_EXTS: &[&str] = &[
    "mp4", "avi", "mov", "wmv", "mpeg", "mpg", "mkv", "flv", "webm", "3gp", "mts", "m2ts",
    "vob", "rmvb",
];

/// Recognizer input sample rate; also fixed in the transcode arguments.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

pub fn is_audio_mime(mime: &str) -> bool {
    mime.starts_with("audio/")
}

pub fn is_video_mime(mime: &str) -> bool {
    mime.starts_with("video/")
}

/// Reject files whose extension is on neither allowlist.
fn validate_extension(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if AUDIO_EXTS.contains(&ext.as_str()) || VIDEO_EXTS.contains(&ext.as_str()) {
        return Ok(());
    }
    Err(HearsayError::UnsupportedMediaType(format!(
        "unsupported file extension: .{ext}"
    )))
}

/// Stream an upload to a uniquely named file under `dir`.
///
/// The declared MIME type must indicate audio or video; chunks are written
/// as they arrive so large uploads never sit in memory. The original
/// filename suffix is preserved for later extension inference.
#[instrument(skip(stream, dir), fields(mime = %mime))]
pub async fn save_upload<S, E>(
    stream: S,
    mime: &str,
    filename: Option<&str>,
    dir: &Path,
) -> Result<PathBuf>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>>,
    E: std::fmt::Display,
{
    if !is_audio_mime(mime) && !is_video_mime(mime) {
        return Err(HearsayError::UnsupportedMediaType(format!(
            "unsupported content type: {mime}"
        )));
    }

    std::fs::create_dir_all(dir)?;

    let suffix = filename
        .map(Path::new)
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let target = dir.join(format!("upload_{}{}", uuid::Uuid::new_v4(), suffix));

    let mut file = tokio::fs::File::create(&target).await?;
    let mut written: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| HearsayError::Acquisition(format!("upload stream error: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!("Saved {} byte upload to {}", written, target.display());
    Ok(target)
}

/// Transcode any audio/video input into the canonical audio encoding.
///
/// Drops video streams, forces mono at 16 kHz, and encodes AAC at a fixed
/// moderate bitrate. The input extension is validated first so obviously
/// wrong files fail before a subprocess is spawned.
#[instrument(skip_all, fields(input = %input.display()))]
pub async fn extract_audio_to_m4a(input: &Path, output: &Path) -> Result<PathBuf> {
    validate_extension(input)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i").arg(input)
        .arg("-vn")
        .arg("-ac").arg("1")
        .arg("-ar").arg(CANONICAL_SAMPLE_RATE.to_string())
        .arg("-c:a").arg("aac")
        .arg("-b:a").arg("96k")
        .arg("-loglevel").arg("error")
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => Ok(output.to_path_buf()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(HearsayError::Transcode(format!(
                "ffmpeg conversion failed: {}",
                err.trim()
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HearsayError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(HearsayError::Transcode(format!("ffmpeg error: {e}"))),
    }
}

/// Decode an audio file to mono 16 kHz f32 PCM samples for the recognizer.
#[instrument(skip_all, fields(input = %input.display()))]
pub async fn decode_pcm_16k_mono(input: &Path) -> Result<Vec<f32>> {
    let result = Command::new("ffmpeg")
        .arg("-i").arg(input)
        .arg("-vn")
        .arg("-f").arg("f32le")
        .arg("-acodec").arg("pcm_f32le")
        .arg("-ac").arg("1")
        .arg("-ar").arg(CANONICAL_SAMPLE_RATE.to_string())
        .arg("-loglevel").arg("error")
        .arg("pipe:1")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HearsayError::ToolNotFound("ffmpeg".into()));
        }
        Err(e) => return Err(HearsayError::Transcode(format!("ffmpeg error: {e}"))),
    };

    if !output.status.success() {
        let err = String::from_utf8_lossy(&output.stderr);
        return Err(HearsayError::Transcode(format!(
            "ffmpeg decode failed: {}",
            err.trim()
        )));
    }

    Ok(pcm_f32_from_le_bytes(&output.stdout))
}

/// Reinterpret little-endian f32 bytes as samples, dropping any ragged tail.
fn pcm_f32_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_mime_predicates() {
        assert!(is_audio_mime("audio/mpeg"));
        assert!(is_video_mime("video/mp4"));
        assert!(!is_audio_mime("application/zip"));
        assert!(!is_video_mime("text/plain"));
    }

    #[test]
    fn test_validate_extension() {
        assert!(validate_extension(Path::new("a.mp3")).is_ok());
        assert!(validate_extension(Path::new("a.MKV")).is_ok());
        assert!(validate_extension(Path::new("a.zip")).is_err());
        assert!(validate_extension(Path::new("noext")).is_err());
    }

    #[test]
    fn test_pcm_conversion_round_trips_samples() {
        let samples = [0.0f32, 0.5, -1.0];
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes.push(0xFF); // ragged tail is dropped

        assert_eq!(pcm_f32_from_le_bytes(&bytes), samples);
    }

    #[tokio::test]
    async fn test_save_upload_writes_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let chunks: Vec<std::result::Result<bytes::Bytes, std::convert::Infallible>> = vec![
            Ok(bytes::Bytes::from_static(b"hello ")),
            Ok(bytes::Bytes::from_static(b"world")),
        ];

        let path = save_upload(
            stream::iter(chunks),
            "audio/wav",
            Some("clip.wav"),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(path.extension().unwrap(), "wav");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_save_upload_rejects_non_media() {
        let dir = tempfile::tempdir().unwrap();
        let chunks: Vec<std::result::Result<bytes::Bytes, std::convert::Infallible>> =
            vec![Ok(bytes::Bytes::from_static(b"PK"))];

        let err = save_upload(
            stream::iter(chunks),
            "application/zip",
            Some("a.zip"),
            dir.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, HearsayError::UnsupportedMediaType(_)));
        // rejected before any filesystem write
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
