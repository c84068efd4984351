//! Best-audio acquisition from YouTube via yt-dlp.

use super::VideoTarget;
use crate::config::YoutubeSettings;
use crate::error::{HearsayError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// A believable mobile client keeps bot-detection false positives down.
const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

/// Extractor profile used when session cookies are supplied; the cookie-less
/// profile comes from configuration.
const COOKIE_EXTRACTOR_ARGS: &str = "youtube:player_client=default,mweb";

/// Download the best available audio for `target` as m4a into `out_dir`.
///
/// When the target carries a non-zero start offset, only content from that
/// offset onward is fetched. Returns the downloaded file path.
#[instrument(skip(out_dir, settings), fields(video_id = %target.video_id))]
pub async fn download_best_audio(
    target: &VideoTarget,
    out_dir: &Path,
    settings: &YoutubeSettings,
) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;

    let url = target.watch_url();
    let template = out_dir.join("%(title)s_%(id)s.%(ext)s");

    info!("Downloading audio from {}", url);

    // Cookies may live on a read-only mount; yt-dlp wants to rewrite the
    // file, so stage a copy in a scratch dir that outlives the subprocess.
    let cookie_scratch = stage_cookies(settings.cookies_file.as_deref())?;

    let mut cmd = Command::new("yt-dlp");
    cmd.arg("-f").arg("bestaudio/best")
        .arg("-x")
        .arg("--audio-format").arg("m4a")
        .arg("-o").arg(&template)
        .arg("--no-playlist")
        .arg("--retries").arg("10")
        .arg("--fragment-retries").arg("10")
        .arg("--force-ipv4")
        .arg("--geo-bypass")
        .arg("--sleep-requests").arg("1")
        .arg("--user-agent").arg(MOBILE_USER_AGENT)
        .arg("--add-header").arg("Accept-Language:en-US,en;q=0.9");

    match &cookie_scratch {
        Some((_, path)) => {
            debug!("Using session cookies from {}", path.display());
            cmd.arg("--cookies").arg(path);
            cmd.arg("--extractor-args").arg(COOKIE_EXTRACTOR_ARGS);
        }
        None => {
            if !settings.extractor_args.is_empty() {
                cmd.arg("--extractor-args").arg(&settings.extractor_args);
            }
        }
    }

    if let Some(start) = target.effective_start() {
        cmd.arg("--download-sections").arg(format!("*{start}-"));
    }

    let result = cmd
        .arg(&url)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HearsayError::ToolNotFound("yt-dlp".into()));
        }
        Err(e) => {
            return Err(HearsayError::Acquisition(format!(
                "yt-dlp execution failed: {e}"
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("yt-dlp exited with {}", output.status);
        return Err(classify_download_failure(&stderr));
    }

    newest_download(out_dir, &target.video_id)
}

/// Copy the configured cookies file into a writable scratch directory.
///
/// Returns the scratch guard alongside the staged path; dropping the guard
/// removes the copy.
fn stage_cookies(
    cookies_file: Option<&str>,
) -> Result<Option<(tempfile::TempDir, PathBuf)>> {
    let Some(source) = cookies_file else {
        return Ok(None);
    };

    let scratch = tempfile::tempdir()?;
    let staged = scratch.path().join("cookies.txt");
    std::fs::copy(source, &staged).map_err(|e| {
        HearsayError::Acquisition(format!("cannot stage cookies file {source}: {e}"))
    })?;
    Ok(Some((scratch, staged)))
}

/// Map a yt-dlp failure to the right error variant.
///
/// YouTube's anti-bot challenge gets its own variant so the caller can
/// return actionable guidance instead of a raw subprocess dump.
fn classify_download_failure(stderr: &str) -> HearsayError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("sign in to confirm") || lowered.contains("not a bot") {
        return HearsayError::HumanVerificationRequired(
            "YouTube flagged this download as automated. Retry later, supply session \
             cookies via YT_COOKIES_FILE, or change the egress IP."
                .to_string(),
        );
    }
    HearsayError::Acquisition(format!("yt-dlp failed: {}", stderr.trim()))
}

/// Locate the newest downloaded file for `video_id` in `dir`.
///
/// Prefers the expected `.m4a`, falling back to any extension when the
/// postprocessor produced something else.
fn newest_download(dir: &Path, video_id: &str) -> Result<PathBuf> {
    let m4a = newest_matching(dir, video_id, Some("m4a"))?;
    if let Some(path) = m4a {
        return Ok(path);
    }
    newest_matching(dir, video_id, None)?
        .ok_or_else(|| HearsayError::Acquisition("audio file not found after download".into()))
}

fn newest_matching(
    dir: &Path,
    video_id: &str,
    extension: Option<&str>,
) -> Result<Option<PathBuf>> {
    let suffix = format!("_{video_id}");
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let stem_matches = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with(&suffix));
        if !stem_matches {
            continue;
        }
        if let Some(wanted) = extension {
            let ext_matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
            if !ext_matches {
                continue;
            }
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        if best.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            best = Some((modified, path));
        }
    }

    Ok(best.map(|(_, p)| p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bot_check() {
        let err = classify_download_failure(
            "ERROR: [youtube] abc: Sign in to confirm you're not a bot.",
        );
        assert!(matches!(err, HearsayError::HumanVerificationRequired(_)));

        let err = classify_download_failure("ERROR: video unavailable");
        assert!(matches!(err, HearsayError::Acquisition(_)));
    }

    #[test]
    fn test_newest_download_prefers_m4a() {
        let dir = tempfile::tempdir().unwrap();
        let vid = "Q80-pwDrCVI";
        std::fs::write(dir.path().join(format!("Title_{vid}.webm")), b"a").unwrap();
        std::fs::write(dir.path().join(format!("Title_{vid}.m4a")), b"b").unwrap();

        let found = newest_download(dir.path(), vid).unwrap();
        assert_eq!(found.extension().unwrap(), "m4a");
    }

    #[test]
    fn test_newest_download_falls_back_to_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        let vid = "Q80-pwDrCVI";
        std::fs::write(dir.path().join(format!("Title_{vid}.opus")), b"a").unwrap();

        let found = newest_download(dir.path(), vid).unwrap();
        assert_eq!(found.extension().unwrap(), "opus");
    }

    #[test]
    fn test_newest_download_ignores_other_videos() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Title_otherVideo0.m4a"), b"a").unwrap();

        assert!(newest_download(dir.path(), "Q80-pwDrCVI").is_err());
    }

    #[test]
    fn test_stage_cookies_copies_to_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cookies.txt");
        std::fs::write(&source, b"# Netscape HTTP Cookie File").unwrap();

        let staged = stage_cookies(Some(source.to_str().unwrap())).unwrap().unwrap();
        assert!(staged.1.exists());
        assert_ne!(staged.1, source);
    }

    #[test]
    fn test_stage_cookies_without_config() {
        assert!(stage_cookies(None).unwrap().is_none());
    }
}
