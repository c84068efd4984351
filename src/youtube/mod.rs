//! YouTube reference handling.
//!
//! Normalizes user input (full URLs, bare 11-character IDs, or IDs with a
//! query-like suffix) into a canonical video target, and downloads best
//! audio for a target via yt-dlp.

mod downloader;

pub use downloader::download_best_audio;

use crate::error::{HearsayError, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Canonical form of a user-supplied YouTube reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTarget {
    /// YouTube's 11-character content identifier.
    pub video_id: String,
    /// Seconds from the start beyond which content should be fetched.
    pub start_seconds: Option<u64>,
}

impl VideoTarget {
    /// Canonical watch URL for this target.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }

    /// A start offset that parsed to zero means "no trim".
    pub fn effective_start(&self) -> Option<u64> {
        self.start_seconds.filter(|s| *s > 0)
    }
}

/// Matches the ID embedded in the common URL path shapes.
fn url_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:youtu\.be/|youtube\.com/(?:watch\?v=|embed/|shorts/))([0-9A-Za-z_-]{11})",
        )
        .expect("invalid video id regex")
    })
}

/// Matches a bare 11-character video ID and nothing else.
fn bare_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Za-z_-]{11}$").expect("invalid bare id regex"))
}

/// Normalize any accepted YouTube reference into a [`VideoTarget`].
///
/// Accepts watch / youtu.be / shorts / embed URLs, a bare 11-char ID, or an
/// ID with a query-like suffix (`ID&t=55s`). The start offset comes from a
/// `t` or `start` parameter when present.
pub fn normalize(raw: &str) -> Result<VideoTarget> {
    let value = raw.trim();

    if value.starts_with("http://") || value.starts_with("https://") {
        return normalize_url(value);
    }

    if let Some((head, tail)) = value.split_once('&') {
        let video_id = if bare_id_regex().is_match(head) {
            head.to_string()
        } else {
            extract_id(value)
                .ok_or_else(|| HearsayError::InvalidReference(value.to_string()))?
        };
        let start = offset_from_pairs(tail);
        return Ok(VideoTarget {
            video_id,
            start_seconds: start,
        });
    }

    if bare_id_regex().is_match(value) {
        return Ok(VideoTarget {
            video_id: value.to_string(),
            start_seconds: None,
        });
    }

    extract_id(value)
        .map(|video_id| VideoTarget {
            video_id,
            start_seconds: None,
        })
        .ok_or_else(|| HearsayError::InvalidReference(value.to_string()))
}

fn normalize_url(value: &str) -> Result<VideoTarget> {
    let url = Url::parse(value)
        .map_err(|e| HearsayError::InvalidReference(format!("{value}: {e}")))?;

    let from_query = url
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.to_string())
        .filter(|v| bare_id_regex().is_match(v));

    let video_id = from_query
        .or_else(|| extract_id(value))
        .ok_or_else(|| HearsayError::InvalidReference(value.to_string()))?;

    let start = url
        .query_pairs()
        .find(|(k, _)| k == "t")
        .or_else(|| url.query_pairs().find(|(k, _)| k == "start"))
        .map(|(_, v)| parse_time_offset(&v));

    Ok(VideoTarget {
        video_id,
        start_seconds: start,
    })
}

/// Best-effort ID extraction from an arbitrary string.
fn extract_id(value: &str) -> Option<String> {
    url_id_regex()
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a `t`/`start` parameter from a query-like tail (`t=55s&x=1`).
fn offset_from_pairs(tail: &str) -> Option<u64> {
    let pairs: Vec<(&str, &str)> = tail
        .split('&')
        .filter_map(|p| p.split_once('='))
        .collect();

    pairs
        .iter()
        .find(|(k, _)| *k == "t")
        .or_else(|| pairs.iter().find(|(k, _)| *k == "start"))
        .map(|(_, v)| parse_time_offset(v))
}

/// Parse a YouTube-style time offset into whole seconds.
///
/// Accepts `"55"`, `"55s"`, `"1m30s"`, `"2h3m"` and similar. Unit suffixes
/// are `h`, `m`, `s`. A malformed string still yields its first digit run,
/// and anything without digits yields zero.
pub fn parse_time_offset(t: &str) -> u64 {
    let t = t.trim();
    if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) {
        return t.parse().unwrap_or(0);
    }

    static UNIT_RE: OnceLock<Regex> = OnceLock::new();
    let unit_re = UNIT_RE
        .get_or_init(|| Regex::new(r"(\d+)([hms])").expect("invalid time unit regex"));

    let mut total: u64 = 0;
    for cap in unit_re.captures_iter(&t.to_lowercase()) {
        let value: u64 = cap[1].parse().unwrap_or(0);
        total += match &cap[2] {
            "h" => value * 3600,
            "m" => value * 60,
            _ => value,
        };
    }

    if total == 0 {
        static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
        let digits_re =
            DIGITS_RE.get_or_init(|| Regex::new(r"\d+").expect("invalid digits regex"));
        if let Some(m) = digits_re.find(t) {
            total = m.as_str().parse().unwrap_or(0);
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "Q80-pwDrCVI";

    #[test]
    fn test_normalize_url_shapes() {
        let shapes = [
            format!("https://www.youtube.com/watch?v={ID}"),
            format!("https://youtu.be/{ID}"),
            format!("https://www.youtube.com/shorts/{ID}"),
            format!("https://www.youtube.com/embed/{ID}"),
        ];
        for shape in &shapes {
            let target = normalize(shape).unwrap();
            assert_eq!(target.video_id, ID, "failed for {shape}");
            assert_eq!(target.start_seconds, None);
        }
    }

    #[test]
    fn test_normalize_url_with_offset() {
        let target = normalize(&format!("https://www.youtube.com/watch?v={ID}&t=55s")).unwrap();
        assert_eq!(target.video_id, ID);
        assert_eq!(target.start_seconds, Some(55));

        let target = normalize(&format!("https://youtu.be/{ID}?t=90")).unwrap();
        assert_eq!(target.video_id, ID);
        assert_eq!(target.start_seconds, Some(90));

        let target = normalize(&format!("https://www.youtube.com/embed/{ID}?start=120")).unwrap();
        assert_eq!(target.video_id, ID);
        assert_eq!(target.start_seconds, Some(120));
    }

    #[test]
    fn test_normalize_bare_id() {
        let target = normalize(ID).unwrap();
        assert_eq!(target.video_id, ID);
        assert_eq!(target.start_seconds, None);
    }

    #[test]
    fn test_normalize_id_with_suffix() {
        let target = normalize(&format!("{ID}&t=55s")).unwrap();
        assert_eq!(target.video_id, ID);
        assert_eq!(target.start_seconds, Some(55));

        let target = normalize(&format!("{ID}&start=1m30s")).unwrap();
        assert_eq!(target.start_seconds, Some(90));
    }

    #[test]
    fn test_normalize_idempotent_on_watch_url() {
        let first = normalize(&format!("{ID}&t=55s")).unwrap();
        let second = normalize(&first.watch_url()).unwrap();
        assert_eq!(first.video_id, second.video_id);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize("not-a-video").is_err());
        assert!(normalize("").is_err());
        assert!(normalize("https://example.com/watch?v=short").is_err());
    }

    #[test]
    fn test_parse_time_offset() {
        assert_eq!(parse_time_offset("55"), 55);
        assert_eq!(parse_time_offset("55s"), 55);
        assert_eq!(parse_time_offset("1m30s"), 90);
        assert_eq!(parse_time_offset("2h3m"), 7380);
        assert_eq!(parse_time_offset("90s"), 90);
        assert_eq!(parse_time_offset("0"), 0);
        assert_eq!(parse_time_offset(""), 0);
        // malformed but digit-bearing input falls back to the first digit run
        assert_eq!(parse_time_offset("75x"), 75);
        assert_eq!(parse_time_offset("abc"), 0);
    }

    #[test]
    fn test_zero_offset_means_no_trim() {
        let target = normalize(&format!("{ID}&t=0")).unwrap();
        assert_eq!(target.start_seconds, Some(0));
        assert_eq!(target.effective_start(), None);
    }
}
