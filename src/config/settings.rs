//! Configuration settings for HearSay.
//!
//! Settings load from an optional TOML file and are then overlaid with
//! environment variables, so containerized deployments can run without a
//! config file at all.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub stt: SttSettings,
    pub translation: TranslationSettings,
    pub youtube: YoutubeSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Comma-separated allowed CORS origins, or "*" for any.
    pub cors_allow_origins: String,
    /// HTTP Basic auth username.
    pub auth_username: String,
    /// HTTP Basic auth password.
    pub auth_password: String,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Working directory for request-scoped temporary files.
    pub work_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allow_origins: "*".to_string(),
            auth_username: "admin".to_string(),
            auth_password: "admin".to_string(),
            max_upload_bytes: 500 * 1024 * 1024,
            work_dir: "workdir".to_string(),
        }
    }
}

/// Speech-recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttSettings {
    /// Recognition backend identifier. Only "whisper" is implemented.
    pub backend: String,
    /// Path to the whisper GGML model file.
    pub model_path: String,
    /// Numeric precision mode: "int8" for CPU, "float16"/"int8_float16" for GPU.
    pub compute_type: String,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            backend: "whisper".to_string(),
            model_path: "models/ggml-large-v3.bin".to_string(),
            compute_type: "int8".to_string(),
        }
    }
}

impl SttSettings {
    /// GPU inference is selected by the reduced/full precision split,
    /// matching the compute types the GPU path supports.
    pub fn use_gpu(&self) -> bool {
        matches!(
            self.compute_type.to_lowercase().as_str(),
            "float16" | "int8_float16"
        )
    }

    /// Short model name for health reporting (file stem of the model path).
    pub fn model_name(&self) -> String {
        PathBuf::from(&self.model_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

/// Translation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TranslationSettings {
    /// DeepL API key (primary provider). None disables DeepL.
    pub deepl_api_key: Option<String>,
    /// Google Translate API key (secondary provider). None disables Google.
    pub google_api_key: Option<String>,
    /// Path to a file holding the Google API key, read at load time.
    pub google_api_key_file: Option<String>,
}

/// YouTube downloader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// yt-dlp extractor tuning, e.g. "youtube:player_client=android".
    pub extractor_args: String,
    /// Optional Netscape-format cookies file for bot-check bypass.
    pub cookies_file: Option<String>,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            extractor_args: "youtube:player_client=android".to_string(),
            cookies_file: None,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file and the environment.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or the default location if None,
    /// then apply environment overrides.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.overlay_env();
        settings.resolve_secrets()?;
        Ok(settings)
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearsay")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded working directory path.
    pub fn work_dir(&self) -> PathBuf {
        Self::expand_path(&self.server.work_dir)
    }

    /// Directory where uploaded files are staged.
    pub fn upload_dir(&self) -> PathBuf {
        self.work_dir().join("uploads")
    }

    /// Directory where YouTube downloads land.
    pub fn download_dir(&self) -> PathBuf {
        self.work_dir().join("yt")
    }

    /// Apply environment-variable overrides on top of file/default values.
    fn overlay_env(&mut self) {
        if let Ok(v) = std::env::var("BIND_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("BIND_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("CORS_ALLOW_ORIGINS") {
            self.server.cors_allow_origins = v;
        }
        if let Ok(v) = std::env::var("AUTH_USERNAME") {
            self.server.auth_username = v;
        }
        if let Ok(v) = std::env::var("AUTH_PASSWORD") {
            self.server.auth_password = v;
        }
        if let Ok(v) = std::env::var("MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = v.parse() {
                self.server.max_upload_bytes = bytes;
            }
        }
        if let Ok(v) = std::env::var("STT_BACKEND") {
            self.stt.backend = v;
        }
        if let Ok(v) = std::env::var("WHISPER_MODEL") {
            self.stt.model_path = v;
        }
        if let Ok(v) = std::env::var("WHISPER_COMPUTE") {
            self.stt.compute_type = v;
        }
        if let Ok(v) = std::env::var("DEEPL_API_KEY") {
            self.translation.deepl_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GOOGLE_API_KEY") {
            self.translation.google_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GOOGLE_API_KEY_FILE") {
            self.translation.google_api_key_file = Some(v);
        }
        if let Ok(v) = std::env::var("YT_EXTRACTOR_ARGS") {
            self.youtube.extractor_args = v;
        }
        if let Ok(v) = std::env::var("YT_COOKIES_FILE") {
            self.youtube.cookies_file = Some(v);
        }
    }

    /// Read file-based secrets into their in-memory fields.
    fn resolve_secrets(&mut self) -> crate::error::Result<()> {
        if self.translation.google_api_key.is_none() {
            if let Some(path) = &self.translation.google_api_key_file {
                let key = std::fs::read_to_string(Self::expand_path(path))?;
                let key = key.trim();
                if !key.is_empty() {
                    self.translation.google_api_key = Some(key.to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.stt.backend, "whisper");
        assert_eq!(settings.youtube.extractor_args, "youtube:player_client=android");
        assert!(settings.translation.deepl_api_key.is_none());
    }

    #[test]
    fn test_gpu_selection_follows_compute_type() {
        let mut stt = SttSettings::default();
        assert!(!stt.use_gpu());

        stt.compute_type = "float16".to_string();
        assert!(stt.use_gpu());

        stt.compute_type = "int8_float16".to_string();
        assert!(stt.use_gpu());
    }

    #[test]
    fn test_model_name_is_file_stem() {
        let stt = SttSettings {
            model_path: "/opt/models/ggml-large-v3.bin".to_string(),
            ..Default::default()
        };
        assert_eq!(stt.model_name(), "ggml-large-v3");
    }

    #[test]
    fn test_work_dirs_derive_from_work_dir() {
        let settings = Settings::default();
        assert!(settings.upload_dir().ends_with("workdir/uploads"));
        assert!(settings.download_dir().ends_with("workdir/yt"));
    }
}
