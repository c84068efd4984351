//! HTTP API server for HearSay.
//!
//! Thin plumbing around the pipeline: routing, CORS, Basic auth, request
//! parsing, and the single error-to-status boundary.

use crate::config::Settings;
use crate::error::HearsayError;
use crate::pipeline::Pipeline;
use crate::stt::WhisperRecognizer;
use crate::translate::Translator;
use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pipeline: Pipeline,
    recognizer: Arc<WhisperRecognizer>,
    settings: Settings,
}

/// Run the HTTP API server until the process is stopped.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(settings.upload_dir())?;
    std::fs::create_dir_all(settings.download_dir())?;
    log_tool_availability().await;

    let recognizer = Arc::new(WhisperRecognizer::new(settings.stt.clone()));
    let translator = Arc::new(Translator::from_settings(&settings.translation));
    let pipeline = Pipeline::new(
        settings.clone(),
        Arc::clone(&recognizer),
        Arc::clone(&translator),
    );

    // Load the model ahead of the first request; a failure here is logged
    // and retried lazily rather than aborting startup.
    if settings.stt.backend == "whisper" {
        let warm = Arc::clone(&recognizer);
        tokio::spawn(async move {
            if let Err(e) = warm.warm_up().await {
                warn!("Model warm-up failed: {}", e);
            }
        });
    }

    let state = Arc::new(AppState {
        pipeline,
        recognizer,
        settings: settings.clone(),
    });

    let app = Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/transcribe/youtube", post(transcribe_youtube))
        .route("/transcribe/upload", post(transcribe_upload))
        .layer(DefaultBodyLimit::max(settings.server.max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_basic_auth,
        ))
        // CORS outermost so preflight requests never hit the auth layer
        .layer(cors_layer(&settings.server.cors_allow_origins))
        .with_state(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(origins: &str) -> CorsLayer {
    let origins = origins.trim();
    if origins.is_empty() || origins == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|o| o.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Log whether the external tools the pipeline shells out to are present.
async fn log_tool_availability() {
    for tool in ["yt-dlp", "ffmpeg"] {
        let found = tokio::process::Command::new(tool)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok();
        if found {
            info!("Found {}", tool);
        } else {
            warn!("{} not found in PATH; related requests will fail", tool);
        }
    }
}

// === Authentication ===

/// HTTP Basic authentication over every route except CORS preflight.
async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_credentials)
        .map(|(user, pass)| {
            user == state.settings.server.auth_username
                && pass == state.settings.server.auth_password
        })
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic")],
            Json(serde_json::json!({ "detail": "Invalid authentication credentials" })),
        )
            .into_response();
    }

    next.run(request).await
}

/// Decode a `Basic base64(user:pass)` header value.
fn parse_basic_credentials(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

// === Error mapping ===

impl IntoResponse for HearsayError {
    fn into_response(self) -> Response {
        let status = match &self {
            HearsayError::InvalidReference(_)
            | HearsayError::HumanVerificationRequired(_)
            | HearsayError::Acquisition(_) => StatusCode::BAD_REQUEST,
            HearsayError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (
            status,
            Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

// === Handlers ===

async fn home() -> Html<&'static str> {
    Html(
        r#"<html>
  <head><title>HearSay</title></head>
  <body style="font-family: system-ui; max-width: 720px; margin: 2rem auto; line-height: 1.5">
    <h1>HearSay</h1>
    <p>Multilingual transcription &rarr; English.</p>
    <h3>Transcribe a YouTube link</h3>
    <pre>curl -u user:pass -X POST http://localhost:8000/transcribe/youtube \
  -d 'youtube_value=https://www.youtube.com/watch?v=Q80-pwDrCVI&t=55s'</pre>
    <h3>Transcribe an upload</h3>
    <pre>curl -u user:pass -X POST http://localhost:8000/transcribe/upload \
  -F 'file=@/path/to/video.mp4;type=video/mp4'</pre>
  </body>
</html>"#,
    )
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.recognizer.model_name(),
        "stt_backend": state.recognizer.backend(),
    }))
}

#[derive(Deserialize)]
struct YoutubeForm {
    /// YouTube URL, bare 11-char ID, or ID with a t=/start= suffix.
    youtube_value: String,
}

async fn transcribe_youtube(
    State(state): State<Arc<AppState>>,
    Form(form): Form<YoutubeForm>,
) -> Result<impl IntoResponse, HearsayError> {
    let result = state.pipeline.run_youtube(&form.youtube_value).await?;
    Ok(Json(result))
}

async fn transcribe_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, HearsayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HearsayError::Acquisition(format!("cannot read multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let mime = field.content_type().unwrap_or("").to_string();

        // drive the field chunk-by-chunk so uploads never sit in memory
        let chunks = futures::stream::unfold(field, |mut field| async move {
            field.chunk().await.transpose().map(|chunk| (chunk, field))
        });

        let result = state
            .pipeline
            .run_upload(chunks, &mime, filename.as_deref())
            .await?;
        return Ok(Json(result).into_response());
    }

    Err(HearsayError::Acquisition(
        "multipart field 'file' is required".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_credentials() {
        // base64("admin:secret")
        let value = format!("Basic {}", BASE64_STANDARD.encode("admin:secret"));
        assert_eq!(
            parse_basic_credentials(&value),
            Some(("admin".to_string(), "secret".to_string()))
        );

        assert_eq!(parse_basic_credentials("Bearer token"), None);
        assert_eq!(parse_basic_credentials("Basic !!!notbase64"), None);
        let no_colon = format!("Basic {}", BASE64_STANDARD.encode("adminsecret"));
        assert_eq!(parse_basic_credentials(&no_colon), None);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                HearsayError::InvalidReference("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                HearsayError::HumanVerificationRequired("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                HearsayError::Acquisition("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                HearsayError::UnsupportedMediaType("x".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                HearsayError::Transcode("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                HearsayError::Recognition("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
