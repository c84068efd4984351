//! Local whisper.cpp speech recognition backend.

use super::{Recognition, SpeechSegment};
use crate::config::SttSettings;
use crate::error::{HearsayError, Result};
use crate::media;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Shared whisper model holder.
///
/// The engine loads lazily on first use (or via [`warm_up`]) and exactly
/// once even under concurrent first requests. Inference calls are
/// serialized through a mutex; whisper contexts are not assumed safe for
/// concurrent decoding.
///
/// [`warm_up`]: WhisperRecognizer::warm_up
pub struct WhisperRecognizer {
    settings: SttSettings,
    engine: OnceCell<Arc<WhisperEngine>>,
}

struct WhisperEngine {
    context: Mutex<WhisperContext>,
}

impl WhisperRecognizer {
    pub fn new(settings: SttSettings) -> Self {
        Self {
            settings,
            engine: OnceCell::new(),
        }
    }

    /// Backend identifier for health reporting.
    pub fn backend(&self) -> &str {
        &self.settings.backend
    }

    /// Model name for health reporting.
    pub fn model_name(&self) -> String {
        self.settings.model_name()
    }

    /// Force model loading ahead of the first request.
    pub async fn warm_up(&self) -> Result<()> {
        self.engine().await.map(|_| ())
    }

    async fn engine(&self) -> Result<&Arc<WhisperEngine>> {
        let settings = self.settings.clone();
        self.engine
            .get_or_try_init(|| async move {
                let model_path = settings.model_path.clone();
                let use_gpu = settings.use_gpu();
                info!(
                    "Loading whisper model {} (gpu: {})",
                    model_path, use_gpu
                );
                tokio::task::spawn_blocking(move || {
                    let mut params = WhisperContextParameters::default();
                    params.use_gpu = use_gpu;
                    let context = WhisperContext::new_with_params(&model_path, params)
                        .map_err(|e| {
                            HearsayError::Recognition(format!(
                                "failed to load model {model_path}: {e}"
                            ))
                        })?;
                    Ok(Arc::new(WhisperEngine {
                        context: Mutex::new(context),
                    }))
                })
                .await
                .map_err(|e| HearsayError::Recognition(format!("model load task failed: {e}")))?
            })
            .await
    }

    /// Transcribe an audio file with automatic language detection.
    ///
    /// Garbled or silent input yields an empty transcript, not an error;
    /// only engine failures surface as errors.
    #[instrument(skip(self), fields(audio = %audio_path.display()))]
    pub async fn transcribe(&self, audio_path: &Path) -> Result<Recognition> {
        let samples = media::decode_pcm_16k_mono(audio_path).await?;
        let duration_sec = samples.len() as f64 / media::CANONICAL_SAMPLE_RATE as f64;
        debug!("Decoded {:.1}s of audio", duration_sec);

        let engine = Arc::clone(self.engine().await?);
        let (language, segments) =
            tokio::task::spawn_blocking(move || engine.run(&samples))
                .await
                .map_err(|e| {
                    HearsayError::Recognition(format!("inference task failed: {e}"))
                })??;

        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        Ok(Recognition {
            text,
            language,
            duration_sec,
            segments,
        })
    }
}

impl WhisperEngine {
    fn run(&self, samples: &[f32]) -> Result<(String, Vec<SpeechSegment>)> {
        let context = self
            .context
            .lock()
            .map_err(|_| HearsayError::Recognition("whisper context lock poisoned".into()))?;
        let mut state = context
            .create_state()
            .map_err(|e| HearsayError::Recognition(format!("failed to create state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        // None leaves language detection to the model.
        params.set_language(None);
        params.set_translate(false);
        params.set_suppress_blank(true);
        params.set_suppress_nst(true);
        params.set_n_threads(std::cmp::max(1, num_cpus::get() as i32 - 1));
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| HearsayError::Recognition(format!("whisper decode failed: {e}")))?;

        let language = whisper_rs::get_lang_str(state.full_lang_id_from_state())
            .unwrap_or("unknown")
            .to_string();

        let mut segments = Vec::new();
        for idx in 0..state.full_n_segments() {
            let Some(segment) = state.get_segment(idx) else {
                continue;
            };
            let text = segment
                .to_str_lossy()
                .map(|cow| cow.trim().to_string())
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            // whisper timestamps are in 10ms units
            segments.push(SpeechSegment {
                start: segment.start_timestamp() as f64 / 100.0,
                end: segment.end_timestamp() as f64 / 100.0,
                text,
            });
        }

        Ok((language, segments))
    }
}
