//! Translation to English.
//!
//! Providers are tried in configured order; one pass over the list is a
//! single attempt, and attempts retry with exponential backoff. The caller
//! decides what translation failure means — the pipeline degrades to the
//! original text rather than failing the request.

mod deepl;
mod google;

pub use deepl::DeepLProvider;
pub use google::GoogleProvider;

use crate::config::TranslationSettings;
use crate::error::{HearsayError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Everything is translated into British English.
pub const TARGET_LANGUAGE: &str = "EN-GB";

/// Trait for translation service providers.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Translate `text` into `target_lang`, single attempt.
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Normalize a target language code for the primary provider.
///
/// Bare "EN" and "PT" are ambiguous regional variants DeepL refuses;
/// rewrite them to "EN-GB" and "PT-PT". Everything else passes through
/// uppercased.
pub fn normalize_target_lang(code: &str) -> String {
    let upper = code.to_uppercase();
    match upper.as_str() {
        "EN" => "EN-GB".to_string(),
        "PT" => "PT-PT".to_string(),
        _ => upper,
    }
}

/// Ordered-fallback translator with retry and backoff.
pub struct Translator {
    providers: Vec<Box<dyn TranslationProvider>>,
    max_attempts: u32,
    base_delay: Duration,
}

impl Translator {
    /// Build the provider chain from configuration: DeepL first when its
    /// key is present, then Google.
    pub fn from_settings(settings: &TranslationSettings) -> Self {
        let mut providers: Vec<Box<dyn TranslationProvider>> = Vec::new();
        if let Some(key) = &settings.deepl_api_key {
            providers.push(Box::new(DeepLProvider::new(key.clone())));
        }
        if let Some(key) = &settings.google_api_key {
            providers.push(Box::new(GoogleProvider::new(key.clone())));
        }
        Self::with_providers(providers, 3, Duration::from_secs(1))
    }

    /// Build a translator over an explicit provider chain.
    pub fn with_providers(
        providers: Vec<Box<dyn TranslationProvider>>,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            providers,
            max_attempts,
            base_delay,
        }
    }

    /// Translate `text` to English, falling through the provider chain.
    ///
    /// Empty input passes through without touching any provider. After
    /// exhausting all attempts the caller gets `TranslationExhausted`.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn to_english(&self, text: &str) -> Result<String> {
        if text.is_empty() {
            return Ok(text.to_string());
        }

        let target = normalize_target_lang("en");

        if self.providers.is_empty() {
            warn!("No translation provider configured");
            return Err(HearsayError::TranslationExhausted { attempts: 0 });
        }

        let mut delay = self.base_delay;
        for attempt in 1..=self.max_attempts {
            for provider in &self.providers {
                match provider.translate(text, &target).await {
                    Ok(translated) => {
                        debug!("Translated via {}", provider.name());
                        return Ok(translated);
                    }
                    Err(e) => {
                        warn!(
                            "{} failed (attempt {}/{}): {}",
                            provider.name(),
                            attempt,
                            self.max_attempts,
                            e
                        );
                    }
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(HearsayError::TranslationExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysFails {
        calls: Arc<AtomicU32>,
    }

    impl AlwaysFails {
        fn new() -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl TranslationProvider for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HearsayError::Provider("boom".into()))
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl TranslationProvider for AlwaysSucceeds {
        fn name(&self) -> &'static str {
            "always-succeeds"
        }

        async fn translate(&self, text: &str, _target: &str) -> Result<String> {
            Ok(format!("EN:{text}"))
        }
    }

    fn fast(providers: Vec<Box<dyn TranslationProvider>>) -> Translator {
        Translator::with_providers(providers, 3, Duration::from_millis(1))
    }

    #[test]
    fn test_normalize_target_lang() {
        assert_eq!(normalize_target_lang("en"), "EN-GB");
        assert_eq!(normalize_target_lang("EN"), "EN-GB");
        assert_eq!(normalize_target_lang("pt"), "PT-PT");
        assert_eq!(normalize_target_lang("fr"), "FR");
        assert_eq!(normalize_target_lang("EN-US"), "EN-US");
    }

    #[tokio::test]
    async fn test_fallback_to_secondary() {
        let (failing, _) = AlwaysFails::new();
        let translator = fast(vec![Box::new(failing), Box::new(AlwaysSucceeds)]);

        let out = translator.to_english("hei verden").await.unwrap();
        assert_eq!(out, "EN:hei verden");
    }

    #[tokio::test]
    async fn test_exhaustion_after_all_attempts() {
        let (failing, _) = AlwaysFails::new();
        let translator = fast(vec![Box::new(failing)]);

        let err = translator.to_english("hei").await.unwrap_err();
        assert!(matches!(
            err,
            HearsayError::TranslationExhausted { attempts: 3 }
        ));
    }

    #[tokio::test]
    async fn test_each_attempt_walks_the_full_chain() {
        let (first, first_calls) = AlwaysFails::new();
        let (second, second_calls) = AlwaysFails::new();

        let translator = fast(vec![Box::new(first), Box::new(second)]);
        let _ = translator.to_english("hei").await;

        // both providers tried on each of the 3 attempts
        assert_eq!(first_calls.load(Ordering::SeqCst), 3);
        assert_eq!(second_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_text_skips_providers() {
        let (failing, calls) = AlwaysFails::new();
        let translator = fast(vec![Box::new(failing)]);

        assert_eq!(translator.to_english("").await.unwrap(), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_providers_fails_fast() {
        let translator = fast(vec![]);
        let err = translator.to_english("hei").await.unwrap_err();
        assert!(matches!(err, HearsayError::TranslationExhausted { .. }));
    }
}
