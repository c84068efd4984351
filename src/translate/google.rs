//! Google Cloud Translation provider (secondary).

use super::TranslationProvider;
use crate::error::{HearsayError, Result};
use async_trait::async_trait;
use serde::Deserialize;

const ENDPOINT: &str = "https://translation.googleapis.com/language/translate/v2";

/// Google Translate v2 REST API provider.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Deserialize)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}

impl GoogleProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl TranslationProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        // v2 rejects regional variants like EN-GB; send the primary subtag.
        let target = target_lang
            .split('-')
            .next()
            .unwrap_or(target_lang)
            .to_lowercase();

        let response = self
            .client
            .post(ENDPOINT)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("q", text), ("target", &target), ("format", "html")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HearsayError::Provider(format!(
                "Google Translate returned {}",
                response.status()
            )));
        }

        let body: GoogleResponse = response.json().await?;
        body.data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| {
                HearsayError::Provider("Google Translate returned no translations".into())
            })
    }
}
