//! DeepL translation provider (primary).

use super::TranslationProvider;
use crate::error::{HearsayError, Result};
use async_trait::async_trait;
use serde::Deserialize;

const FREE_ENDPOINT: &str = "https://api-free.deepl.com/v2/translate";
const PRO_ENDPOINT: &str = "https://api.deepl.com/v2/translate";

/// DeepL REST API provider.
pub struct DeepLProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: &'static str,
}

#[derive(Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    text: String,
}

impl DeepLProvider {
    pub fn new(api_key: String) -> Self {
        // Free-tier keys carry a ":fx" suffix and use a separate host.
        let endpoint = if api_key.ends_with(":fx") {
            FREE_ENDPOINT
        } else {
            PRO_ENDPOINT
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint,
        }
    }
}

#[async_trait]
impl TranslationProvider for DeepLProvider {
    fn name(&self) -> &'static str {
        "deepl"
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint)
            .header(
                "Authorization",
                format!("DeepL-Auth-Key {}", self.api_key),
            )
            .form(&[
                ("text", text),
                ("target_lang", target_lang),
                // keep any embedded markup intact
                ("tag_handling", "html"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HearsayError::Provider(format!(
                "DeepL returned {}",
                response.status()
            )));
        }

        let body: DeepLResponse = response.json().await?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| HearsayError::Provider("DeepL returned no translations".into()))
    }
}
