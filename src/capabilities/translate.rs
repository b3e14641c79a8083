//! LibreTranslate-compatible translation client
//!
//! Text longer than the configured chunk size is split on semantic
//! boundaries and translated chunk by chunk, in order.

use crate::capabilities::{CapabilityError, Translator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use text_splitter::TextSplitter;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// [`Translator`] speaking the LibreTranslate `/translate` API.
pub struct LibreTranslateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chunk_chars: usize,
}

impl LibreTranslateClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, chunk_chars: usize) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            chunk_chars: chunk_chars.max(1),
        }
    }

    async fn translate_chunk(&self, chunk: &str, target_lang: &str) -> Result<String, CapabilityError> {
        let request = TranslateRequest {
            q: chunk,
            source: "auto",
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .http
            .post(format!("{}/translate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::Translation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(match status.as_u16() {
                400 => CapabilityError::InvalidInput(message),
                401 | 403 => CapabilityError::Unavailable(message),
                _ => CapabilityError::Translation(message),
            });
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Translation(format!("invalid response: {}", e)))?;
        Ok(body.translated_text)
    }
}

#[async_trait]
impl Translator for LibreTranslateClient {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, CapabilityError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CapabilityError::InvalidInput(
                "no content to translate".to_string(),
            ));
        }

        let splitter = TextSplitter::new(self.chunk_chars);
        let mut translated = Vec::new();
        let chunks: Vec<&str> = splitter.chunks(text).collect();
        for chunk in chunks {
            translated.push(self.translate_chunk(chunk, target_lang).await?);
        }

        Ok(translated.join(" "))
    }
}
