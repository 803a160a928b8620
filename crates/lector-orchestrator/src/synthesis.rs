//! HTTP adapter for the remote speech synthesis service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use lector_core::ports::{ConfigStore, SpeechSynthesizer, SynthesisError, SynthesizedAudio};

/// Default synthesis endpoint.
pub const DEFAULT_SYNTHESIS_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-preview-tts:generateContent";

/// [`SpeechSynthesizer`] over the remote HTTP service.
///
/// The API key is read per request from the [`ConfigStore`], so a key
/// configured after startup takes effect without restarting. No retries here;
/// synthesis failures surface directly to the pipeline.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    config: Arc<dyn ConfigStore>,
}

impl HttpSynthesizer {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self::with_endpoint(config, DEFAULT_SYNTHESIS_ENDPOINT)
    }

    pub fn with_endpoint(config: Arc<dyn ConfigStore>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let api_key = self
            .config
            .api_key()
            .await
            .ok_or(SynthesisError::MissingApiKey)?;

        debug!(chars = text.len(), "requesting speech synthesis");
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&request_body(text))
            .send()
            .await
            .map_err(|e| SynthesisError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "synthesis service returned an error");
            return Err(SynthesisError::Http {
                status: status.as_u16(),
                message: service_error_message(&body),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))?;
        let audio = parse_response(&body)?;
        info!(
            chars = text.len(),
            mime = audio.mime_type.as_deref().unwrap_or("unknown"),
            payload = audio.audio_base64.len(),
            "synthesis complete"
        );
        Ok(audio)
    }
}

fn request_body(text: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": { "responseModalities": ["AUDIO"] },
    })
}

/// Pull the human-readable message out of an error body, falling back to the
/// raw text when it isn't the service's JSON error shape.
fn service_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let message = v.get("error")?.get("message")?.as_str()?;
            Some(message.to_owned())
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Walk `candidates[0].content.parts[*].inlineData` for the audio payload.
fn parse_response(body: &Value) -> Result<SynthesizedAudio, SynthesisError> {
    let parts = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SynthesisError::MalformedResponse("no candidate with content parts".to_owned())
        })?;

    for part in parts {
        let Some(inline) = part.get("inlineData") else {
            continue;
        };
        if let Some(data) = inline.get("data").and_then(Value::as_str) {
            return Ok(SynthesizedAudio {
                audio_base64: data.to_owned(),
                mime_type: inline
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            });
        }
    }
    Err(SynthesisError::MalformedResponse(
        "no audio data in any part".to_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;

    #[test]
    fn request_body_carries_text_and_audio_modality() {
        let body = request_body("hello world");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello world");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
    }

    #[test]
    fn response_parsing_finds_the_audio_part() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "thinking..." },
                        { "inlineData": { "data": "QUJD", "mimeType": "audio/L16;rate=24000" } },
                    ]
                }
            }]
        });
        let audio = parse_response(&body).unwrap();
        assert_eq!(audio.audio_base64, "QUJD");
        assert_eq!(audio.mime_type.as_deref(), Some("audio/L16;rate=24000"));
    }

    #[test]
    fn response_without_audio_is_malformed() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "no audio here" }] } }]
        });
        assert!(matches!(
            parse_response(&body),
            Err(SynthesisError::MalformedResponse(_))
        ));

        let body = json!({ "candidates": [] });
        assert!(matches!(
            parse_response(&body),
            Err(SynthesisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn error_message_prefers_the_service_shape() {
        let body = r#"{"error": {"message": "API key invalid", "code": 403}}"#;
        assert_eq!(service_error_message(body), "API key invalid");
        assert_eq!(service_error_message("plain failure\n"), "plain failure");
    }

    #[tokio::test]
    async fn missing_api_key_is_rejected_before_any_request() {
        let synthesizer = HttpSynthesizer::with_endpoint(
            Arc::new(StaticConfig::unconfigured()),
            "http://127.0.0.1:9/unreachable",
        );
        let err = synthesizer.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SynthesisError::MissingApiKey));
    }
}
