use crate::engine::{check_input_size, Engine};
use crate::error::EngineError;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use yomi_types::{AudioFormat, SpeechRequest, SpeechResponse};

pub const DEFAULT_ENDPOINT: &str = "https://texttospeech.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SAMPLE_RATE_HZ: u32 = 48_000;

/// Google Cloud Text-to-Speech over its REST API, returning MP3 at 48 kHz.
#[derive(Debug, Clone)]
pub struct GoogleEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct SynthesizeBody<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct VoiceSelection<'a> {
    #[serde(rename = "languageCode")]
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct AudioConfig {
    #[serde(rename = "audioEncoding")]
    audio_encoding: &'static str,
    #[serde(rename = "sampleRateHertz")]
    sample_rate_hertz: u32,
    #[serde(rename = "speakingRate", skip_serializing_if = "Option::is_none")]
    speaking_rate: Option<f64>,
}

#[derive(Deserialize)]
struct SynthesizeReply {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

impl GoogleEngine {
    pub const NAME: &'static str = "google";

    /// # Errors
    ///
    /// Returns `EngineError::Config` when `api_key` is empty, and
    /// `EngineError::Http` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, EngineError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(EngineError::Config(
                "google engine requires an API key".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Engine for GoogleEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn generate_speech(
        &self,
        request: &SpeechRequest,
    ) -> Result<SpeechResponse, EngineError> {
        check_input_size(&request.text)?;

        let body = SynthesizeBody {
            input: SynthesisInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &request.language_code,
                name: (!request.voice_name.is_empty()).then_some(request.voice_name.as_str()),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                sample_rate_hertz: SAMPLE_RATE_HZ,
                speaking_rate: (request.speaking_rate > 0.0).then_some(request.speaking_rate),
            },
        };

        tracing::debug!(
            language = %request.language_code,
            voice = %request.voice_name,
            chars = request.text.chars().count(),
            "requesting google synthesis"
        );

        let response = self
            .client
            .post(format!("{}/v1/text:synthesize", self.endpoint))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: SynthesizeReply = response.json().await?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(reply.audio_content.as_bytes())
            .map_err(|e| EngineError::InvalidResponse(format!("audioContent is not base64: {e}")))?;

        Ok(SpeechResponse {
            format: AudioFormat::Mp3,
            channels: 1,
            audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::post, Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> SpeechRequest {
        SpeechRequest {
            text: "おはよう".to_string(),
            language_code: "ja-JP".to_string(),
            voice_name: "ja-JP-Neural2-B".to_string(),
            speaking_rate: 0.0,
        }
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            GoogleEngine::new("", DEFAULT_ENDPOINT),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn decodes_audio_content_and_sends_voice_params() {
        let seen: Seen = Arc::default();
        let seen_handler = seen.clone();
        let router = Router::new().route(
            "/v1/text:synthesize",
            post(
                move |Query(q): Query<HashMap<String, String>>,
                      Json(body): Json<serde_json::Value>| {
                    let seen = seen_handler.clone();
                    async move {
                        assert_eq!(q.get("key").map(String::as_str), Some("secret"));
                        seen.lock().unwrap().push(body);
                        Json(serde_json::json!({ "audioContent": "SUQzAwA=" }))
                    }
                },
            ),
        );
        let endpoint = serve(router).await;

        let engine = GoogleEngine::new("secret", endpoint).unwrap();
        let response = engine.generate_speech(&request()).await.unwrap();

        assert_eq!(response.format, AudioFormat::Mp3);
        assert_eq!(response.audio, b"ID3\x03\x00".to_vec());

        let body = seen.lock().unwrap()[0].clone();
        assert_eq!(body["input"]["text"], "おはよう");
        assert_eq!(body["voice"]["languageCode"], "ja-JP");
        assert_eq!(body["voice"]["name"], "ja-JP-Neural2-B");
        assert_eq!(body["audioConfig"]["audioEncoding"], "MP3");
        assert_eq!(body["audioConfig"]["sampleRateHertz"], 48_000);
        assert!(body["audioConfig"].get("speakingRate").is_none());
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let router = Router::new().route(
            "/v1/text:synthesize",
            post(|| async { (StatusCode::FORBIDDEN, "quota exceeded") }),
        );
        let endpoint = serve(router).await;

        let engine = GoogleEngine::new("secret", endpoint).unwrap();
        let err = engine.generate_speech(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Api { status: 403, ref body } if body == "quota exceeded"
        ));
    }
}
