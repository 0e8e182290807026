//! Audio uploads: validation, metadata tagging and speech-to-text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::memory::Metadata;

/// Content types accepted for audio uploads.
pub const ALLOWED_AUDIO_TYPES: [&str; 6] = [
    "audio/webm",
    "audio/mp3",
    "audio/mpeg",
    "audio/wav",
    "audio/m4a",
    "audio/flac",
];

/// File extensions accepted when the content type is not recognised.
pub const ALLOWED_AUDIO_EXTENSIONS: [&str; 5] = [".webm", ".mp3", ".wav", ".m4a", ".flac"];

/// An uploaded audio file held in memory.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the upload; the result is trimmed and may be empty.
    async fn transcribe(&self, audio: &AudioUpload) -> Result<String>;
}

/// Whether an upload looks like a supported audio file.
pub fn validate_audio(filename: &str, content_type: &str) -> bool {
    if ALLOWED_AUDIO_TYPES.contains(&content_type) {
        return true;
    }
    let lower = filename.to_lowercase();
    ALLOWED_AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Metadata for a memory transcribed from audio. The audio keys always win
/// over same-named caller keys.
pub fn audio_metadata(caller: Option<Metadata>, filename: &str, content_type: &str) -> Metadata {
    let mut metadata = caller.unwrap_or_default();
    metadata.insert("source".into(), Value::String("audio".into()));
    metadata.insert("original_filename".into(), Value::String(filename.into()));
    metadata.insert("content_type".into(), Value::String(content_type.into()));
    metadata
}

/// Interpret the free-form `metadata` form field: a JSON object is used as
/// is, anything else is kept verbatim under `note`.
pub fn parse_metadata_field(raw: &str) -> Metadata {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut metadata = Metadata::new();
            metadata.insert("note".into(), Value::String(raw.to_string()));
            metadata
        }
    }
}

/// OpenAI `/audio/transcriptions` client.
pub struct OpenAiTranscriber {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openai
            .api_key
            .clone()
            .context("Transcription requires an OpenAI API key (OPENAI_API_KEY)")?;
        Ok(Self::new(
            api_key,
            config.openai.base_url.clone(),
            config.transcription.model.clone(),
        ))
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: &AudioUpload) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(audio.bytes.to_vec())
            .file_name(audio.filename.clone())
            .mime_str(&audio.content_type)
            .with_context(|| format!("Invalid audio content type '{}'", audio.content_type))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file);

        debug!(
            filename = %audio.filename,
            bytes = audio.bytes.len(),
            model = %self.model,
            "transcribing audio"
        );

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Transcription API error ({}): {}", status, body);
        }

        Ok(response.text().await?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upload() -> AudioUpload {
        AudioUpload {
            filename: "note.webm".into(),
            content_type: "audio/webm".into(),
            bytes: Bytes::from_static(b"\x1a\x45\xdf\xa3fake"),
        }
    }

    #[test]
    fn test_validate_audio_by_type_or_extension() {
        assert!(validate_audio("blob", "audio/mpeg"));
        assert!(validate_audio("Voice.M4A", "application/octet-stream"));
        assert!(validate_audio("clip.flac", ""));
        assert!(!validate_audio("notes.txt", "text/plain"));
        assert!(!validate_audio("audio.ogg", "audio/ogg"));
    }

    #[test]
    fn test_audio_metadata_overrides_caller_keys() {
        let caller = json!({"source": "phone", "tags": ["walk"]});
        let metadata = audio_metadata(
            caller.as_object().cloned(),
            "memo.wav",
            "audio/wav",
        );
        assert_eq!(metadata["source"], "audio");
        assert_eq!(metadata["original_filename"], "memo.wav");
        assert_eq!(metadata["content_type"], "audio/wav");
        assert_eq!(metadata["tags"], json!(["walk"]));
    }

    #[test]
    fn test_parse_metadata_field() {
        let parsed = parse_metadata_field(r#"{"tags": ["idea"]}"#);
        assert_eq!(parsed["tags"], json!(["idea"]));

        let note = parse_metadata_field("recorded on the train");
        assert_eq!(note["note"], "recorded on the train");

        let array = parse_metadata_field("[1, 2]");
        assert_eq!(array["note"], "[1, 2]");
    }

    #[tokio::test]
    async fn test_openai_transcriber_trims_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  remind me to call mom \n"))
            .expect(1)
            .mount(&server)
            .await;

        let transcriber =
            OpenAiTranscriber::new("sk-test".into(), format!("{}/", server.uri()), "whisper-1".into());
        let text = transcriber.transcribe(&upload()).await.unwrap();
        assert_eq!(text, "remind me to call mom");
    }

    #[tokio::test]
    async fn test_openai_transcriber_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
            .mount(&server)
            .await;

        let transcriber = OpenAiTranscriber::new("sk-test".into(), server.uri(), "whisper-1".into());
        let err = transcriber.transcribe(&upload()).await.unwrap_err().to_string();
        assert!(err.contains("400"));
        assert!(err.contains("bad audio"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = Config::default();
        config.openai.api_key = None;
        assert!(OpenAiTranscriber::from_config(&config).is_err());

        config.openai.api_key = Some("sk-test".into());
        assert!(OpenAiTranscriber::from_config(&config).is_ok());
    }
}
