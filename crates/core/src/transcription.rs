//! Speech-to-text collaborator used by the transcription endpoint.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

/// File extensions accepted for transcription.
pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".m4a", ".webm", ".ogg", ".flac"];

/// Extension assumed when an upload has none.
pub const DEFAULT_AUDIO_EXTENSION: &str = ".webm";

/// An uploaded audio file ready to be transcribed.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// Lowercase extension including the leading dot, e.g. `.wav`.
    pub extension: String,
}

/// Returns the lowercase extension of `file_name`, or `.webm` when it has none.
pub fn audio_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string())
}

pub fn is_supported_extension(extension: &str) -> bool {
    SUPPORTED_AUDIO_EXTENSIONS.contains(&extension)
}

/// MIME type sent to the backend for an audio extension.
pub fn mime_type_for(extension: &str) -> &'static str {
    match extension {
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".m4a" => "audio/m4a",
        ".webm" => "audio/webm",
        ".ogg" => "audio/ogg",
        ".flac" => "audio/flac",
        ".mp4" => "audio/mp4",
        _ => "audio/wav",
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Converts speech in `clip` to text. An empty string means nothing was recognised.
    async fn transcribe(&self, clip: AudioClip) -> Result<String>;
}

#[derive(Deserialize)]
struct InferenceOutput {
    #[serde(default)]
    text: String,
}

/// Transcribes audio through the Hugging Face inference API.
pub struct HuggingFaceTranscriber {
    http: reqwest::Client,
    token: String,
    base_url: String,
    model: String,
    fallback_model: Option<String>,
}

impl HuggingFaceTranscriber {
    pub const DEFAULT_BASE_URL: &'static str = "https://api-inference.huggingface.co";

    pub fn new(token: String, model: String, fallback_model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model,
            fallback_model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request(&self, model: &str, clip: &AudioClip) -> Result<String> {
        let url = format!("{}/models/{}", self.base_url.trim_end_matches('/'), model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, mime_type_for(&clip.extension))
            .body(clip.bytes.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("API returned status {status}: {body}"));
        }
        let output: InferenceOutput = response.json().await?;
        Ok(output.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for HuggingFaceTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> Result<String> {
        match self.request(&self.model, &clip).await {
            Ok(text) => Ok(text),
            Err(primary) => {
                let Some(fallback) = &self.fallback_model else {
                    return Err(primary);
                };
                warn!(error = %primary, model = %self.model, %fallback, "Primary transcription model failed, trying fallback");
                self.request(fallback, &clip)
                    .await
                    .map_err(|_| primary.context("transcription failed with primary and fallback models"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_defaults_to_webm() {
        assert_eq!(audio_extension(None), ".webm");
        assert_eq!(audio_extension(Some("recording")), ".webm");
        assert_eq!(audio_extension(Some("Voice.WAV")), ".wav");
        assert_eq!(audio_extension(Some("clip.tar.ogg")), ".ogg");
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported_extension(".mp3"));
        assert!(is_supported_extension(".flac"));
        assert!(!is_supported_extension(".exe"));
        assert!(!is_supported_extension(".mp4"));
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type_for(".mp3"), "audio/mpeg");
        assert_eq!(mime_type_for(".webm"), "audio/webm");
        assert_eq!(mime_type_for(".unknown"), "audio/wav");
    }

    #[test]
    fn inference_output_tolerates_missing_text() {
        let output: InferenceOutput = serde_json::from_str("{}").unwrap();
        assert!(output.text.is_empty());
        let output: InferenceOutput = serde_json::from_str(r#"{"text":" hello "}"#).unwrap();
        assert_eq!(output.text, " hello ");
    }
}
