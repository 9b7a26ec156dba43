//! Request/response contract shared by every model provider.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Prompt used when probing whether a model identity is reachable.
pub const PROBE_PROMPT: &str = "Reply with the single word OK.";

/// Sampling parameters forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    #[serde(alias = "max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_output_tokens: 8192,
        }
    }
}

/// Inline binary content sent alongside the prompt (audio excerpts, frames).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// MIME type, e.g. `audio/mpeg` or `image/png`.
    pub mime_type: String,
    /// Optional display name; also used as the temp file stem.
    pub name: Option<String>,
    /// Raw bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an unnamed attachment.
    #[must_use]
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            name: None,
            data,
        }
    }

    /// File extension guessed from the MIME subtype.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map_or("bin", |(_, sub)| sub.split(';').next().unwrap_or("bin"))
    }
}

/// One outbound call to a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    /// Model identity to address.
    pub model: String,
    /// Prompt text.
    pub prompt: String,
    /// Inline binary attachments.
    pub attachments: Vec<Attachment>,
    /// Sampling parameters.
    pub generation: GenerationConfig,
    /// Machine-checkable output-shape descriptor (a JSON schema).
    pub response_schema: Option<serde_json::Value>,
}

impl ModelRequest {
    /// Creates a text-only request with default generation parameters.
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            attachments: Vec::new(),
            generation: GenerationConfig::default(),
            response_schema: None,
        }
    }

    /// Trivial request used to check that `model` answers at all.
    #[must_use]
    pub fn probe(model: impl Into<String>) -> Self {
        Self::new(model, PROBE_PROMPT).with_generation(GenerationConfig {
            temperature: 0.0,
            max_output_tokens: 8,
        })
    }

    /// Sets the generation parameters.
    #[must_use]
    pub const fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the expected output schema.
    #[must_use]
    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Adds an inline attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Free-form text returned by a model for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    /// Raw response text, expected to be JSON but not guaranteed.
    pub text: String,
    /// Model identity that produced the text.
    pub model: String,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
}

/// Settings for [`crate::CommandProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Explicit binary path (None = discover).
    pub binary: Option<PathBuf>,
    /// Arguments placed before the generated ones.
    pub extra_args: Vec<String>,
    /// Maximum execution time for a single call.
    pub timeout: Duration,
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            binary: None,
            extra_args: Vec::new(),
            timeout: Duration::from_secs(300),
            cwd: None,
            env: Vec::new(),
        }
    }
}

/// Captured outcome of a finished child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Exit code, -1 when killed by a signal.
    pub exit_code: i32,
    /// Wall time of the run.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_extension() {
        assert_eq!(Attachment::new("audio/mpeg", vec![]).extension(), "mpeg");
        assert_eq!(
            Attachment::new("text/plain; charset=utf-8", vec![]).extension(),
            "plain"
        );
        assert_eq!(Attachment::new("garbage", vec![]).extension(), "bin");
    }

    #[test]
    fn test_probe_request_is_small() {
        let req = ModelRequest::probe("m1");
        assert_eq!(req.model, "m1");
        assert_eq!(req.prompt, PROBE_PROMPT);
        assert_eq!(req.generation.max_output_tokens, 8);
        assert!(req.response_schema.is_none());
    }
}
