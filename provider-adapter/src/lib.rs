//! Model provider contract for editlens.
//!
//! A provider turns a [`ModelRequest`] (prompt, attachments, generation
//! parameters and an output-shape descriptor) into free-form text. Failures
//! surface as [`ProviderError`] whose message text is the only structured
//! signal downstream code relies on.
//!
//! [`CommandProvider`] is the bundled implementation: it drives a model CLI
//! as a subprocess, with the prompt on stdin and attachments as temp files.

/// Command-line argument construction for model CLI invocations.
pub mod cmd;
/// Discovery and resolution of the model CLI executable path.
pub mod discovery;
/// Error types returned by provider operations.
pub mod error;
/// Subprocess execution with bounded output and graceful timeouts.
pub mod process;
/// Request, response and configuration types.
pub mod types;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use discovery::{discover_model_cli, MODEL_BIN_ENV_VAR};
pub use error::ProviderError;
pub use process::run_model_command;
pub use types::*;

/// Anything that can answer a [`ModelRequest`] with text.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Performs one model call.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError>;
}

#[async_trait]
impl<P: ModelProvider + ?Sized> ModelProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        (**self).generate(request).await
    }
}

/// Provider backed by a model CLI subprocess.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    /// Filesystem path to the model CLI executable.
    pub path: PathBuf,
    /// Execution settings.
    pub config: CommandConfig,
}

impl CommandProvider {
    /// Creates a provider for an already-resolved binary.
    #[must_use]
    pub const fn new(path: PathBuf, config: CommandConfig) -> Self {
        Self { path, config }
    }

    /// Resolves the binary from `config.binary`, the environment, or `$PATH`.
    ///
    /// # Errors
    /// Returns `ProviderError::ExecutableNotFound` if no binary can be located.
    pub fn discover(config: CommandConfig) -> Result<Self, ProviderError> {
        let path = discover_model_cli(config.binary.clone())?;
        Ok(Self::new(path, config))
    }

    fn write_attachments(
        request: &ModelRequest,
    ) -> Result<(Option<tempfile::TempDir>, Vec<PathBuf>), ProviderError> {
        if request.attachments.is_empty() {
            return Ok((None, Vec::new()));
        }

        let dir = tempfile::tempdir().map_err(|e| ProviderError::SpawnFailed {
            stage: "create attachment dir".to_string(),
            source: e,
        })?;

        let mut paths = Vec::with_capacity(request.attachments.len());
        for (i, attachment) in request.attachments.iter().enumerate() {
            let path = dir.path().join(attachment_file_name(attachment, i));
            std::fs::write(&path, &attachment.data).map_err(|e| ProviderError::SpawnFailed {
                stage: "write attachment".to_string(),
                source: e,
            })?;
            paths.push(path);
        }

        Ok((Some(dir), paths))
    }
}

#[async_trait]
impl ModelProvider for CommandProvider {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        if request.model.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("model identity is empty".into()));
        }

        // The temp dir must outlive the child process.
        let (_attachment_dir, attachment_paths) = Self::write_attachments(request)?;
        let args = cmd::build_args(request, &self.config, &attachment_paths);

        tracing::debug!(
            event = "model_call_started",
            model = %request.model,
            prompt_chars = request.prompt.chars().count(),
            attachments = attachment_paths.len(),
            "model_call_started"
        );

        let result = run_model_command(&self.path, args, &request.prompt, &self.config).await?;

        if result.stdout.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                model: request.model.clone(),
            });
        }

        Ok(ModelResponse {
            text: result.stdout,
            model: request.model.clone(),
            duration_ms: result.duration_ms,
        })
    }
}

/// Temp file name for the `index`-th attachment. Only the final component of
/// a supplied name is kept, so a name can never point outside the temp dir.
fn attachment_file_name(attachment: &Attachment, index: usize) -> String {
    let stem = attachment
        .name
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("attachment-{index}"));
    let extension: String = attachment
        .extension()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+'))
        .collect();
    if extension.is_empty() {
        format!("{stem}.bin")
    } else {
        format!("{stem}.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, mime_type: &str) -> Attachment {
        Attachment {
            name: Some(name.to_string()),
            ..Attachment::new(mime_type, Vec::new())
        }
    }

    #[test]
    fn test_attachment_file_name_defaults() {
        let attachment = Attachment::new("image/png", Vec::new());
        assert_eq!(attachment_file_name(&attachment, 2), "attachment-2.png");
        assert_eq!(attachment_file_name(&named("frame", "image/jpeg"), 0), "frame.jpeg");
    }

    #[test]
    fn test_attachment_file_name_stays_in_dir() {
        assert_eq!(attachment_file_name(&named("../../etc/cron", "text/plain"), 0), "cron.plain");
        assert_eq!(attachment_file_name(&named("/tmp/evil", "text/plain"), 0), "evil.plain");
        assert_eq!(attachment_file_name(&named("..", "text/plain"), 3), "attachment-3.plain");
        assert_eq!(attachment_file_name(&named("clip", "audio/../../x"), 0), "clip.x");

        let dir = Path::new("/scratch");
        for name in ["../up", "/abs/path", "a/b/c", ".."] {
            let path = dir.join(attachment_file_name(&named(name, "a/b"), 0));
            assert_eq!(path.parent(), Some(dir), "{name}");
        }
    }
}
