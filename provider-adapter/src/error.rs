use thiserror::Error;

/// Errors returned by model providers.
///
/// Providers often signal rate limiting, quota exhaustion or overload only
/// through message text, so every variant's `Display` keeps the upstream
/// message intact for downstream classification.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Model CLI executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Executable not found: {0}")]
    WhichError(#[from] which::Error),

    #[error("Failed to spawn model process at stage '{stage}': {source}")]
    SpawnFailed {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model call timeout after {elapsed:?}")]
    Timeout {
        elapsed: std::time::Duration,
        pid: u32,
        partial_stdout: String,
        partial_stderr: String,
    },

    #[error("Model CLI exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        exit_code: i32,
        pid: u32,
        elapsed: std::time::Duration,
        stdout: String,
        stderr: String,
    },

    #[cfg(unix)]
    #[error("Failed to send signal {signal} to PID {pid}: {source}")]
    SignalFailed {
        signal: String,
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Child process stdin was not captured")]
    NoStdin,

    #[error("Child process stdout was not captured")]
    NoStdout,

    #[error("Child process stderr was not captured")]
    NoStderr,

    #[error("Could not get PID from child process")]
    NoPid,

    #[error("Output truncated: captured {captured_bytes} bytes (limit: {limit_bytes} bytes)")]
    OutputTruncated {
        captured_bytes: usize,
        limit_bytes: usize,
    },

    #[error("Model {model} returned an empty response")]
    EmptyResponse { model: String },

    #[error("Invalid model request: {0}")]
    InvalidRequest(String),

    /// Free-form provider failure carrying the provider's own message.
    #[error("{0}")]
    Upstream(String),
}

impl From<std::io::Error> for ProviderError {
    fn from(error: std::io::Error) -> Self {
        Self::SpawnFailed {
            stage: "unknown".to_string(),
            source: error,
        }
    }
}
