//! Locates the model CLI binary on the system.

use crate::error::ProviderError;
use std::path::PathBuf;
use which::which;

/// Environment variable that overrides the default model CLI binary path.
pub const MODEL_BIN_ENV_VAR: &str = "EDITLENS_MODEL_BIN";

/// Binary name looked up on `$PATH` when nothing else is configured.
pub const DEFAULT_BINARY: &str = "editlens-model";

/// Locates the model CLI executable.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the `EDITLENS_MODEL_BIN` environment variable.
/// 3. `editlens-model` resolved via `$PATH`.
/// 4. Common install location fallbacks.
///
/// # Errors
///
/// Returns `ProviderError::ExecutableNotFound` when no valid executable can be
/// located.
pub fn discover_model_cli(explicit_path: Option<PathBuf>) -> Result<PathBuf, ProviderError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path);
        }
        if let Ok(found) = which(&path) {
            return Ok(found);
        }
        return Err(ProviderError::ExecutableNotFound(format!(
            "Explicit path does not exist: {}",
            path.display()
        )));
    }

    if let Ok(path_str) = std::env::var(MODEL_BIN_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(path) = which(DEFAULT_BINARY) {
        return Ok(path);
    }

    for location in fallback_locations() {
        if location.exists() {
            return Ok(location);
        }
    }

    Err(ProviderError::ExecutableNotFound(format!(
        "{DEFAULT_BINARY} not found. Set {MODEL_BIN_ENV_VAR} or `provider.binary` in the config.\n\
         Searched: PATH, common install locations."
    )))
}

fn fallback_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".local/bin").join(DEFAULT_BINARY));
    }
    #[cfg(unix)]
    locations.push(PathBuf::from("/usr/local/bin").join(DEFAULT_BINARY));
    locations
}
