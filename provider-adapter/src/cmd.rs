//! Command-line argument construction for model CLI invocations.

use crate::types::{CommandConfig, ModelRequest};
use std::ffi::OsString;
use std::path::PathBuf;

/// Builds the argument list for one model call.
///
/// The prompt itself is delivered on stdin, so only the request metadata
/// appears on the command line.
#[must_use]
pub fn build_args(
    request: &ModelRequest,
    config: &CommandConfig,
    attachment_paths: &[PathBuf],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.extra_args.iter().map(OsString::from).collect();

    args.push(OsString::from("--model"));
    args.push(OsString::from(&request.model));

    args.push(OsString::from("--temperature"));
    args.push(OsString::from(request.generation.temperature.to_string()));

    args.push(OsString::from("--max-tokens"));
    args.push(OsString::from(request.generation.max_output_tokens.to_string()));

    if let Some(schema) = &request.response_schema {
        args.push(OsString::from("--json-schema"));
        args.push(OsString::from(schema.to_string()));
    }

    for path in attachment_paths {
        args.push(OsString::from("--attachment"));
        args.push(path.as_os_str().to_os_string());
    }

    args
}
