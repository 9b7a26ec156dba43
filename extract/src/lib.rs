//! From unreliable model text to typed video-edit reports.
//!
//! The pipeline for one response is
//! [`repair`] → parse → [`normalize`] → [`enforce_limits`] → [`fill_defaults`] → [`validate`],
//! bundled as [`extract_report`]. Each stage is exposed on its own as well.
//!
//! ```
//! use editlens_extract::{extract_report, Category, SchemaRegistry};
//!
//! let registry = SchemaRegistry::new().unwrap();
//! let raw = "```json\n{\"score\": 0.8, \"summary\": \"Tight\", \"strengths\": \"Clear audio\"";
//! let report = extract_report(raw, Category::Audio, &registry).unwrap();
//! assert_eq!(report.core().strengths, vec!["Clear audio".to_string()]);
//! ```

/// Category, severity and issue-type vocabularies.
pub mod category;
/// Extraction errors.
pub mod error;
/// Token estimation.
pub mod metrics;
/// Shape normalisation, limits and defaults.
pub mod normalize;
/// Prompt construction.
pub mod prompt;
/// Syntactic JSON repair.
pub mod repair;
/// Typed category reports.
pub mod report;
/// Category schema registry.
pub mod schema;
/// Schema validation.
pub mod validate;

pub use category::{Category, IssueType, Severity, UnknownCategory};
pub use error::{preview, ExtractError, PREVIEW_CHARS};
pub use metrics::estimate_tokens;
pub use normalize::{
    enforce_limits, fill_defaults, normalize, normalize_for, NormalizeOptions, Normalizer,
};
pub use prompt::{build_prompt, format_timestamp, TranscriptSegment, VideoContext};
pub use repair::repair;
pub use report::{AnalysisCore, CategoryReport, Issue, TimeRange};
pub use schema::{category_schema, SchemaRegistry};
pub use validate::{validate, ValidationFailure, Violation};

use serde_json::Value;

/// Repairs and parses raw model text.
///
/// # Errors
/// [`ExtractError::Parse`] when the repaired text is still not JSON.
pub fn parse_response(raw: &str) -> Result<Value, ExtractError> {
    let repaired = repair(raw);
    serde_json::from_str(&repaired).map_err(|e| ExtractError::parse(e.to_string(), raw))
}

/// Runs the full pipeline for one category response.
///
/// # Errors
/// [`ExtractError::Parse`] or [`ExtractError::Validation`]; neither is
/// transient, so callers should not retry the same text.
pub fn extract_report(
    raw: &str,
    category: Category,
    registry: &SchemaRegistry,
) -> Result<CategoryReport, ExtractError> {
    let doc = parse_response(raw)?;
    let doc = normalize_for(doc, category);
    validate(registry, category, doc)
}
