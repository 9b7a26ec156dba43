//! Schema validation with structured, renderable violations.

use crate::category::Category;
use crate::error::ExtractError;
use crate::report::CategoryReport;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One failed schema check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer into the document, `/` for the root.
    pub path: String,
    /// Validator message.
    pub message: String,
    /// Failing schema keyword, e.g. `required` or `maxItems`.
    pub code: String,
}

/// All violations found for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// In the order the validator reported them.
    pub violations: Vec<Violation>,
}

impl ValidationFailure {
    /// `path: message` pairs joined by `; `.
    #[must_use]
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.path, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Every violation of `doc` against `category`'s schema. Empty when valid.
///
/// # Errors
/// Only registry lookups fail; validation outcomes are returned as data.
pub fn collect_violations(
    registry: &SchemaRegistry,
    category: Category,
    doc: &Value,
) -> Result<Vec<Violation>, ExtractError> {
    let validator = registry.validator(category)?;
    Ok(validator
        .iter_errors(doc)
        .map(|error| {
            let path = error.instance_path.to_string();
            let schema_path = error.schema_path.to_string();
            let code = schema_path
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or("schema")
                .to_string();
            Violation {
                path: if path.is_empty() { "/".to_string() } else { path },
                message: error.to_string(),
                code,
            }
        })
        .collect())
}

/// Validates `doc` and deserialises it into the category's typed report.
///
/// # Errors
/// [`ExtractError::Validation`] carries every violation; a typed
/// deserialisation failure after a clean validation is reported the same way
/// with code `deserialize`.
pub fn validate(
    registry: &SchemaRegistry,
    category: Category,
    doc: Value,
) -> Result<CategoryReport, ExtractError> {
    let violations = collect_violations(registry, category, &doc)?;
    if !violations.is_empty() {
        return Err(ExtractError::Validation(ValidationFailure { violations }));
    }
    CategoryReport::from_value(category, doc).map_err(|e| {
        ExtractError::Validation(ValidationFailure {
            violations: vec![Violation {
                path: "/".to_string(),
                message: e.to_string(),
                code: "deserialize".to_string(),
            }],
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_technical() -> Value {
        json!({
            "score": 0.5,
            "summary": "",
            "issues": [],
            "strengths": [],
            "priorityActions": [],
            "qualityChecks": {
                "resolution": "1080p",
                "lighting": "even",
                "framing": "centered",
                "exportSettings": "h264"
            }
        })
    }

    #[test]
    fn test_valid_document_produces_report() {
        let registry = SchemaRegistry::new().unwrap();
        let report = validate(&registry, Category::Technical, valid_technical()).unwrap();
        assert_eq!(report.category(), Category::Technical);
    }

    #[test]
    fn test_violations_carry_path_and_code() {
        let registry = SchemaRegistry::new().unwrap();
        let mut doc = valid_technical();
        doc["score"] = json!(3.0);
        doc.as_object_mut().unwrap().remove("summary");
        doc["priorityActions"] = json!(["a", "b", "c", "d"]);

        let violations = collect_violations(&registry, Category::Technical, &doc).unwrap();
        let codes: Vec<&str> = violations.iter().map(|v| v.code.as_str()).collect();
        assert!(codes.contains(&"maximum"), "{codes:?}");
        assert!(codes.contains(&"required"), "{codes:?}");
        assert!(codes.contains(&"maxItems"), "{codes:?}");
        assert!(violations.iter().any(|v| v.path == "/score"));
    }

    #[test]
    fn test_unknown_enum_value_is_a_violation() {
        let registry = SchemaRegistry::new().unwrap();
        let mut doc = valid_technical();
        doc["issues"] = json!([{
            "id": "1",
            "type": "cut",
            "severity": "catastrophic",
            "category": "technical",
            "description": "",
            "suggestion": ""
        }]);

        let err = validate(&registry, Category::Technical, doc).unwrap_err();
        let ExtractError::Validation(failure) = err else {
            panic!("expected validation failure");
        };
        assert!(failure.violations.iter().any(|v| v.path == "/issues/0/severity"));
    }

    #[test]
    fn test_summary_format() {
        let failure = ValidationFailure {
            violations: vec![
                Violation {
                    path: "/score".into(),
                    message: "3.0 is greater than the maximum of 1.0".into(),
                    code: "maximum".into(),
                },
                Violation {
                    path: "/".into(),
                    message: "\"summary\" is a required property".into(),
                    code: "required".into(),
                },
            ],
        };
        assert_eq!(
            failure.summary(),
            "/score: 3.0 is greater than the maximum of 1.0; /: \"summary\" is a required property"
        );
    }
}
