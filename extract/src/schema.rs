//! Fixed mapping from category to its JSON schema and compiled validator.

use crate::category::Category;
use crate::error::ExtractError;
use crate::report::{
    AudioReport, EngagementReport, HookReport, PacingReport, RetentionReport, ScriptingReport,
    TechnicalReport, VisualEditingReport,
};
use jsonschema::Validator;
use schemars::schema_for;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Raw schema document for a category, generated from its typed report.
#[must_use]
pub fn category_schema(category: Category) -> Value {
    match category {
        Category::Hook => json!(schema_for!(HookReport)),
        Category::Scripting => json!(schema_for!(ScriptingReport)),
        Category::Pacing => json!(schema_for!(PacingReport)),
        Category::VisualEditing => json!(schema_for!(VisualEditingReport)),
        Category::Audio => json!(schema_for!(AudioReport)),
        Category::Retention => json!(schema_for!(RetentionReport)),
        Category::Engagement => json!(schema_for!(EngagementReport)),
        Category::Technical => json!(schema_for!(TechnicalReport)),
    }
}

struct Entry {
    schema: Value,
    validator: Validator,
}

/// Every category's schema, compiled once. Immutable after construction.
pub struct SchemaRegistry {
    entries: HashMap<Category, Entry>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.entries.keys().copied().collect();
        categories.sort();
        f.debug_struct("SchemaRegistry")
            .field("categories", &categories)
            .finish()
    }
}

impl SchemaRegistry {
    /// Generates and compiles all eight schemas.
    ///
    /// # Errors
    /// Returns [`ExtractError::Schema`] if a generated schema fails to compile.
    pub fn new() -> Result<Self, ExtractError> {
        let mut entries = HashMap::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let schema = category_schema(category);
            let validator = Validator::new(&schema)
                .map_err(|e| ExtractError::Schema(format!("{category}: {e}")))?;
            entries.insert(category, Entry { schema, validator });
        }
        Ok(Self { entries })
    }

    /// Schema document for `category`.
    ///
    /// # Errors
    /// Returns [`ExtractError::Schema`] if the category is missing, which
    /// cannot happen for a registry built by [`SchemaRegistry::new`].
    pub fn schema(&self, category: Category) -> Result<&Value, ExtractError> {
        self.entry(category).map(|e| &e.schema)
    }

    /// Compiled validator for `category`.
    ///
    /// # Errors
    /// See [`SchemaRegistry::schema`].
    pub fn validator(&self, category: Category) -> Result<&Validator, ExtractError> {
        self.entry(category).map(|e| &e.validator)
    }

    fn entry(&self, category: Category) -> Result<&Entry, ExtractError> {
        self.entries
            .get(&category)
            .ok_or_else(|| ExtractError::Schema(format!("no schema registered for {category}")))
    }
}
