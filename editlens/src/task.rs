//! One unit of work in a batch: a category, its prompt and its schema.

use crate::errors::AnalysisError;
use editlens_extract::{build_prompt, Category, SchemaRegistry, VideoContext};
use editlens_provider::{Attachment, GenerationConfig, ModelRequest};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Lazily renders a task's prompt. Called once per task run.
pub type PromptBuilder = Arc<dyn Fn() -> String + Send + Sync>;

/// Receives the human-readable text of each retry notice.
pub type RetryMessageSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-task overrides.
#[derive(Clone, Default)]
pub struct TaskOptions {
    /// Sampling parameters; the orchestrator's defaults when `None`.
    pub generation: Option<GenerationConfig>,
    /// Binary content sent with the prompt.
    pub attachments: Vec<Attachment>,
    /// Called with "Rate limited. Retrying in 14s ..." style messages.
    pub on_retry_message: Option<RetryMessageSink>,
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("generation", &self.generation)
            .field("attachments", &self.attachments.len())
            .field("on_retry_message", &self.on_retry_message.is_some())
            .finish()
    }
}

/// A category analysis waiting to run.
#[derive(Clone)]
pub struct AnalysisTask {
    /// Dimension analysed.
    pub category: Category,
    /// Output-shape descriptor sent with the request.
    pub schema: Value,
    /// Per-task overrides.
    pub options: TaskOptions,
    build_prompt: PromptBuilder,
}

impl fmt::Debug for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTask")
            .field("category", &self.category)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl AnalysisTask {
    /// Task with an arbitrary prompt builder.
    pub fn new(
        category: Category,
        schema: Value,
        build_prompt: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            schema,
            options: TaskOptions::default(),
            build_prompt: Arc::new(build_prompt),
        }
    }

    /// Task whose prompt is rendered from `video` with the registry's schema.
    pub fn for_video(
        category: Category,
        video: Arc<VideoContext>,
        registry: &SchemaRegistry,
    ) -> Result<Self, AnalysisError> {
        let schema = registry
            .schema(category)
            .map_err(|e| AnalysisError::Schema(e.to_string()))?
            .clone();
        let prompt_schema = schema.clone();
        Ok(Self::new(category, schema, move || {
            build_prompt(category, &video, &prompt_schema)
        }))
    }

    /// One task per category, in the given order.
    pub fn for_categories(
        categories: &[Category],
        video: &Arc<VideoContext>,
        registry: &SchemaRegistry,
    ) -> Result<Vec<Self>, AnalysisError> {
        categories
            .iter()
            .map(|&category| Self::for_video(category, Arc::clone(video), registry))
            .collect()
    }

    /// Replaces the per-task overrides.
    #[must_use]
    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    /// Renders the prompt.
    #[must_use]
    pub fn prompt(&self) -> String {
        (self.build_prompt)()
    }

    pub(crate) fn request(&self, model: &str, default_generation: GenerationConfig) -> ModelRequest {
        let mut request = ModelRequest::new(model, self.prompt())
            .with_generation(self.options.generation.unwrap_or(default_generation))
            .with_response_schema(self.schema.clone());
        for attachment in &self.options.attachments {
            request = request.with_attachment(attachment.clone());
        }
        request
    }
}
