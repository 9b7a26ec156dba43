//! # editlens
//!
//! Per-category video edit analysis over an unreliable LLM provider.
//!
//! A batch runs one [`AnalysisTask`] per category, strictly in order. Every
//! outbound call is spaced by a shared rate limiter, wrapped in bounded retry
//! with backoff, and its text is repaired, normalised and validated into a
//! typed report. A category that cannot be analysed yields `None`; it never
//! aborts the batch.
//!
//! ## Example
//!
//! ```no_run
//! use editlens::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EditlensConfig::load(None)?;
//! let provider = Arc::new(CommandProvider::discover(config.command_config())?);
//! let registry = Arc::new(SchemaRegistry::new()?);
//!
//! let video = Arc::new(VideoContext {
//!     title: "Desk setup tour".into(),
//!     ..VideoContext::default()
//! });
//! let tasks = AnalysisTask::for_categories(&Category::ALL, &video, &registry)?;
//!
//! let orchestrator = CategoryOrchestrator::from_config(provider, registry, &config)
//!     .with_progress(|percent, message| eprintln!("{percent:>3}% {}", message.unwrap_or("")));
//! let result = orchestrator.run_batch(&tasks, &CancellationToken::new()).await;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Batch output and cross-category rollups.
pub mod batch;

/// TOML configuration.
pub mod config;

/// Public error types.
pub mod errors;

/// Working-model cell shared across tasks.
pub mod model_state;

/// Sequential batch execution.
pub mod orchestrator;

/// Category tasks.
pub mod task;

/// Commonly used types and traits.
pub mod prelude;

pub use batch::{BatchResult, CategoryOutcome, TaskMetrics, MAX_COMBINED_PRIORITY_ACTIONS};
pub use config::EditlensConfig;
pub use errors::{AnalysisError, ConfigError};
pub use model_state::{PinnedModel, WorkingModel};
pub use orchestrator::{CategoryOrchestrator, ProgressFn};
pub use task::{AnalysisTask, PromptBuilder, RetryMessageSink, TaskOptions};
