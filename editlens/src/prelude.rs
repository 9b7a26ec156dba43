//! Common imports for editlens usage.
//!
//! ```
//! use editlens::prelude::*;
//! ```
//!
//! Re-exports the orchestrator, task and result types, the configuration and
//! error types, and the pieces of the provider, resilience and extract crates
//! a caller needs to wire a batch together.

// Orchestration
pub use crate::batch::{BatchResult, CategoryOutcome, TaskMetrics};
pub use crate::model_state::WorkingModel;
pub use crate::orchestrator::CategoryOrchestrator;
pub use crate::task::{AnalysisTask, TaskOptions};

// Configuration and errors
pub use crate::config::EditlensConfig;
pub use crate::errors::{AnalysisError, ConfigError};

// Providers
pub use editlens_provider::{
    Attachment, CommandProvider, GenerationConfig, ModelProvider, ModelRequest, ModelResponse,
    ProviderError,
};

// Resilience
pub use editlens_resilience::{CancellationToken, RateLimiter, Retrier, RetryPolicy};

// Reports
pub use editlens_extract::{
    Category, CategoryReport, Issue, SchemaRegistry, Severity, TranscriptSegment, VideoContext,
};
