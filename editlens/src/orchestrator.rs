//! Sequential, rate-limited, retrying execution of category tasks.

use crate::batch::{BatchResult, CategoryOutcome, TaskMetrics};
use crate::config::{EditlensConfig, DEFAULT_MODEL_CANDIDATES};
use crate::errors::AnalysisError;
use crate::model_state::{PinnedModel, WorkingModel};
use crate::task::AnalysisTask;
use editlens_extract::{estimate_tokens, extract_report, preview, CategoryReport, SchemaRegistry};
use editlens_provider::{GenerationConfig, ModelProvider, ModelRequest, ModelResponse, ProviderError};
use editlens_resilience::{
    CancellationToken, Clock, ErrorKind, RateLimiter, Retrier, RetryCallback, RetryError,
    RetryNotice, RetryPolicy,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

/// Progress sink: overall percent (0..=100) and an optional status line.
pub type ProgressFn = Arc<dyn Fn(u8, Option<&str>) + Send + Sync>;

#[derive(Debug, Error)]
enum CallError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
struct RunStats {
    attempts: u32,
    pinned: Option<PinnedModel>,
    output_tokens: usize,
    raw_preview: Option<String>,
}

/// Runs category tasks one at a time against a single provider.
///
/// Every outbound request, probes included, first passes the shared
/// [`RateLimiter`]. Model calls run under the [`Retrier`]; the working model
/// is probed lazily and cached in a [`WorkingModel`] shared with other
/// orchestrators on the same provider.
pub struct CategoryOrchestrator {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<SchemaRegistry>,
    limiter: Arc<RateLimiter>,
    retrier: Retrier,
    model_state: Arc<WorkingModel>,
    candidates: Vec<String>,
    generation: GenerationConfig,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for CategoryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryOrchestrator")
            .field("provider", &self.provider.name())
            .field("limiter", &self.limiter)
            .field("retrier", &self.retrier)
            .field("model_state", &self.model_state)
            .field("candidates", &self.candidates)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl CategoryOrchestrator {
    /// Orchestrator with default retry, rate-limit and candidate settings.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            provider,
            registry,
            limiter: Arc::new(RateLimiter::default()),
            retrier: Retrier::new(RetryPolicy::default()),
            model_state: Arc::new(WorkingModel::new()),
            candidates: DEFAULT_MODEL_CANDIDATES.map(String::from).to_vec(),
            generation: GenerationConfig::default(),
            progress: None,
        }
    }

    /// Orchestrator configured from an [`EditlensConfig`].
    #[must_use]
    pub fn from_config(
        provider: Arc<dyn ModelProvider>,
        registry: Arc<SchemaRegistry>,
        config: &EditlensConfig,
    ) -> Self {
        Self::new(provider, registry)
            .with_rate_limiter(Arc::new(RateLimiter::new(config.min_delay())))
            .with_retrier(Retrier::new(config.retry_policy()))
            .with_candidates(config.models.candidates.iter().cloned())
            .with_generation(config.generation)
    }

    /// Shares a rate limiter with other users of the same provider.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replaces the retrier.
    #[must_use]
    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    /// Rebuilds the retrier and rate limiter on `clock`, keeping their settings.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.retrier = Retrier::with_clock(*self.retrier.policy(), Arc::clone(&clock));
        self.limiter = Arc::new(RateLimiter::with_clock(self.limiter.min_delay(), clock));
        self
    }

    /// Shares the working-model cell.
    #[must_use]
    pub fn with_model_state(mut self, model_state: Arc<WorkingModel>) -> Self {
        self.model_state = model_state;
        self
    }

    /// Sets the probe order.
    #[must_use]
    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| !m.trim().is_empty())
            .collect();
        self
    }

    /// Default sampling parameters for tasks without an override.
    #[must_use]
    pub const fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Installs a progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(u8, Option<&str>) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// The shared working-model cell.
    #[must_use]
    pub const fn model_state(&self) -> &Arc<WorkingModel> {
        &self.model_state
    }

    /// The schema registry tasks are validated against.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    fn report(&self, percent: u8, message: Option<&str>) {
        if let Some(progress) = &self.progress {
            progress(percent, message);
        }
    }

    /// Runs `tasks` in order and assembles their outcomes.
    ///
    /// Never fails: a task that cannot produce a report contributes a `None`
    /// slot. When `cancel` fires, the task in flight and every task after it
    /// get `None` slots and the result is marked cancelled.
    pub async fn run_batch(&self, tasks: &[AnalysisTask], cancel: &CancellationToken) -> BatchResult {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("batch", batch_id = %batch_id, tasks = tasks.len());
        self.run_batch_inner(batch_id, tasks, cancel)
            .instrument(span)
            .await
    }

    async fn run_batch_inner(
        &self,
        batch_id: String,
        tasks: &[AnalysisTask],
        cancel: &CancellationToken,
    ) -> BatchResult {
        let total = tasks.len();
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;

        tracing::info!(event = "batch_started", tasks = total, "batch_started");
        self.report(0, Some("Starting analysis"));

        for (index, task) in tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let percent = progress_percent(index, total);
            self.report(percent, Some(&format!("Analyzing {}", task.category)));

            let span = tracing::info_span!("task", category = %task.category);
            let (result, metrics, raw_preview) = self
                .run_task_with_reset(task, percent, cancel)
                .instrument(span)
                .await;

            match result {
                Ok(report) => {
                    tracing::info!(
                        event = "task_succeeded",
                        category = %task.category,
                        attempts = metrics.attempts,
                        score = report.core().score,
                        "task_succeeded"
                    );
                    outcomes.push(CategoryOutcome::succeeded(task.category, report, metrics));
                }
                Err(AnalysisError::Cancelled) => {
                    outcomes.push(CategoryOutcome::failed(
                        task.category,
                        &AnalysisError::Cancelled,
                        metrics,
                    ));
                    cancelled = true;
                    break;
                }
                Err(error) => {
                    let shown = match &error {
                        AnalysisError::Parse { preview, .. } => Some(preview.as_str()),
                        _ => raw_preview.as_deref(),
                    };
                    tracing::warn!(
                        event = "task_failed",
                        category = %task.category,
                        attempts = metrics.attempts,
                        kind = error.label(),
                        error = %error,
                        preview = shown.unwrap_or(""),
                        "task_failed"
                    );
                    outcomes.push(CategoryOutcome::failed(task.category, &error, metrics));
                }
            }

            self.report(progress_percent(index + 1, total), None);
        }

        for task in tasks.iter().skip(outcomes.len()) {
            outcomes.push(CategoryOutcome::skipped(task.category));
        }

        let result = BatchResult::assemble(batch_id, outcomes, cancelled);
        tracing::info!(
            event = "batch_finished",
            succeeded = result.succeeded(),
            tasks = total,
            cancelled,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "batch_finished"
        );
        if !cancelled {
            self.report(100, Some("Analysis complete"));
        }
        result
    }

    /// One task, re-run once with a fresh probe if the first run blames the model.
    async fn run_task_with_reset(
        &self,
        task: &AnalysisTask,
        percent: u8,
        cancel: &CancellationToken,
    ) -> (Result<CategoryReport, AnalysisError>, TaskMetrics, Option<String>) {
        let started = Instant::now();
        let (mut result, mut stats) = self.run_task(task, percent, cancel).await;

        if let Err(error) = &result {
            if error.is_model_fault() {
                if let Some(pinned) = &stats.pinned {
                    if self.model_state.clear_if(pinned) {
                        tracing::info!(
                            event = "model_reset",
                            model = %pinned.model,
                            error = %error,
                            "model_reset"
                        );
                    }
                }
                let (retry_result, retry_stats) = self.run_task(task, percent, cancel).await;
                result = retry_result;
                stats = RunStats {
                    attempts: stats.attempts + retry_stats.attempts,
                    pinned: retry_stats.pinned.or(stats.pinned),
                    output_tokens: retry_stats.output_tokens,
                    raw_preview: retry_stats.raw_preview,
                };
            }
        }

        let metrics = TaskMetrics {
            attempts: stats.attempts,
            model: stats.pinned.map(|p| p.model),
            wall_time: started.elapsed(),
            estimated_output_tokens: stats.output_tokens,
        };
        (result, metrics, stats.raw_preview)
    }

    async fn run_task(
        &self,
        task: &AnalysisTask,
        percent: u8,
        cancel: &CancellationToken,
    ) -> (Result<CategoryReport, AnalysisError>, RunStats) {
        let mut stats = RunStats::default();

        let on_retry: RetryCallback<'_> = &|notice: &RetryNotice| {
            let message = notice.message();
            if let Some(sink) = &task.options.on_retry_message {
                sink(&message);
            }
            self.report(percent, Some(&message));
        };

        let pinned = match self.resolve_model(cancel, on_retry).await {
            Ok(pinned) => pinned,
            Err(error) => return (Err(error), stats),
        };
        let request = task.request(&pinned.model, self.generation);
        stats.pinned = Some(pinned);

        let request = &request;
        let outcome = self
            .retrier
            .run(cancel, Some(on_retry), move |_attempt| self.call(request, cancel))
            .await;

        let response = match outcome {
            Ok(attempted) => {
                stats.attempts = attempted.attempts;
                attempted.value
            }
            Err(error) => {
                stats.attempts = error.attempts();
                return (Err(error.into()), stats);
            }
        };

        stats.output_tokens = estimate_tokens(&response.text);
        stats.raw_preview = Some(preview(&response.text));
        let result = extract_report(&response.text, task.category, &self.registry)
            .map_err(AnalysisError::from);
        (result, stats)
    }

    /// Returns the pinned model, probing candidates in order if none is pinned.
    ///
    /// Probes run under the retrier, so a throttled candidate is backed off
    /// rather than skipped. A candidate is passed over only when its probe
    /// fails non-retryably or keeps failing with a model-fault kind. A probe
    /// that exhausts its retries on any other transient kind ends the
    /// search with that error.
    async fn resolve_model(
        &self,
        cancel: &CancellationToken,
        on_retry: RetryCallback<'_>,
    ) -> Result<PinnedModel, AnalysisError> {
        if let Some(pinned) = self.model_state.current() {
            return Ok(pinned);
        }

        let mut last_error = None;
        for candidate in &self.candidates {
            let probe = ModelRequest::probe(candidate.as_str());
            let probe = &probe;
            let outcome = self
                .retrier
                .run(cancel, Some(on_retry), move |_attempt| self.call(probe, cancel))
                .await;

            let error = match outcome {
                Ok(attempted) => {
                    let pinned = self.model_state.pin(candidate.as_str());
                    tracing::info!(
                        event = "model_pinned",
                        model = %candidate,
                        probe_attempts = attempted.attempts,
                        "model_pinned"
                    );
                    return Ok(pinned);
                }
                Err(RetryError::Cancelled { .. }) => return Err(AnalysisError::Cancelled),
                Err(error) => error,
            };

            let kind = error.kind().unwrap_or(ErrorKind::Unknown);
            tracing::debug!(
                event = "probe_failed",
                model = %candidate,
                kind = kind.label(),
                attempts = error.attempts(),
                error = %error,
                "probe_failed"
            );
            if matches!(error, RetryError::Exhausted { .. }) && !kind.is_model_fault() {
                return Err(error.into());
            }
            last_error = error.message().map(str::to_string);
        }

        Err(AnalysisError::NoWorkingModel {
            tried: self.candidates.clone(),
            last_error,
        })
    }

    /// One outbound request: rate limit, then the provider call, both
    /// abandoned when `cancel` fires.
    async fn call(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, CallError> {
        self.limiter
            .acquire(cancel)
            .await
            .map_err(|_| CallError::Cancelled)?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CallError::Cancelled),
            response = self.provider.generate(request) => response.map_err(CallError::from),
        }
    }
}

fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(completed.min(total) * 100 / total).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_is_monotonic() {
        let values: Vec<u8> = (0..=3).map(|i| progress_percent(i, 3)).collect();
        assert_eq!(values, vec![0, 33, 66, 100]);
        assert_eq!(progress_percent(0, 0), 100);
        assert_eq!(progress_percent(9, 3), 100);
    }
}
