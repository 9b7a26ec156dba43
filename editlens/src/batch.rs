//! Batch output: one entry per requested category plus cross-category rollups.

use crate::errors::AnalysisError;
use editlens_extract::{Category, CategoryReport, Issue};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::time::Duration;

/// Cap on the combined priority-action list.
pub const MAX_COMBINED_PRIORITY_ACTIONS: usize = 5;

/// Accounting for one category task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    /// Model invocations, including retries and a reset re-run.
    pub attempts: u32,
    /// Model identity used by the final run.
    pub model: Option<String>,
    /// Time from task start to outcome, including waits.
    #[serde(rename = "wallTimeMs", serialize_with = "serialize_millis")]
    pub wall_time: Duration,
    /// Output tokens of the final response, 4 chars per token.
    pub estimated_output_tokens: usize,
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// Result slot for one category. `result` is `None` when analysis is
/// unavailable for the category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOutcome {
    /// Dimension this slot answers.
    pub category: Category,
    /// Validated report.
    pub result: Option<CategoryReport>,
    /// Accounting for the task, zeroed when it never ran.
    pub metrics: TaskMetrics,
    /// Display text of the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategoryOutcome {
    /// Successful slot.
    #[must_use]
    pub const fn succeeded(category: Category, report: CategoryReport, metrics: TaskMetrics) -> Self {
        Self {
            category,
            result: Some(report),
            metrics,
            error: None,
        }
    }

    /// Failed slot.
    #[must_use]
    pub fn failed(category: Category, error: &AnalysisError, metrics: TaskMetrics) -> Self {
        Self {
            category,
            result: None,
            metrics,
            error: Some(error.to_string()),
        }
    }

    /// Slot for a task the batch never started.
    #[must_use]
    pub fn skipped(category: Category) -> Self {
        Self::failed(category, &AnalysisError::Cancelled, TaskMetrics::default())
    }
}

/// Everything one batch produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Random v4 id, also recorded on the batch's tracing span.
    pub batch_id: String,
    /// In task-list order, one per task, whether or not it succeeded.
    pub categories: Vec<CategoryOutcome>,
    /// Every issue from every successful category, most severe first.
    pub issues: Vec<Issue>,
    /// Mean score of the successful categories.
    pub overall_score: Option<f64>,
    /// Deduplicated case-insensitively, in category order.
    pub priority_actions: Vec<String>,
    /// Set when cancellation stopped the batch early.
    pub cancelled: bool,
}

impl BatchResult {
    /// Builds the rollups from per-category outcomes.
    #[must_use]
    pub fn assemble(batch_id: String, categories: Vec<CategoryOutcome>, cancelled: bool) -> Self {
        let reports: Vec<&CategoryReport> =
            categories.iter().filter_map(|c| c.result.as_ref()).collect();
        Self {
            issues: combined_issues(&reports),
            overall_score: average_score(&reports),
            priority_actions: combined_priority_actions(&reports),
            batch_id,
            categories,
            cancelled,
        }
    }

    /// Report for `category`, if it succeeded.
    #[must_use]
    pub fn get(&self, category: Category) -> Option<&CategoryReport> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .and_then(|c| c.result.as_ref())
    }

    /// Number of categories with a result.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.categories.iter().filter(|c| c.result.is_some()).count()
    }
}

fn combined_issues(reports: &[&CategoryReport]) -> Vec<Issue> {
    let mut issues: Vec<Issue> = reports
        .iter()
        .flat_map(|r| r.core().issues.iter().cloned())
        .collect();
    // Stable, so ties keep category order.
    issues.sort_by_key(|issue| issue.severity);
    issues
}

fn average_score(reports: &[&CategoryReport]) -> Option<f64> {
    if reports.is_empty() {
        return None;
    }
    let sum: f64 = reports.iter().map(|r| r.core().score).sum();
    #[allow(clippy::cast_precision_loss)]
    Some(sum / reports.len() as f64)
}

fn combined_priority_actions(reports: &[&CategoryReport]) -> Vec<String> {
    let mut seen = HashSet::new();
    reports
        .iter()
        .flat_map(|r| r.core().priority_actions.iter())
        .map(|action| action.trim())
        .filter(|action| !action.is_empty() && seen.insert(action.to_lowercase()))
        .take(MAX_COMBINED_PRIORITY_ACTIONS)
        .map(str::to_string)
        .collect()
}
