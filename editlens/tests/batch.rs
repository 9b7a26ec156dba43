//! Batch behaviour against scripted providers: retries, model resets,
//! cancellation and aggregation.

use async_trait::async_trait;
use editlens::prelude::*;
use editlens_provider::PROBE_PROMPT;
use editlens_resilience::ManualClock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Script = Box<dyn Fn(&ModelRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Answers requests from a closure and records every call.
struct ScriptedProvider {
    script: Script,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedProvider {
    fn new(script: impl Fn(&ModelRequest) -> Result<String, ProviderError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn task_calls(&self, prompt: &str) -> usize {
        self.calls().iter().filter(|(_, p)| p == prompt).count()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.model.clone(), request.prompt.clone()));
        (self.script)(request).map(|text| ModelResponse {
            text,
            model: request.model.clone(),
            duration_ms: 0,
        })
    }
}

fn good_response(score: f64, action: &str) -> String {
    format!(
        r#"{{"score": {score}, "summary": "fine", "issues": [{{"id": "1", "severity": "major", "description": "d", "suggestion": "s"}}], "priorityActions": ["{action}"]}}"#
    )
}

fn prompt_for(category: Category) -> String {
    format!("analyze {category}")
}

fn tasks(categories: &[Category]) -> Vec<AnalysisTask> {
    let registry = SchemaRegistry::new().unwrap();
    categories
        .iter()
        .map(|&category| {
            let schema = registry.schema(category).unwrap().clone();
            AnalysisTask::new(category, schema, move || prompt_for(category))
        })
        .collect()
}

fn orchestrator(provider: Arc<ScriptedProvider>) -> CategoryOrchestrator {
    CategoryOrchestrator::new(provider, Arc::new(SchemaRegistry::new().unwrap()))
        .with_candidates(["model-a", "model-b"])
        .with_retrier(Retrier::new(RetryPolicy::default().with_jitter(0.0)))
}

const SCENARIO: [Category; 3] = [Category::Hook, Category::Pacing, Category::Audio];

fn pacing_always_rate_limited() -> Arc<ScriptedProvider> {
    ScriptedProvider::new(|request| {
        if request.prompt == PROBE_PROMPT {
            Ok("OK".into())
        } else if request.prompt == prompt_for(Category::Pacing) {
            Err(ProviderError::Upstream("HTTP 429 Too Many Requests".into()))
        } else {
            Ok(good_response(0.8, "Tighten intro"))
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_task_fails_alone() {
    let provider = pacing_always_rate_limited();
    let orchestrator = orchestrator(Arc::clone(&provider));

    let started = tokio::time::Instant::now();
    let result = orchestrator
        .run_batch(&tasks(&SCENARIO), &CancellationToken::new())
        .await;
    let elapsed = started.elapsed();

    assert!(!result.cancelled);
    assert_eq!(result.categories.len(), 3);
    assert!(result.get(Category::Hook).is_some());
    assert!(result.get(Category::Pacing).is_none());
    assert!(result.get(Category::Audio).is_some());

    let pacing = &result.categories[1];
    assert_eq!(pacing.category, Category::Pacing);
    assert_eq!(pacing.metrics.attempts, 4);
    assert!(pacing.error.as_deref().unwrap().contains("Rate limited after 4 attempts"));
    assert_eq!(provider.task_calls(&prompt_for(Category::Pacing)), 4);

    // 4s spacing before task 1, 4s before task 2, backoff 2+4+8 with 2s of
    // extra spacing after the first backoff, 4s spacing before task 3.
    assert!(elapsed >= Duration::from_secs(28), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(29), "{elapsed:?}");
}

#[tokio::test]
async fn test_rate_limited_schedule_under_manual_clock() {
    let provider = pacing_always_rate_limited();
    let clock = ManualClock::new();
    let orchestrator = orchestrator(Arc::clone(&provider)).with_clock(Arc::new(clock.clone()));

    let result = orchestrator
        .run_batch(&tasks(&SCENARIO), &CancellationToken::new())
        .await;

    assert_eq!(result.succeeded(), 2);
    let secs: Vec<u64> = clock.sleeps().iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![4, 4, 2, 2, 4, 8, 4]);
    assert_eq!(clock.total_slept(), Duration::from_secs(28));
}

#[tokio::test(start_paused = true)]
async fn test_model_fault_resets_and_reprobes() {
    let probes_of_a = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&probes_of_a);
    let provider = ScriptedProvider::new(move |request| {
        match (request.prompt == PROBE_PROMPT, request.model.as_str()) {
            (true, "model-a") if counter.fetch_add(1, Ordering::SeqCst) == 0 => Ok("OK".into()),
            (true, "model-a") => Err(ProviderError::Upstream("404 models/model-a is not found".into())),
            (true, _) => Ok("OK".into()),
            (false, "model-a") => Err(ProviderError::Upstream("404 models/model-a is not found".into())),
            (false, _) => Ok(good_response(0.6, "Cut dead air")),
        }
    });
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(&tasks(&[Category::Hook, Category::Audio]), &CancellationToken::new())
        .await;

    assert_eq!(result.succeeded(), 2);
    let hook = &result.categories[0];
    assert_eq!(hook.metrics.model.as_deref(), Some("model-b"));
    assert_eq!(hook.metrics.attempts, 2);
    assert_eq!(result.categories[1].metrics.attempts, 1);
    assert_eq!(
        orchestrator.model_state().current().map(|p| p.model),
        Some("model-b".to_string())
    );
    assert_eq!(probes_of_a.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reset_run_records_none() {
    let provider = ScriptedProvider::new(|request| {
        if request.prompt == PROBE_PROMPT {
            Ok("OK".into())
        } else {
            Err(ProviderError::Upstream("model is no longer available".into()))
        }
    });
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(&tasks(&[Category::Technical]), &CancellationToken::new())
        .await;

    assert_eq!(result.succeeded(), 0);
    assert_eq!(result.categories[0].metrics.attempts, 2);
    assert_eq!(provider.task_calls(&prompt_for(Category::Technical)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_backoff_returns_partial_result() {
    let provider = pacing_always_rate_limited();
    let orchestrator = orchestrator(Arc::clone(&provider));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(9)).await;
        trigger.cancel();
    });

    let result = orchestrator.run_batch(&tasks(&SCENARIO), &cancel).await;

    assert!(result.cancelled);
    assert_eq!(result.categories.len(), 3);
    assert!(result.get(Category::Hook).is_some());
    assert!(result.categories[1].result.is_none());
    assert_eq!(result.categories[1].error.as_deref(), Some("Analysis cancelled"));
    assert!(result.categories[2].result.is_none());
    assert_eq!(result.categories[2].metrics.attempts, 0);
    assert_eq!(provider.task_calls(&prompt_for(Category::Audio)), 0);
    assert!((result.overall_score.unwrap() - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let provider = pacing_always_rate_limited();
    let orchestrator = orchestrator(Arc::clone(&provider));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator.run_batch(&tasks(&SCENARIO), &cancel).await;

    assert!(result.cancelled);
    assert_eq!(result.succeeded(), 0);
    assert_eq!(result.categories.len(), 3);
    assert!(provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_working_model() {
    let provider = ScriptedProvider::new(|_| Err(ProviderError::Upstream("401 invalid api key".into())));
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(&tasks(&[Category::Hook]), &CancellationToken::new())
        .await;

    assert!(result.get(Category::Hook).is_none());
    assert!(result.categories[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("No working model"));
    assert!(result.overall_score.is_none());
    assert_eq!(provider.calls().len(), 2);
}

fn discovery_calls(provider: &ScriptedProvider, model: &str) -> usize {
    provider
        .calls()
        .iter()
        .filter(|(m, p)| m == model && p == PROBE_PROMPT)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_throttled_discovery_backs_off_and_pins() {
    let throttled = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&throttled);
    let provider = ScriptedProvider::new(move |request| {
        if request.prompt != PROBE_PROMPT {
            return Ok(good_response(0.7, "Trim the intro"));
        }
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(ProviderError::Upstream("429 Too Many Requests".into()))
        } else {
            Ok("OK".into())
        }
    });
    let retry_messages: Arc<Mutex<Vec<String>>> = Arc::default();
    let task_sink = Arc::clone(&retry_messages);
    let mut batch = tasks(&[Category::Hook]);
    batch[0].options = TaskOptions {
        on_retry_message: Some(Arc::new(move |message: &str| {
            task_sink.lock().unwrap().push(message.to_string());
        })),
        ..TaskOptions::default()
    };
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator.run_batch(&batch, &CancellationToken::new()).await;

    assert!(result.get(Category::Hook).is_some(), "{:?}", result.categories[0].error);
    assert_eq!(result.categories[0].metrics.model.as_deref(), Some("model-a"));
    assert_eq!(result.categories[0].metrics.attempts, 1);
    assert_eq!(discovery_calls(&provider, "model-a"), 3);
    assert_eq!(discovery_calls(&provider, "model-b"), 0);

    let retry_messages = retry_messages.lock().unwrap();
    assert_eq!(retry_messages.len(), 2);
    assert!(retry_messages[0].starts_with("Rate limited. Retrying in 2s"));
    assert!(retry_messages[1].starts_with("Rate limited. Retrying in 4s"));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_discovery_is_not_a_dead_model() {
    let provider = ScriptedProvider::new(|_| {
        Err(ProviderError::Upstream("HTTP 429 Too Many Requests".into()))
    });
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(&tasks(&[Category::Hook]), &CancellationToken::new())
        .await;

    let error = result.categories[0].error.as_deref().unwrap();
    assert!(error.starts_with("Rate limited after 4 attempts"), "{error}");
    assert_eq!(discovery_calls(&provider, "model-a"), 4);
    assert_eq!(discovery_calls(&provider, "model-b"), 0);
    assert_eq!(provider.task_calls(&prompt_for(Category::Hook)), 0);
    assert!(orchestrator.model_state().current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_persistently_unavailable_candidate_is_skipped() {
    let provider = ScriptedProvider::new(|request| match request.model.as_str() {
        "model-a" => Err(ProviderError::Upstream("503 Service Unavailable".into())),
        _ if request.prompt == PROBE_PROMPT => Ok("OK".into()),
        _ => Ok(good_response(0.5, "Fix the mix")),
    });
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(&tasks(&[Category::Audio]), &CancellationToken::new())
        .await;

    assert!(result.get(Category::Audio).is_some());
    assert_eq!(result.categories[0].metrics.model.as_deref(), Some("model-b"));
    assert_eq!(discovery_calls(&provider, "model-a"), 4);
    assert_eq!(discovery_calls(&provider, "model-b"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bad_responses_do_not_stop_the_batch() {
    let provider = ScriptedProvider::new(|request| {
        if request.prompt == PROBE_PROMPT {
            Ok("OK".into())
        } else if request.prompt == prompt_for(Category::Hook) {
            Ok("I'm sorry, I can't analyse this video.".into())
        } else if request.prompt == prompt_for(Category::Scripting) {
            Ok(r#"{"issues": [{"severity": "apocalyptic"}]}"#.into())
        } else {
            Ok(good_response(0.9, "Add captions"))
        }
    });
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(
            &tasks(&[Category::Hook, Category::Scripting, Category::Engagement]),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.succeeded(), 1);
    assert!(result.categories[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Unparseable model response"));
    assert!(result.categories[1]
        .error
        .as_deref()
        .unwrap()
        .contains("/issues/0/severity"));
    // Neither failure is transient, so each was called exactly once.
    assert_eq!(provider.task_calls(&prompt_for(Category::Hook)), 1);
    assert_eq!(provider.task_calls(&prompt_for(Category::Scripting)), 1);
    assert!(result.get(Category::Engagement).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_monotonic_and_reports_retries() {
    let provider = pacing_always_rate_limited();
    let seen: Arc<Mutex<Vec<(u8, Option<String>)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let retry_messages: Arc<Mutex<Vec<String>>> = Arc::default();
    let task_sink = Arc::clone(&retry_messages);

    let orchestrator = orchestrator(Arc::clone(&provider)).with_progress(move |percent, message| {
        sink.lock().unwrap().push((percent, message.map(str::to_string)));
    });

    let mut batch = tasks(&SCENARIO);
    batch[1].options = TaskOptions {
        on_retry_message: Some(Arc::new(move |message: &str| {
            task_sink.lock().unwrap().push(message.to_string());
        })),
        ..TaskOptions::default()
    };

    orchestrator.run_batch(&batch, &CancellationToken::new()).await;

    let seen = seen.lock().unwrap();
    let percents: Vec<u8> = seen.iter().map(|(p, _)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.last(), Some(&100));
    assert!(seen
        .iter()
        .any(|(p, m)| *p == 33 && m.as_deref().is_some_and(|m| m.starts_with("Rate limited. Retrying in"))));

    let retry_messages = retry_messages.lock().unwrap();
    assert_eq!(retry_messages.len(), 3);
    assert!(retry_messages[0].contains("attempt 1, 3 remaining"));
}

#[tokio::test(start_paused = true)]
async fn test_aggregation_across_categories() {
    let provider = ScriptedProvider::new(|request| {
        if request.prompt == PROBE_PROMPT {
            return Ok("OK".into());
        }
        Ok(if request.prompt == prompt_for(Category::Hook) {
            r#"{"score": 0.4, "issues": [{"id": "h1", "severity": "minor"}], "priorityActions": ["Open with the result", "Cut the logo sting"]}"#.to_string()
        } else {
            r#"{"score": 0.8, "issues": [{"id": "a1", "severity": "critical"}], "priorityActions": ["cut the logo sting", "Duck the music"]}"#.to_string()
        })
    });
    let orchestrator = orchestrator(Arc::clone(&provider));

    let result = orchestrator
        .run_batch(&tasks(&[Category::Hook, Category::Audio]), &CancellationToken::new())
        .await;

    assert!((result.overall_score.unwrap() - 0.6).abs() < 1e-9);
    let ids: Vec<&str> = result.issues.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "h1"]);
    assert_eq!(
        result.priority_actions,
        vec!["Open with the result", "Cut the logo sting", "Duck the music"]
    );
    assert_eq!(result.categories[0].metrics.model.as_deref(), Some("model-a"));
    assert!(result.categories[0].metrics.estimated_output_tokens > 0);
    assert!(!result.batch_id.is_empty());
}

#[test]
fn test_analysis_error_is_model_fault_only_for_model_kinds() {
    let err = AnalysisError::NoWorkingModel {
        tried: vec!["model-a".into()],
        last_error: Some("401".into()),
    };
    assert!(!err.is_model_fault());
}
