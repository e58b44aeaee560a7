//! Integration tests for running batches end to end with scripted
//! collaborators: loop transitions, admission, isolation, usage and
//! persistence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{descriptors, run_state, scheduler, RecordingReporter};
use taskloop::adapters::agents::{ScriptedAgentFactory, ScriptedEvaluator, ScriptedReply};
use taskloop::domain::errors::DomainError;
use taskloop::domain::models::{
    Config, FailureKind, OutcomeStatus, TaskDescriptor, UsageReport, EVALUATION_UNAVAILABLE,
    TASK_COMPLETE_MARKER,
};
use taskloop::services::{
    load_snapshot, BatchRunner, ConcurrencyScheduler, ConvergenceLoop, SessionSettings,
};

#[tokio::test]
async fn test_completes_on_first_verdict() {
    let scheduler = scheduler(
        ScriptedAgentFactory::new(),
        ScriptedEvaluator::complete_after(1),
        10,
        3,
    );
    let (store, accumulator) = run_state(3);

    let outcomes = scheduler
        .run_all(descriptors(1), &store, &accumulator)
        .await
        .unwrap();

    let outcome = &outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.failure_kind.is_none());
    let response = outcome.last_response.as_deref().unwrap();
    assert!(response.starts_with("Finished step 1."));
    assert!(response.ends_with(TASK_COMPLETE_MARKER));
    assert!(outcome
        .last_evaluation
        .as_deref()
        .unwrap()
        .contains(TASK_COMPLETE_MARKER));
}

#[tokio::test]
async fn test_agent_error_keeps_previous_iteration() {
    let scheduler = scheduler(
        ScriptedAgentFactory::new().failing_on_call(3, "agent crashed"),
        ScriptedEvaluator::never_complete(),
        10,
        1,
    );
    let (store, accumulator) = run_state(1);

    let outcomes = scheduler
        .run_all(descriptors(1), &store, &accumulator)
        .await
        .unwrap();

    let outcome = &outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.failure_kind, Some(FailureKind::AgentCall));
    assert!(outcome.error_message.as_deref().unwrap().contains("agent crashed"));
    assert_eq!(outcome.last_response.as_deref(), Some("Finished step 2."));
    assert!(outcome
        .last_evaluation
        .as_deref()
        .unwrap()
        .starts_with("Not finished yet"));
}

#[tokio::test]
async fn test_iteration_cap_times_out() {
    let factory = ScriptedAgentFactory::new();
    let shutdowns = factory.shutdown_counter();
    let scheduler = scheduler(factory, ScriptedEvaluator::never_complete(), 4, 2);
    let (store, accumulator) = run_state(2);

    let outcomes = scheduler
        .run_all(descriptors(2), &store, &accumulator)
        .await
        .unwrap();

    for outcome in &outcomes {
        assert_eq!(outcome.status, OutcomeStatus::Timeout);
        assert_eq!(outcome.iterations, 4);
        assert_eq!(outcome.last_response.as_deref(), Some("Finished step 4."));
    }
    assert_eq!(shutdowns.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_verdict_is_fed_back_as_next_turn() {
    let factory = ScriptedAgentFactory::new()
        .with_replies(vec![ScriptedReply::text("draft one"), ScriptedReply::text("draft two")]);
    let prompts = factory.prompt_log();
    let evaluator = ScriptedEvaluator::from_verdicts(vec![
        "The README is missing install steps.".to_string(),
        format!("Looks complete. {TASK_COMPLETE_MARKER}"),
    ]);
    let scheduler = scheduler(factory, evaluator, 10, 1);
    let (store, accumulator) = run_state(1);

    let outcomes = scheduler
        .run_all(descriptors(1), &store, &accumulator)
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[0].iterations, 2);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("task number 0"));
    assert!(prompts[1].contains("draft one"));
    assert!(prompts[1].contains("The README is missing install steps."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ceiling_bounds_live_sessions() {
    let factory = ScriptedAgentFactory::new().with_latency(Duration::from_millis(20));
    let counters = factory.clone();
    let scheduler = scheduler(factory, ScriptedEvaluator::complete_after(2), 10, 2);
    let (store, accumulator) = run_state(2);

    let outcomes = scheduler
        .run_all(descriptors(5), &store, &accumulator)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Completed));
    assert!(counters.peak_active() <= 2, "peak was {}", counters.peak_active());
    assert!(counters.peak_active() >= 1);
    assert_eq!(counters.created(), 5);
    assert_eq!(counters.shutdowns(), 5);
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let scheduler = scheduler(
        ScriptedAgentFactory::new()
            .failing_task(1, 1, "disk full")
            .unavailable_task(3),
        ScriptedEvaluator::complete_after(2),
        10,
        2,
    );
    let (store, accumulator) = run_state(2);

    let outcomes = scheduler
        .run_all(descriptors(4), &store, &accumulator)
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[1].status, OutcomeStatus::Error);
    assert_eq!(outcomes[1].iterations, 1);
    assert!(outcomes[1].last_response.is_none());
    assert_eq!(outcomes[2].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[3].status, OutcomeStatus::Error);
    assert_eq!(outcomes[3].failure_kind, Some(FailureKind::SessionUnavailable));
    assert_eq!(outcomes[3].iterations, 0);
}

#[tokio::test]
async fn test_panicking_task_still_settles() {
    let factory = ScriptedAgentFactory::new().panicking_task(0);
    let scheduler = scheduler(factory.clone(), ScriptedEvaluator::complete_after(1), 10, 1);
    let (store, accumulator) = run_state(1);

    let outcomes = scheduler
        .run_all(descriptors(3), &store, &accumulator)
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, OutcomeStatus::Error);
    assert_eq!(outcomes[0].failure_kind, Some(FailureKind::Aborted));
    assert_eq!(outcomes[0].iterations, 1);
    assert!(outcomes[1..]
        .iter()
        .all(|o| o.status == OutcomeStatus::Completed));
    assert_eq!(store.len().await, 3);
    assert_eq!(factory.created(), 3);
    assert_eq!(factory.created(), factory.shutdowns());
}

#[tokio::test]
async fn test_evaluator_failure_runs_to_iteration_cap() {
    let factory = ScriptedAgentFactory::new();
    let prompts = factory.prompt_log();
    let scheduler = scheduler(factory, ScriptedEvaluator::failing("judge unreachable"), 3, 1);
    let (store, accumulator) = run_state(1);

    let outcomes = scheduler
        .run_all(descriptors(1), &store, &accumulator)
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, OutcomeStatus::Timeout);
    assert_eq!(outcomes[0].iterations, 3);
    assert!(outcomes[0].error_message.is_none());

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains(EVALUATION_UNAVAILABLE));
    assert!(prompts[2].contains(EVALUATION_UNAVAILABLE));
}

#[tokio::test(start_paused = true)]
async fn test_evaluator_timeout_fails_only_that_call() {
    let evaluator = ScriptedEvaluator::complete_after(1).with_latency(Duration::from_secs(120));
    let convergence = ConvergenceLoop::new(Arc::new(ScriptedAgentFactory::new()), Arc::new(evaluator))
        .with_settings(SessionSettings {
            evaluator_timeout: Some(Duration::from_secs(30)),
            ..SessionSettings::default()
        });
    let scheduler = ConcurrencyScheduler::new(convergence, 2);
    let (store, accumulator) = run_state(2);

    let outcomes = scheduler
        .run_all(descriptors(2), &store, &accumulator)
        .await
        .unwrap();

    for outcome in &outcomes {
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.failure_kind, Some(FailureKind::CallTimeout));
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.last_response.is_none());
    }
    assert_eq!(store.summarize().await.failed_tasks, 2);
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let scheduler = scheduler(
        ScriptedAgentFactory::new().with_latency(Duration::from_millis(5)),
        ScriptedEvaluator::complete_after(1),
        10,
        4,
    );
    let (store, accumulator) = run_state(4);
    let input = descriptors(8);

    let outcomes = scheduler
        .run_all(input.clone(), &store, &accumulator)
        .await
        .unwrap();

    for (position, (outcome, descriptor)) in outcomes.iter().zip(&input).enumerate() {
        assert_eq!(outcome.task_index, position);
        assert_eq!(&outcome.descriptor, descriptor);
    }
    let stored = store.outcomes().await;
    assert!(stored.windows(2).all(|w| w[0].task_index < w[1].task_index));
}

#[tokio::test]
async fn test_empty_task_list_fails_fast() {
    let scheduler = scheduler(
        ScriptedAgentFactory::new(),
        ScriptedEvaluator::complete_after(1),
        10,
        3,
    );
    let (store, accumulator) = run_state(3);

    let err = scheduler
        .run_all(Vec::new(), &store, &accumulator)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NoTasks));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_invalid_descriptor_becomes_error_outcome() {
    let factory = ScriptedAgentFactory::new();
    let counters = factory.clone();
    let scheduler = scheduler(factory, ScriptedEvaluator::complete_after(1), 10, 2);
    let (store, accumulator) = run_state(2);

    let mut input = descriptors(2);
    input.insert(
        1,
        TaskDescriptor {
            dir: Some("/work/empty".to_string()),
            first_prompt: None,
        },
    );

    let outcomes = scheduler
        .run_all(input, &store, &accumulator)
        .await
        .unwrap();

    assert_eq!(outcomes[1].status, OutcomeStatus::Error);
    assert_eq!(outcomes[1].iterations, 0);
    assert_eq!(outcomes[1].failure_kind, Some(FailureKind::InvalidTask));
    assert_eq!(outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(outcomes[2].status, OutcomeStatus::Completed);
    assert_eq!(counters.created(), 2);

    let summary = store.summarize().await;
    assert_eq!(summary.failed_tasks, 1);
    assert_eq!(summary.invalid_tasks, 1);
}

#[tokio::test]
async fn test_usage_aggregates_across_tasks() {
    let scheduler = scheduler(
        ScriptedAgentFactory::new().with_default_usage(UsageReport::new(150, 100, 50)),
        ScriptedEvaluator::complete_after(2).with_usage(UsageReport::new(20, 15, 5)),
        10,
        3,
    );
    let (store, accumulator) = run_state(3);

    let outcomes = scheduler
        .run_all(descriptors(3), &store, &accumulator)
        .await
        .unwrap();

    for outcome in &outcomes {
        assert_eq!(outcome.usage.total_tokens, 2 * (150 + 20));
        assert_eq!(outcome.usage.call_count, 4);
    }

    let total = accumulator.snapshot().await;
    assert_eq!(total.total_tokens, 3 * 2 * (150 + 20));
    assert_eq!(total.prompt_tokens, 3 * 2 * (100 + 15));
    assert_eq!(total.completion_tokens, 3 * 2 * (50 + 5));
    assert_eq!(total.call_count, 12);
    assert_eq!(store.summarize().await.usage, total);
}

#[tokio::test]
async fn test_batch_runner_reports_and_persists() {
    let reporter = RecordingReporter::default();
    let runner = BatchRunner::from_config(
        &Config::default(),
        Arc::new(ScriptedAgentFactory::new()),
        Arc::new(ScriptedEvaluator::complete_after(2)),
        Arc::new(reporter.clone()),
    );

    let run = runner.run(descriptors(2)).await.unwrap();
    assert_eq!(run.summary.completed_tasks, 2);
    assert!((run.summary.success_rate - 1.0).abs() < f64::EPSILON);

    assert_eq!(
        reporter.messages_for(0),
        vec![
            "started".to_string(),
            "iteration 1/10".to_string(),
            "iteration 2/10".to_string(),
            "completed after 2 iteration(s)".to_string(),
        ]
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results").join("run.json");
    let written = run.persist(&path).await.unwrap();
    let loaded = load_snapshot(&path).await.unwrap();

    assert_eq!(loaded, written);
    assert_eq!(loaded.results.len(), 2);
    let derived = loaded.recompute_summary();
    assert_eq!(derived.completed_tasks, run.summary.completed_tasks);
    assert_eq!(derived.usage, run.summary.usage);
    assert_eq!(derived.max_concurrent, Some(3));
}
