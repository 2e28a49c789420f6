mod common;

use std::sync::Arc;
use std::time::Duration;

use flywheel::config::WorkerConfig;
use flywheel::error::WorkerError;
use flywheel::protocol::decision::Decision;
use flywheel::protocol::task::WorkflowQuery;
use flywheel::replay::WorkflowReplayer;
use flywheel::service::DecisionTaskFailedCause;
use flywheel::worker::activity::ActivityRegistry;
use flywheel::worker::Worker;

use common::*;

fn config() -> WorkerConfig {
	WorkerConfig::new("test-domain", "tl").with_identity("it-worker")
}

#[tokio::test]
async fn workflow_worker_schedules_then_completes() {
	init_tracing();

	let service = Arc::new(MockService::new());

	// First task: only the started event; user code schedules a1
	service.push_decision_task(decision_task(b"task-1", vec![started_event()]));

	let worker = Worker::new(
		service.clone(),
		config(),
		Arc::new(ScriptedWorkflow),
		ActivityRegistry::new(),
	);
	worker.start();

	wait_until(|| !service.decision_completions.lock().unwrap().is_empty()).await;
	{
		let completions = service.decision_completions.lock().unwrap();
		assert_eq!(completions[0].task_token, b"task-1");
		assert_eq!(completions[0].decisions.len(), 1);
		let Decision::ScheduleActivityTask(attributes) = &completions[0].decisions[0] else {
			panic!("expected a schedule activity decision");
		};
		assert_eq!(attributes.activity_id, "a1");
	}

	// Second task: history shows the activity completed; the replay must not
	// re-emit the schedule and must close the workflow with its result
	service.push_decision_task(decision_task(
		b"task-2",
		vec![
			started_event(),
			decision_task_started_event(3),
			activity_scheduled_event(5, "a1"),
			activity_completed_event(7, 5, b"ok"),
		],
	));

	wait_until(|| service.decision_completions.lock().unwrap().len() >= 2).await;
	{
		let completions = service.decision_completions.lock().unwrap();
		assert_eq!(completions[1].task_token, b"task-2");
		assert_eq!(
			completions[1].decisions,
			vec![Decision::CompleteWorkflowExecution {
				result: Some(b"ok".to_vec())
			}]
		);
	}

	assert!(
		worker
			.shutdown_and_await_termination(Duration::from_secs(2))
			.await
	);
}

#[tokio::test]
async fn nondeterministic_replay_reports_decision_task_failed() {
	init_tracing();

	let service = Arc::new(MockService::new());

	// History scheduled a2, but the scripted workflow schedules a1
	service.push_decision_task(decision_task(
		b"task-1",
		vec![
			started_event(),
			decision_task_started_event(3),
			activity_scheduled_event(5, "a2"),
		],
	));

	let worker = Worker::new(
		service.clone(),
		config(),
		Arc::new(ScriptedWorkflow),
		ActivityRegistry::new(),
	);
	worker.start();

	wait_until(|| !service.decision_failures.lock().unwrap().is_empty()).await;
	{
		let failures = service.decision_failures.lock().unwrap();
		let (task_token, cause, details) = &failures[0];
		assert_eq!(task_token, b"task-1");
		assert_eq!(*cause, DecisionTaskFailedCause::NondeterminismDetected);

		let details = String::from_utf8(details.clone().unwrap()).unwrap();
		assert!(details.contains("unknown DecisionId(ACTIVITY, a2)"));
	}
	assert!(service.decision_completions.lock().unwrap().is_empty());

	assert!(
		worker
			.shutdown_and_await_termination(Duration::from_secs(2))
			.await
	);
}

#[tokio::test]
async fn activity_worker_dispatches_and_reports() {
	init_tracing();

	let service = Arc::new(MockService::new());

	let mut activities = ActivityRegistry::new();
	activities.register_fn("echo", |task| async move { Ok(task.input.clone()) });
	activities.register_fn("cancelme", |_task| async move {
		Err(WorkerError::ActivityCanceled {
			details: Some(b"stopped".to_vec()),
		})
	});
	activities.register_fn("boom", |_task| async move {
		Err(WorkerError::Other(anyhow::anyhow!("exploded")))
	});

	service.push_activity_task(activity_task(b"at-1", "echo", b"payload"));
	service.push_activity_task(activity_task(b"at-2", "cancelme", b""));
	service.push_activity_task(activity_task(b"at-3", "boom", b""));
	service.push_activity_task(activity_task(b"at-4", "unknown-type", b""));

	let mut config = config();
	config.disable_workflow_worker = true;

	let worker = Worker::new(
		service.clone(),
		config,
		Arc::new(ScriptedWorkflow),
		activities,
	);
	worker.start();

	wait_until(|| {
		service.activity_completions.lock().unwrap().len() >= 1
			&& service.activity_failures.lock().unwrap().len() >= 2
			&& service.activity_cancellations.lock().unwrap().len() >= 1
	})
	.await;

	{
		let completions = service.activity_completions.lock().unwrap();
		assert_eq!(
			completions[0],
			(b"at-1".to_vec(), Some(b"payload".to_vec()))
		);

		let cancellations = service.activity_cancellations.lock().unwrap();
		assert_eq!(
			cancellations[0],
			(b"at-2".to_vec(), Some(b"stopped".to_vec()))
		);

		let failures = service.activity_failures.lock().unwrap();
		assert!(failures.iter().any(|(token, reason)| {
			token == b"at-3" && reason.contains("exploded")
		}));
		assert!(failures.iter().any(|(token, reason)| {
			token == b"at-4" && reason.contains("not registered")
		}));
	}

	assert!(
		worker
			.shutdown_and_await_termination(Duration::from_secs(2))
			.await
	);
}

#[tokio::test]
async fn suspend_resume_leaves_worker_running() {
	init_tracing();

	let service = Arc::new(MockService::new());
	let worker = Worker::new(
		service.clone(),
		config(),
		Arc::new(ScriptedWorkflow),
		ActivityRegistry::new(),
	);
	worker.start();

	worker.suspend_polling();
	tokio::time::sleep(Duration::from_millis(20)).await;

	// Tasks queued while suspended are picked up after resume
	service.push_decision_task(decision_task(b"task-1", vec![started_event()]));
	tokio::time::sleep(Duration::from_millis(30)).await;
	assert!(service.decision_completions.lock().unwrap().is_empty());

	worker.resume_polling();
	wait_until(|| !service.decision_completions.lock().unwrap().is_empty()).await;

	assert!(
		worker
			.shutdown_and_await_termination(Duration::from_secs(2))
			.await
	);
}

#[tokio::test]
async fn offline_replay_matches_live_query() {
	init_tracing();

	let history = vec![
		started_event(),
		decision_task_started_event(3),
		activity_scheduled_event(5, "a1"),
		activity_completed_event(7, 5, b"ok"),
	];
	let query = WorkflowQuery {
		query_type: "phase".to_string(),
		query_args: None,
	};

	// Live path: the query rides a decision task through the worker
	let service = Arc::new(MockService::new());
	let mut task = decision_task(b"task-q", history.clone());
	task.query = Some(query.clone());
	service.push_decision_task(task);

	let worker = Worker::new(
		service.clone(),
		config(),
		Arc::new(ScriptedWorkflow),
		ActivityRegistry::new(),
	);
	worker.start();

	wait_until(|| !service.query_results.lock().unwrap().is_empty()).await;
	let live = service.query_results.lock().unwrap()[0].clone().unwrap();

	assert!(
		worker
			.shutdown_and_await_termination(Duration::from_secs(2))
			.await
	);

	// Offline path over the identical history
	let replayer = WorkflowReplayer::new(Arc::new(ScriptedWorkflow));
	let offline = replayer
		.query("scripted", execution(), history.clone(), query.clone())
		.await
		.unwrap();
	assert_eq!(live, offline);

	// Replaying again yields the same answer
	let again = replayer
		.query("scripted", execution(), history, query)
		.await
		.unwrap();
	assert_eq!(offline, again);
}
