use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use flywheel::error::{RpcError, WorkerError};
use flywheel::history::WorkflowHistoryIterator;
use flywheel::machines::DecisionsHelper;
use flywheel::protocol::decision::{Decision, ScheduleActivityTaskAttributes};
use flywheel::protocol::event::{
	ActivityTaskScheduledAttributes, EventAttributes, HistoryEvent,
	WorkflowExecutionStartedAttributes,
};
use flywheel::protocol::task::{
	ActivityTask, DecisionTask, HistoryPage, WorkflowExecution, WorkflowQuery,
};
use flywheel::service::{
	DecisionTaskFailedCause, StartWorkflowExecutionRequest, WorkflowService,
};
use flywheel::worker::workflow::{DecisionTaskHandler, DecisionTaskOutcome};

// MARK: History builders

pub fn execution() -> WorkflowExecution {
	WorkflowExecution {
		workflow_id: "wf-1".to_string(),
		run_id: "run-1".to_string(),
	}
}

pub fn started_event() -> HistoryEvent {
	HistoryEvent {
		event_id: 1,
		timestamp_millis: 0,
		attributes: EventAttributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
			workflow_type: "scripted".to_string(),
			task_list: "tl".to_string(),
			input: None,
			execution_start_to_close_timeout_seconds: 3600,
			task_start_to_close_timeout_seconds: 10,
			continued_execution_run_id: None,
		}),
	}
}

pub fn decision_task_started_event(event_id: i64) -> HistoryEvent {
	HistoryEvent {
		event_id,
		timestamp_millis: 0,
		attributes: EventAttributes::DecisionTaskStarted {
			scheduled_event_id: event_id - 1,
			identity: "test".to_string(),
		},
	}
}

pub fn activity_scheduled_event(event_id: i64, activity_id: &str) -> HistoryEvent {
	HistoryEvent {
		event_id,
		timestamp_millis: 0,
		attributes: EventAttributes::ActivityTaskScheduled(scheduled_attributes(activity_id)),
	}
}

pub fn activity_completed_event(
	event_id: i64,
	scheduled_event_id: i64,
	result: &[u8],
) -> HistoryEvent {
	HistoryEvent {
		event_id,
		timestamp_millis: 0,
		attributes: EventAttributes::ActivityTaskCompleted {
			scheduled_event_id,
			started_event_id: scheduled_event_id + 1,
			result: Some(result.to_vec()),
		},
	}
}

pub fn schedule_attributes(activity_id: &str) -> ScheduleActivityTaskAttributes {
	ScheduleActivityTaskAttributes {
		activity_id: activity_id.to_string(),
		activity_type: "echo".to_string(),
		task_list: "tl".to_string(),
		input: None,
		schedule_to_close_timeout_seconds: 60,
		schedule_to_start_timeout_seconds: 10,
		start_to_close_timeout_seconds: 30,
		heartbeat_timeout_seconds: 0,
	}
}

pub fn scheduled_attributes(activity_id: &str) -> ActivityTaskScheduledAttributes {
	ActivityTaskScheduledAttributes {
		activity_id: activity_id.to_string(),
		activity_type: "echo".to_string(),
		task_list: "tl".to_string(),
		input: None,
		schedule_to_close_timeout_seconds: 60,
		schedule_to_start_timeout_seconds: 10,
		start_to_close_timeout_seconds: 30,
		heartbeat_timeout_seconds: 0,
	}
}

pub fn decision_task(task_token: &[u8], history: Vec<HistoryEvent>) -> DecisionTask {
	DecisionTask {
		task_token: task_token.to_vec(),
		workflow_type: "scripted".to_string(),
		execution: execution(),
		started_event_id: history.last().map(|e| e.event_id).unwrap_or(1),
		previous_started_event_id: 0,
		history,
		next_page_token: None,
		query: None,
	}
}

pub fn activity_task(task_token: &[u8], activity_type: &str, input: &[u8]) -> ActivityTask {
	ActivityTask {
		task_token: task_token.to_vec(),
		workflow_type: "scripted".to_string(),
		execution: execution(),
		activity_type: activity_type.to_string(),
		activity_id: "a1".to_string(),
		input: Some(input.to_vec()),
		scheduled_ts_nanos: 1_000_000,
		started_ts_nanos: 2_000_000,
		heartbeat_timeout_seconds: 0,
		schedule_to_close_timeout_seconds: 60,
		start_to_close_timeout_seconds: 30,
		attempt: 0,
	}
}

// MARK: Scripted dispatcher

/// Minimal stand-in for the deterministic workflow dispatcher: schedules one
/// activity ("a1"), then completes the workflow with the activity's result
/// once history shows it finished. Queries answer with the current phase.
pub struct ScriptedWorkflow;

#[async_trait]
impl DecisionTaskHandler for ScriptedWorkflow {
	async fn handle_decision_task(
		&self,
		task: &DecisionTask,
		history: &mut WorkflowHistoryIterator,
	) -> Result<DecisionTaskOutcome, WorkerError> {
		let mut helper = DecisionsHelper::default();

		// This pass of "user code" always schedules the activity; the events
		// below reconcile it against what already happened
		helper.schedule_activity_task(schedule_attributes("a1"))?;

		let mut activity_result = None;
		let mut activity_completed = false;

		let mut events = Vec::new();
		while let Some(event) = history.next().await? {
			events.push(event);
		}

		for event in &events {
			if let EventAttributes::ActivityTaskCompleted { result, .. } = &event.attributes {
				activity_result = result.clone();
				activity_completed = true;
			}
			helper.handle_event(event)?;
		}

		if task.query.is_some() {
			let phase: &[u8] = if activity_completed {
				b"completed"
			} else {
				b"scheduled"
			};
			return Ok(DecisionTaskOutcome::QueryCompleted {
				result: Ok(phase.to_vec()),
			});
		}

		if activity_completed {
			helper.complete_workflow(activity_result)?;
		}

		Ok(DecisionTaskOutcome::Completed {
			decisions: helper.decisions(),
			execution_context: helper.workflow_context_to_return(),
		})
	}
}

// MARK: Mock service

#[derive(Debug)]
pub struct DecisionCompletion {
	pub task_token: Vec<u8>,
	pub decisions: Vec<Decision>,
	pub execution_context: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MockService {
	pub decision_tasks: Mutex<VecDeque<DecisionTask>>,
	pub activity_tasks: Mutex<VecDeque<ActivityTask>>,
	pub decision_completions: Mutex<Vec<DecisionCompletion>>,
	pub decision_failures: Mutex<Vec<(Vec<u8>, DecisionTaskFailedCause, Option<Vec<u8>>)>>,
	pub query_results: Mutex<Vec<Result<Vec<u8>, String>>>,
	pub activity_completions: Mutex<Vec<(Vec<u8>, Option<Vec<u8>>)>>,
	pub activity_failures: Mutex<Vec<(Vec<u8>, String)>>,
	pub activity_cancellations: Mutex<Vec<(Vec<u8>, Option<Vec<u8>>)>>,
}

impl MockService {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_decision_task(&self, task: DecisionTask) {
		self.decision_tasks.lock().unwrap().push_back(task);
	}

	pub fn push_activity_task(&self, task: ActivityTask) {
		self.activity_tasks.lock().unwrap().push_back(task);
	}
}

#[async_trait]
impl WorkflowService for MockService {
	async fn poll_for_decision_task(
		&self,
		_domain: &str,
		_task_list: &str,
		_identity: &str,
	) -> Result<Option<DecisionTask>, RpcError> {
		let task = self.decision_tasks.lock().unwrap().pop_front();
		if task.is_none() {
			// Idle long poll
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		Ok(task)
	}

	async fn poll_for_activity_task(
		&self,
		_domain: &str,
		_task_list: &str,
		_identity: &str,
	) -> Result<Option<ActivityTask>, RpcError> {
		let task = self.activity_tasks.lock().unwrap().pop_front();
		if task.is_none() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		Ok(task)
	}

	async fn respond_decision_task_completed(
		&self,
		task_token: Vec<u8>,
		decisions: Vec<Decision>,
		execution_context: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		self.decision_completions
			.lock()
			.unwrap()
			.push(DecisionCompletion {
				task_token,
				decisions,
				execution_context,
			});
		Ok(())
	}

	async fn respond_decision_task_failed(
		&self,
		task_token: Vec<u8>,
		cause: DecisionTaskFailedCause,
		details: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		self.decision_failures
			.lock()
			.unwrap()
			.push((task_token, cause, details));
		Ok(())
	}

	async fn respond_query_task_completed(
		&self,
		_task_token: Vec<u8>,
		result: Result<Vec<u8>, String>,
	) -> Result<(), RpcError> {
		self.query_results.lock().unwrap().push(result);
		Ok(())
	}

	async fn respond_activity_task_completed(
		&self,
		task_token: Vec<u8>,
		result: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		self.activity_completions
			.lock()
			.unwrap()
			.push((task_token, result));
		Ok(())
	}

	async fn respond_activity_task_failed(
		&self,
		task_token: Vec<u8>,
		reason: String,
		_details: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		self.activity_failures
			.lock()
			.unwrap()
			.push((task_token, reason));
		Ok(())
	}

	async fn respond_activity_task_canceled(
		&self,
		task_token: Vec<u8>,
		details: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		self.activity_cancellations
			.lock()
			.unwrap()
			.push((task_token, details));
		Ok(())
	}

	async fn get_workflow_execution_history(
		&self,
		_domain: &str,
		_execution: &WorkflowExecution,
		_max_page_size: usize,
		_next_page_token: Option<Vec<u8>>,
	) -> Result<HistoryPage, RpcError> {
		Err(RpcError::EntityNotExists("no paged history".to_string()))
	}

	async fn start_workflow_execution(
		&self,
		request: StartWorkflowExecutionRequest,
	) -> Result<WorkflowExecution, RpcError> {
		Ok(WorkflowExecution {
			workflow_id: request.workflow_id,
			run_id: "run-1".to_string(),
		})
	}

	async fn signal_workflow_execution(
		&self,
		_domain: &str,
		_execution: &WorkflowExecution,
		_signal_name: &str,
		_input: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		Ok(())
	}

	async fn request_cancel_workflow_execution(
		&self,
		_domain: &str,
		_execution: &WorkflowExecution,
		_identity: &str,
	) -> Result<(), RpcError> {
		Ok(())
	}

	async fn terminate_workflow_execution(
		&self,
		_domain: &str,
		_execution: &WorkflowExecution,
		_reason: &str,
		_details: Option<Vec<u8>>,
		_identity: &str,
	) -> Result<(), RpcError> {
		Ok(())
	}

	async fn query_workflow(
		&self,
		_domain: &str,
		_execution: &WorkflowExecution,
		_query: WorkflowQuery,
	) -> Result<Vec<u8>, RpcError> {
		Err(RpcError::EntityNotExists("not supported".to_string()))
	}
}

// MARK: Test utils

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !condition() {
		if Instant::now() > deadline {
			panic!("condition not met within deadline");
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}
