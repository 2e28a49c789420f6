use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::history::WorkflowHistoryIterator;
use crate::metrics;
use crate::poller::TaskHandler;
use crate::protocol::decision::Decision;
use crate::protocol::task::DecisionTask;
use crate::retry::{retry, RetryOptions};
use crate::service::{DecisionTaskFailedCause, ServiceHandle};

const KIND: &str = "decision";

/// Result of running the workflow dispatcher over one decision task.
#[derive(Debug)]
pub enum DecisionTaskOutcome {
	Completed {
		decisions: Vec<Decision>,
		execution_context: Option<Vec<u8>>,
	},
	Failed {
		cause: DecisionTaskFailedCause,
		details: Option<Vec<u8>>,
	},
	QueryCompleted {
		result: Result<Vec<u8>, String>,
	},
}

/// The deterministic workflow dispatcher: replays user workflow code over the
/// history iterator and produces the next outgoing batch. Its internals
/// (how user code is paused and resumed between events) live outside the
/// worker core; the worker only needs this seam.
#[async_trait]
pub trait DecisionTaskHandler: Send + Sync + 'static {
	async fn handle_decision_task(
		&self,
		task: &DecisionTask,
		history: &mut WorkflowHistoryIterator,
	) -> Result<DecisionTaskOutcome, WorkerError>;
}

/// Decision-side poll task: poll → replay → report.
pub(crate) struct WorkflowTaskHandler {
	service: ServiceHandle,
	domain: String,
	task_list: String,
	identity: String,
	handler: Arc<dyn DecisionTaskHandler>,
	completion_retry: RetryOptions,
	failure_retry: RetryOptions,
}

impl WorkflowTaskHandler {
	pub fn new(
		service: ServiceHandle,
		config: &WorkerConfig,
		handler: Arc<dyn DecisionTaskHandler>,
	) -> Self {
		WorkflowTaskHandler {
			service,
			domain: config.domain.clone(),
			task_list: config.task_list.clone(),
			identity: config.identity.clone(),
			handler,
			completion_retry: config.report_decision_completion_retry.clone(),
			failure_retry: config.report_decision_failure_retry.clone(),
		}
	}

	fn labels(&self) -> [&str; 3] {
		[&self.domain, &self.task_list, KIND]
	}

	async fn report_completed(
		&self,
		task: &DecisionTask,
		decisions: Vec<Decision>,
		execution_context: Option<Vec<u8>>,
	) -> Result<(), WorkerError> {
		retry(&self.completion_retry, || {
			let decisions = decisions.clone();
			let execution_context = execution_context.clone();
			async move {
				self.service
					.respond_decision_task_completed(
						task.task_token.clone(),
						decisions,
						execution_context,
						&self.identity,
					)
					.await
					.map_err(WorkerError::from)
			}
		})
		.await
	}

	async fn report_failed(
		&self,
		task: &DecisionTask,
		cause: DecisionTaskFailedCause,
		details: Option<Vec<u8>>,
	) -> Result<(), WorkerError> {
		retry(&self.failure_retry, || {
			let details = details.clone();
			async move {
				self.service
					.respond_decision_task_failed(
						task.task_token.clone(),
						cause,
						details,
						&self.identity,
					)
					.await
					.map_err(WorkerError::from)
			}
		})
		.await
	}

	async fn report_query(
		&self,
		task: &DecisionTask,
		result: Result<Vec<u8>, String>,
	) -> Result<(), WorkerError> {
		retry(&self.completion_retry, || {
			let result = result.clone();
			async move {
				self.service
					.respond_query_task_completed(task.task_token.clone(), result)
					.await
					.map_err(WorkerError::from)
			}
		})
		.await
	}
}

#[async_trait]
impl TaskHandler for WorkflowTaskHandler {
	type Task = DecisionTask;

	async fn poll(&self) -> Result<Option<DecisionTask>, WorkerError> {
		metrics::POLL_TOTAL.with_label_values(&self.labels()).inc();
		let start = Instant::now();

		let result = self
			.service
			.poll_for_decision_task(&self.domain, &self.task_list, &self.identity)
			.await;

		metrics::POLL_LATENCY
			.with_label_values(&self.labels())
			.observe(start.elapsed().as_secs_f64());

		match result {
			// A task without a token is an idle long poll, not work
			Ok(Some(task)) if !task.task_token.is_empty() => {
				metrics::POLL_SUCCEED_TOTAL
					.with_label_values(&self.labels())
					.inc();
				Ok(Some(task))
			}
			Ok(_) => {
				metrics::POLL_NO_TASK_TOTAL
					.with_label_values(&self.labels())
					.inc();
				Ok(None)
			}
			Err(err) => {
				if err.is_transient() {
					metrics::POLL_TRANSIENT_FAILED_TOTAL
						.with_label_values(&self.labels())
						.inc();
				} else {
					metrics::POLL_FAILED_TOTAL
						.with_label_values(&self.labels())
						.inc();
				}
				Err(err.into())
			}
		}
	}

	#[tracing::instrument(skip_all, fields(execution=%task.execution, workflow_type=%task.workflow_type))]
	async fn handle(&self, task: &DecisionTask) -> Result<(), WorkerError> {
		let received_at = Instant::now();

		let mut history = match WorkflowHistoryIterator::new(
			self.service.clone(),
			self.domain.clone(),
			task,
			received_at,
		) {
			Ok(history) => history,
			Err(err) => {
				tracing::warn!(%err, "rejecting malformed decision task");

				self.report_failed(
					task,
					DecisionTaskFailedCause::MalformedTask,
					Some(err.to_string().into_bytes()),
				)
				.await?;
				return Ok(());
			}
		};

		let outcome = self.handler.handle_decision_task(task, &mut history).await;

		metrics::DECISION_EXECUTION_LATENCY
			.with_label_values(&[&self.domain, &self.task_list])
			.observe(received_at.elapsed().as_secs_f64());

		let response_start = Instant::now();
		let result = match outcome {
			Ok(DecisionTaskOutcome::Completed {
				decisions,
				execution_context,
			}) => {
				tracing::debug!(decisions = decisions.len(), "decision task completed");

				self.report_completed(task, decisions, execution_context).await?;
				metrics::DECISION_TASK_COMPLETED_TOTAL
					.with_label_values(&[&self.domain, &self.task_list])
					.inc();
				Ok(())
			}
			Ok(DecisionTaskOutcome::QueryCompleted { result }) => {
				self.report_query(task, result).await?;
				Ok(())
			}
			Ok(DecisionTaskOutcome::Failed { cause, details }) => {
				self.report_failed(task, cause, details).await?;
				Ok(())
			}
			Err(err @ WorkerError::NondeterministicWorkflow(_)) => {
				// The service re-dispatches; repeated failures escalate there
				tracing::warn!(%err, "workflow diverged from history, failing decision task");

				self.report_failed(
					task,
					DecisionTaskFailedCause::NondeterminismDetected,
					Some(err.to_string().into_bytes()),
				)
				.await?;
				Ok(())
			}
			Err(err @ WorkerError::HistoryPaginationDeadline { .. }) => {
				tracing::warn!(%err, "failing decision task");

				self.report_failed(
					task,
					DecisionTaskFailedCause::UnhandledFailure,
					Some(err.to_string().into_bytes()),
				)
				.await?;
				Ok(())
			}
			Err(err) => {
				self.report_failed(
					task,
					DecisionTaskFailedCause::UnhandledFailure,
					Some(err.to_string().into_bytes()),
				)
				.await?;
				Err(err)
			}
		};

		metrics::DECISION_RESPONSE_LATENCY
			.with_label_values(&[&self.domain, &self.task_list])
			.observe(response_start.elapsed().as_secs_f64());

		result
	}

	fn wrap_failure(&self, task: &DecisionTask, err: WorkerError) -> anyhow::Error {
		anyhow::Error::new(err).context(format!(
			"decision task failed for execution {}",
			task.execution
		))
	}
}
