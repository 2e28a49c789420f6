use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ErrorKind, WorkerError};
use crate::metrics;
use crate::protocol::event::{EventAttributes, HistoryEvent, WorkflowExecutionStartedAttributes};
use crate::protocol::task::{DecisionTask, WorkflowExecution};
use crate::retry::{retry, RetryOptions};
use crate::service::ServiceHandle;

pub const HISTORY_PAGE_SIZE: usize = 10000;

const FETCH_INITIAL_INTERVAL: Duration = Duration::from_millis(50);
const FETCH_MAX_INTERVAL: Duration = Duration::from_secs(1);

/// Lazy, paginated sequence of history events for one decision task.
///
/// Serves the first page from the task itself and fetches further pages on
/// demand. The whole iteration shares the decision task's start-to-close
/// budget: once it is exhausted mid-pagination, iteration fails fast and the
/// task is reported failed so the service can re-dispatch it.
pub struct WorkflowHistoryIterator {
	service: Option<ServiceHandle>,
	domain: String,
	execution: WorkflowExecution,
	started_attributes: WorkflowExecutionStartedAttributes,
	started_at: Instant,
	budget: Duration,
	events: VecDeque<HistoryEvent>,
	next_page_token: Option<Vec<u8>>,
}

impl std::fmt::Debug for WorkflowHistoryIterator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WorkflowHistoryIterator")
			.field("domain", &self.domain)
			.field("execution", &self.execution)
			.field("started_attributes", &self.started_attributes)
			.field("started_at", &self.started_at)
			.field("budget", &self.budget)
			.field("events", &self.events)
			.field("next_page_token", &self.next_page_token)
			.finish()
	}
}

impl WorkflowHistoryIterator {
	pub fn new(
		service: ServiceHandle,
		domain: impl Into<String>,
		task: &DecisionTask,
		started_at: Instant,
	) -> Result<Self, WorkerError> {
		let started_attributes = validate_first_event(&task.history)?;
		let budget =
			Duration::from_secs(started_attributes.task_start_to_close_timeout_seconds.max(0) as u64);

		Ok(WorkflowHistoryIterator {
			service: Some(service),
			domain: domain.into(),
			execution: task.execution.clone(),
			started_attributes,
			started_at,
			budget,
			events: task.history.iter().cloned().collect(),
			next_page_token: task.next_page_token.clone(),
		})
	}

	/// Offline variant over a pre-supplied event sequence; never fetches.
	pub fn offline(task: &DecisionTask) -> Result<Self, WorkerError> {
		let started_attributes = validate_first_event(&task.history)?;
		let budget =
			Duration::from_secs(started_attributes.task_start_to_close_timeout_seconds.max(0) as u64);

		Ok(WorkflowHistoryIterator {
			service: None,
			domain: String::new(),
			execution: task.execution.clone(),
			started_attributes,
			started_at: Instant::now(),
			budget,
			events: task.history.iter().cloned().collect(),
			next_page_token: None,
		})
	}

	pub fn started_attributes(&self) -> &WorkflowExecutionStartedAttributes {
		&self.started_attributes
	}

	pub async fn next(&mut self) -> Result<Option<HistoryEvent>, WorkerError> {
		loop {
			if let Some(event) = self.events.pop_front() {
				return Ok(Some(event));
			}

			let Some(token) = self.next_page_token.take() else {
				return Ok(None);
			};
			self.fetch_next_page(token).await?;
		}
	}

	#[tracing::instrument(skip_all, fields(execution=%self.execution))]
	async fn fetch_next_page(&mut self, token: Vec<u8>) -> Result<(), WorkerError> {
		let service = self
			.service
			.clone()
			.expect("offline iterator has no page token");

		let remaining = self
			.budget
			.checked_sub(self.started_at.elapsed())
			.filter(|d| !d.is_zero())
			.ok_or_else(|| self.deadline_error())?;

		let options = RetryOptions::new(FETCH_INITIAL_INTERVAL)
			.with_max_interval(FETCH_MAX_INTERVAL)
			.with_expiration(remaining)
			.with_do_not_retry(ErrorKind::permanent_rpc_kinds());

		metrics::GET_HISTORY_TOTAL
			.with_label_values(&[&self.domain])
			.inc();
		let fetch_start = Instant::now();

		let domain = self.domain.clone();
		let execution = self.execution.clone();

		// The budget is a hard wall: a hung RPC must not ride past it
		let page = tokio::time::timeout(
			remaining,
			retry(&options, || {
				let service = service.clone();
				let token = token.clone();
				let domain = domain.clone();
				let execution = execution.clone();
				async move {
					service
						.get_workflow_execution_history(
							&domain,
							&execution,
							HISTORY_PAGE_SIZE,
							Some(token),
						)
						.await
						.map_err(WorkerError::from)
				}
			}),
		)
		.await;

		metrics::GET_HISTORY_LATENCY
			.with_label_values(&[&self.domain])
			.observe(fetch_start.elapsed().as_secs_f64());

		let page = match page {
			Ok(Ok(page)) => {
				metrics::GET_HISTORY_SUCCEED_TOTAL
					.with_label_values(&[&self.domain])
					.inc();
				page
			}
			Ok(Err(err)) => {
				metrics::GET_HISTORY_FAILED_TOTAL
					.with_label_values(&[&self.domain])
					.inc();
				return Err(err);
			}
			Err(_) => {
				metrics::GET_HISTORY_FAILED_TOTAL
					.with_label_values(&[&self.domain])
					.inc();
				return Err(self.deadline_error());
			}
		};

		tracing::debug!(
			events = page.events.len(),
			has_next_page = page.next_page_token.is_some(),
			"fetched history page"
		);

		self.events.extend(page.events);
		self.next_page_token = page.next_page_token;

		Ok(())
	}

	fn deadline_error(&self) -> WorkerError {
		WorkerError::HistoryPaginationDeadline {
			timeout_seconds: self.started_attributes.task_start_to_close_timeout_seconds,
		}
	}
}

/// The first history event of a decision task must be the workflow's started
/// event; it carries the pagination budget.
fn validate_first_event(
	history: &[HistoryEvent],
) -> Result<WorkflowExecutionStartedAttributes, WorkerError> {
	match history.first() {
		Some(HistoryEvent {
			attributes: EventAttributes::WorkflowExecutionStarted(attributes),
			..
		}) => Ok(attributes.clone()),
		Some(event) => Err(WorkerError::MalformedDecisionTask(format!(
			"first history event is {}, expected WorkflowExecutionStarted",
			event.event_type()
		))),
		None => Err(WorkerError::MalformedDecisionTask(
			"decision task has empty history".to_string(),
		)),
	}
}
