use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::metrics;
use crate::poller::TaskHandler;
use crate::protocol::task::ActivityTask;
use crate::retry::{retry, RetryOptions};
use crate::service::ServiceHandle;

const KIND: &str = "activity";

/// A user-supplied side-effecting function. Return
/// [`WorkerError::ActivityCanceled`] to report cancellation instead of
/// failure.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
	async fn execute(&self, task: &ActivityTask) -> Result<Option<Vec<u8>>, WorkerError>;
}

/// Activity implementations by type name. The worker routes each polled task
/// to the implementation registered under its `activity_type`.
#[derive(Default)]
pub struct ActivityRegistry {
	handlers: HashMap<String, Arc<dyn ActivityHandler>>,
}

impl ActivityRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, activity_type: impl Into<String>, handler: Arc<dyn ActivityHandler>) {
		self.handlers.insert(activity_type.into(), handler);
	}

	/// Register a plain async function as an activity.
	pub fn register_fn<F, Fut>(&mut self, activity_type: impl Into<String>, f: F)
	where
		F: Fn(ActivityTask) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Option<Vec<u8>>, WorkerError>> + Send + 'static,
	{
		self.register(activity_type, Arc::new(FnActivityHandler { f }));
	}

	pub fn get(&self, activity_type: &str) -> Option<&Arc<dyn ActivityHandler>> {
		self.handlers.get(activity_type)
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}

	pub fn len(&self) -> usize {
		self.handlers.len()
	}
}

struct FnActivityHandler<F> {
	f: F,
}

#[async_trait]
impl<F, Fut> ActivityHandler for FnActivityHandler<F>
where
	F: Fn(ActivityTask) -> Fut + Send + Sync,
	Fut: Future<Output = Result<Option<Vec<u8>>, WorkerError>> + Send,
{
	async fn execute(&self, task: &ActivityTask) -> Result<Option<Vec<u8>>, WorkerError> {
		(self.f)(task.clone()).await
	}
}

/// Activity-side poll task: poll → dispatch → report.
pub(crate) struct ActivityTaskHandler {
	service: ServiceHandle,
	domain: String,
	task_list: String,
	identity: String,
	registry: Arc<ActivityRegistry>,
	completion_retry: RetryOptions,
	failure_retry: RetryOptions,
}

impl ActivityTaskHandler {
	pub fn new(
		service: ServiceHandle,
		config: &WorkerConfig,
		registry: Arc<ActivityRegistry>,
	) -> Self {
		ActivityTaskHandler {
			service,
			domain: config.domain.clone(),
			task_list: config.task_list.clone(),
			identity: config.identity.clone(),
			registry,
			completion_retry: config.report_activity_completion_retry.clone(),
			failure_retry: config.report_activity_failure_retry.clone(),
		}
	}

	fn poll_labels(&self) -> [&str; 3] {
		[&self.domain, &self.task_list, KIND]
	}

	fn task_labels<'a>(&'a self, task: &'a ActivityTask) -> [&'a str; 3] {
		[&self.domain, &self.task_list, &task.activity_type]
	}

	async fn report(&self, task: &ActivityTask, result: Result<Option<Vec<u8>>, WorkerError>) -> Result<(), WorkerError> {
		match result {
			Ok(output) => {
				retry(&self.completion_retry, || {
					let output = output.clone();
					async move {
						self.service
							.respond_activity_task_completed(
								task.task_token.clone(),
								output,
								&self.identity,
							)
							.await
							.map_err(WorkerError::from)
					}
				})
				.await?;

				metrics::ACTIVITY_TASK_COMPLETED_TOTAL
					.with_label_values(&self.task_labels(task))
					.inc();
			}
			Err(WorkerError::ActivityCanceled { details }) => {
				tracing::debug!(activity_id=%task.activity_id, "activity canceled");

				retry(&self.failure_retry, || {
					let details = details.clone();
					async move {
						self.service
							.respond_activity_task_canceled(
								task.task_token.clone(),
								details,
								&self.identity,
							)
							.await
							.map_err(WorkerError::from)
					}
				})
				.await?;

				metrics::ACTIVITY_TASK_CANCELED_TOTAL
					.with_label_values(&self.task_labels(task))
					.inc();
			}
			Err(err) => {
				tracing::debug!(activity_id=%task.activity_id, %err, "activity failed");

				let reason = err.to_string();
				retry(&self.failure_retry, || {
					let reason = reason.clone();
					async move {
						self.service
							.respond_activity_task_failed(
								task.task_token.clone(),
								reason,
								None,
								&self.identity,
							)
							.await
							.map_err(WorkerError::from)
					}
				})
				.await?;

				metrics::ACTIVITY_TASK_FAILED_TOTAL
					.with_label_values(&self.task_labels(task))
					.inc();
			}
		}

		Ok(())
	}
}

#[async_trait]
impl TaskHandler for ActivityTaskHandler {
	type Task = ActivityTask;

	async fn poll(&self) -> Result<Option<ActivityTask>, WorkerError> {
		metrics::POLL_TOTAL
			.with_label_values(&self.poll_labels())
			.inc();
		let start = Instant::now();

		let result = self
			.service
			.poll_for_activity_task(&self.domain, &self.task_list, &self.identity)
			.await;

		metrics::POLL_LATENCY
			.with_label_values(&self.poll_labels())
			.observe(start.elapsed().as_secs_f64());

		match result {
			Ok(Some(task)) if !task.task_token.is_empty() => {
				metrics::POLL_SUCCEED_TOTAL
					.with_label_values(&self.poll_labels())
					.inc();
				Ok(Some(task))
			}
			Ok(_) => {
				metrics::POLL_NO_TASK_TOTAL
					.with_label_values(&self.poll_labels())
					.inc();
				Ok(None)
			}
			Err(err) => {
				if err.is_transient() {
					metrics::POLL_TRANSIENT_FAILED_TOTAL
						.with_label_values(&self.poll_labels())
						.inc();
				} else {
					metrics::POLL_FAILED_TOTAL
						.with_label_values(&self.poll_labels())
						.inc();
				}
				Err(err.into())
			}
		}
	}

	#[tracing::instrument(skip_all, fields(execution=%task.execution, activity_type=%task.activity_type, activity_id=%task.activity_id))]
	async fn handle(&self, task: &ActivityTask) -> Result<(), WorkerError> {
		let queue_latency_secs =
			(task.started_ts_nanos - task.scheduled_ts_nanos).max(0) as f64 / 1e9;
		metrics::TASKLIST_QUEUE_LATENCY
			.with_label_values(&[&self.domain, &self.task_list])
			.observe(queue_latency_secs);

		let exec_start = Instant::now();
		let result = match self.registry.get(&task.activity_type) {
			Some(handler) => handler.execute(task).await,
			None => Err(WorkerError::ActivityTypeNotRegistered(
				task.activity_type.clone(),
			)),
		};

		metrics::ACTIVITY_EXEC_LATENCY
			.with_label_values(&self.task_labels(task))
			.observe(exec_start.elapsed().as_secs_f64());

		let response_start = Instant::now();
		self.report(task, result).await?;

		metrics::ACTIVITY_RESP_LATENCY
			.with_label_values(&self.task_labels(task))
			.observe(response_start.elapsed().as_secs_f64());
		metrics::ACTIVITY_E2E_LATENCY
			.with_label_values(&self.task_labels(task))
			.observe((now_unix_nanos() - task.scheduled_ts_nanos).max(0) as f64 / 1e9);

		Ok(())
	}

	fn wrap_failure(&self, task: &ActivityTask, err: WorkerError) -> anyhow::Error {
		anyhow::Error::new(err).context(format!(
			"activity task {} failed for execution {}",
			task.activity_id, task.execution
		))
	}
}

fn now_unix_nanos() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_nanos() as i64)
		.unwrap_or(0)
}
