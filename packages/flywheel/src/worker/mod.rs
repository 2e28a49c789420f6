pub mod activity;
pub mod workflow;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::WorkerConfig;
use crate::metrics;
use crate::poller::Poller;
use crate::service::ServiceHandle;

use activity::{ActivityRegistry, ActivityTaskHandler};
use workflow::{DecisionTaskHandler, WorkflowTaskHandler};

/// One workflow sub-worker and one activity sub-worker bound to a
/// (domain, task list). Stateless between decision tasks: every replay
/// starts from history.
pub struct Worker {
	config: WorkerConfig,
	workflow_poller: Option<Poller<WorkflowTaskHandler>>,
	activity_poller: Option<Poller<ActivityTaskHandler>>,
}

impl Worker {
	pub fn new(
		service: ServiceHandle,
		config: WorkerConfig,
		decision_handler: Arc<dyn DecisionTaskHandler>,
		activities: ActivityRegistry,
	) -> Self {
		let workflow_poller = (!config.disable_workflow_worker).then(|| {
			let handler = Arc::new(WorkflowTaskHandler::new(
				service.clone(),
				&config,
				decision_handler.clone(),
			));
			Poller::new(
				config.workflow_poller.clone(),
				"decision",
				&config.domain,
				&config.task_list,
				handler,
				config.max_concurrent_decision_executions,
			)
		});

		// Nothing registered means nothing to dispatch to
		let activities = Arc::new(activities);
		let activity_poller = (!config.disable_activity_worker && !activities.is_empty())
			.then(|| {
				let handler = Arc::new(ActivityTaskHandler::new(
					service.clone(),
					&config,
					activities.clone(),
				));
				Poller::new(
					config.activity_poller.clone(),
					"activity",
					&config.domain,
					&config.task_list,
					handler,
					config.max_concurrent_activity_executions,
				)
			});

		Worker {
			config,
			workflow_poller,
			activity_poller,
		}
	}

	pub fn config(&self) -> &WorkerConfig {
		&self.config
	}

	#[tracing::instrument(skip_all, fields(domain=%self.config.domain, task_list=%self.config.task_list, identity=%self.config.identity))]
	pub fn start(&self) {
		metrics::WORKER_START
			.with_label_values(&[&self.config.domain, &self.config.task_list])
			.inc();

		tracing::info!(
			workflow_worker = self.workflow_poller.is_some(),
			activity_worker = self.activity_poller.is_some(),
			"starting worker"
		);

		if let Some(poller) = &self.workflow_poller {
			poller.start();
		}
		if let Some(poller) = &self.activity_poller {
			poller.start();
		}
	}

	pub fn suspend_polling(&self) {
		for poller in self.pollers() {
			poller.suspend_polling();
		}
	}

	pub fn resume_polling(&self) {
		for poller in self.pollers() {
			poller.resume_polling();
		}
	}

	/// Graceful stop: finish current iterations, start no new ones.
	pub fn shutdown(&self) {
		for poller in self.pollers() {
			poller.shutdown();
		}
	}

	/// Force stop: additionally cancels in-flight polls and sleeps.
	pub fn shutdown_now(&self) {
		for poller in self.pollers() {
			poller.shutdown_now();
		}
	}

	/// Wait for every poll worker to exit. Returns `false` on timeout.
	pub async fn await_termination(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;

		if let Some(poller) = &self.workflow_poller {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if !poller.await_termination(remaining).await {
				return false;
			}
		}
		if let Some(poller) = &self.activity_poller {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if !poller.await_termination(remaining).await {
				return false;
			}
		}

		true
	}

	pub async fn shutdown_and_await_termination(&self, timeout: Duration) -> bool {
		self.shutdown_now();
		self.await_termination(timeout).await
	}

	fn pollers(&self) -> impl Iterator<Item = &dyn PollerControl> {
		self.workflow_poller
			.iter()
			.map(|p| p as &dyn PollerControl)
			.chain(self.activity_poller.iter().map(|p| p as &dyn PollerControl))
	}
}

/// Object-safe view over the two differently-typed pollers.
trait PollerControl {
	fn suspend_polling(&self);
	fn resume_polling(&self);
	fn shutdown(&self);
	fn shutdown_now(&self);
}

impl<H: crate::poller::TaskHandler> PollerControl for Poller<H> {
	fn suspend_polling(&self) {
		Poller::suspend_polling(self)
	}

	fn resume_polling(&self) {
		Poller::resume_polling(self)
	}

	fn shutdown(&self) {
		Poller::shutdown(self)
	}

	fn shutdown_now(&self) {
		Poller::shutdown_now(self)
	}
}
