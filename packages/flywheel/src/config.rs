use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convert::{JsonPayloadConverter, PayloadConverter};
use crate::error::ErrorKind;
use crate::machines::DEFAULT_MAX_DECISIONS_PER_COMPLETION;
use crate::retry::RetryOptions;

/// Configuration of one poll worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerOptions {
	/// Number of concurrent poll workers. Each runs one poll → handle cycle
	/// at a time, so this also bounds in-flight task handling.
	pub poller_count: usize,
	/// Cap on poll RPCs per second across the pool, unlimited when unset.
	pub max_polls_per_second: Option<f64>,
	/// Averaging window for the poll rate cap.
	pub rate_window: Duration,
	pub backoff_initial: Duration,
	pub backoff_max: Duration,
	pub backoff_coefficient: f64,
	/// Prefix for poll worker task names in logs.
	pub task_name_prefix: String,
}

impl Default for PollerOptions {
	fn default() -> Self {
		PollerOptions {
			poller_count: 2,
			max_polls_per_second: None,
			rate_window: Duration::from_secs(1),
			backoff_initial: Duration::from_millis(200),
			backoff_max: Duration::from_secs(6),
			backoff_coefficient: 2.0,
			task_name_prefix: "poller".to_string(),
		}
	}
}

/// Configuration surface of one worker bound to a (domain, task list).
#[derive(Clone)]
pub struct WorkerConfig {
	pub domain: String,
	pub task_list: String,
	/// Human-readable tag for this worker in service-side logs.
	pub identity: String,
	/// Converts user payloads at the workflow/activity boundary. The worker
	/// core itself treats payloads as opaque bytes.
	pub data_converter: Arc<dyn PayloadConverter>,
	pub disable_workflow_worker: bool,
	pub disable_activity_worker: bool,
	/// Extra cap on concurrently handled activity tasks, below the poller
	/// count. Unset means the poller count is the bound.
	pub max_concurrent_activity_executions: Option<usize>,
	pub max_concurrent_decision_executions: Option<usize>,
	pub workflow_poller: PollerOptions,
	pub activity_poller: PollerOptions,
	pub report_decision_completion_retry: RetryOptions,
	pub report_decision_failure_retry: RetryOptions,
	pub report_activity_completion_retry: RetryOptions,
	pub report_activity_failure_retry: RetryOptions,
	/// Allow user log output while replaying already-recorded steps.
	pub enable_logging_in_replay: bool,
	pub max_decisions_per_completion: usize,
}

impl WorkerConfig {
	pub fn new(domain: impl Into<String>, task_list: impl Into<String>) -> Self {
		WorkerConfig {
			domain: domain.into(),
			task_list: task_list.into(),
			identity: format!("flywheel-worker-{}", uuid::Uuid::new_v4()),
			data_converter: Arc::new(JsonPayloadConverter),
			disable_workflow_worker: false,
			disable_activity_worker: false,
			max_concurrent_activity_executions: None,
			max_concurrent_decision_executions: None,
			workflow_poller: PollerOptions {
				task_name_prefix: "workflow-poller".to_string(),
				..Default::default()
			},
			activity_poller: PollerOptions {
				task_name_prefix: "activity-poller".to_string(),
				..Default::default()
			},
			report_decision_completion_retry: default_report_retry(Duration::from_secs(60)),
			report_decision_failure_retry: default_report_retry(Duration::from_secs(30)),
			report_activity_completion_retry: default_report_retry(Duration::from_secs(60)),
			report_activity_failure_retry: default_report_retry(Duration::from_secs(30)),
			enable_logging_in_replay: false,
			max_decisions_per_completion: DEFAULT_MAX_DECISIONS_PER_COMPLETION,
		}
	}

	pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
		self.identity = identity.into();
		self
	}
}

fn default_report_retry(expiration: Duration) -> RetryOptions {
	RetryOptions::new(Duration::from_millis(50))
		.with_max_interval(Duration::from_secs(2))
		.with_expiration(expiration)
		.with_minimum_attempts(1)
		.with_do_not_retry(ErrorKind::permanent_rpc_kinds())
}
