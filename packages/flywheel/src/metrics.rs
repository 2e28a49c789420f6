use flywheel_metrics::{prometheus::*, BUCKETS, LATENCY_BUCKETS, REGISTRY};

lazy_static::lazy_static! {
	// MARK: Lifecycle
	pub static ref WORKER_START: IntCounterVec = register_int_counter_vec_with_registry!(
		"worker_start_total",
		"Times a worker was started.",
		&["domain", "task_list"],
		*REGISTRY
	).unwrap();
	pub static ref POLLER_START: IntCounterVec = register_int_counter_vec_with_registry!(
		"poller_start_total",
		"Poll workers spawned.",
		&["domain", "task_list", "kind"],
		*REGISTRY
	).unwrap();

	// MARK: Poll loop, kind = decision | activity
	pub static ref POLL_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"poll_total",
		"Poll RPCs issued.",
		&["domain", "task_list", "kind"],
		*REGISTRY
	).unwrap();
	pub static ref POLL_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"poll_latency",
		"Duration of one poll RPC.",
		&["domain", "task_list", "kind"],
		LATENCY_BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref POLL_NO_TASK_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"poll_no_task_total",
		"Polls that returned no task.",
		&["domain", "task_list", "kind"],
		*REGISTRY
	).unwrap();
	pub static ref POLL_SUCCEED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"poll_succeed_total",
		"Polls that returned a task.",
		&["domain", "task_list", "kind"],
		*REGISTRY
	).unwrap();
	pub static ref POLL_FAILED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"poll_failed_total",
		"Polls that failed with a permanent error.",
		&["domain", "task_list", "kind"],
		*REGISTRY
	).unwrap();
	pub static ref POLL_TRANSIENT_FAILED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"poll_transient_failed_total",
		"Polls that failed with a transient error.",
		&["domain", "task_list", "kind"],
		*REGISTRY
	).unwrap();

	// MARK: Decision tasks
	pub static ref DECISION_EXECUTION_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"decision_execution_latency",
		"Replay duration of one decision task.",
		&["domain", "task_list"],
		BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref DECISION_RESPONSE_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"decision_response_latency",
		"Duration of the decision task report RPC.",
		&["domain", "task_list"],
		BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref DECISION_TASK_COMPLETED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"decision_task_completed_total",
		"Decision tasks completed.",
		&["domain", "task_list"],
		*REGISTRY
	).unwrap();

	// MARK: Activity tasks
	pub static ref ACTIVITY_EXEC_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"activity_exec_latency",
		"User activity execution duration.",
		&["domain", "task_list", "activity_type"],
		BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref ACTIVITY_RESP_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"activity_resp_latency",
		"Duration of the activity report RPC.",
		&["domain", "task_list", "activity_type"],
		BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref ACTIVITY_E2E_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"activity_e2e_latency",
		"Schedule-to-report duration of one activity task.",
		&["domain", "task_list", "activity_type"],
		LATENCY_BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref ACTIVITY_TASK_COMPLETED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"activity_task_completed_total",
		"Activity tasks reported completed.",
		&["domain", "task_list", "activity_type"],
		*REGISTRY
	).unwrap();
	pub static ref ACTIVITY_TASK_FAILED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"activity_task_failed_total",
		"Activity tasks reported failed.",
		&["domain", "task_list", "activity_type"],
		*REGISTRY
	).unwrap();
	pub static ref ACTIVITY_TASK_CANCELED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"activity_task_canceled_total",
		"Activity tasks reported canceled.",
		&["domain", "task_list", "activity_type"],
		*REGISTRY
	).unwrap();
	pub static ref TASKLIST_QUEUE_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"tasklist_queue_latency",
		"Schedule-to-start time observed on received activity tasks.",
		&["domain", "task_list"],
		LATENCY_BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();

	// MARK: History fetch
	pub static ref GET_HISTORY_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"workflow_get_history_total",
		"History page fetches.",
		&["domain"],
		*REGISTRY
	).unwrap();
	pub static ref GET_HISTORY_LATENCY: HistogramVec = register_histogram_vec_with_registry!(
		"workflow_get_history_latency",
		"Duration of one history page fetch, including retries.",
		&["domain"],
		BUCKETS.to_vec(),
		*REGISTRY
	).unwrap();
	pub static ref GET_HISTORY_SUCCEED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"workflow_get_history_succeed_total",
		"History page fetches that succeeded.",
		&["domain"],
		*REGISTRY
	).unwrap();
	pub static ref GET_HISTORY_FAILED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
		"workflow_get_history_failed_total",
		"History page fetches that failed.",
		&["domain"],
		*REGISTRY
	).unwrap();
}
