use serde::{Deserialize, Serialize};

use crate::protocol::event::HistoryEvent;

/// Identity of one workflow execution. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecution {
	pub workflow_id: String,
	pub run_id: String,
}

impl std::fmt::Display for WorkflowExecution {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.workflow_id, self.run_id)
	}
}

/// One unit of workflow work handed out by the service: replay user code over
/// `history` and respond with the next batch of decisions. `task_token` must
/// be echoed back verbatim when reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTask {
	pub task_token: Vec<u8>,
	pub workflow_type: String,
	pub execution: WorkflowExecution,
	pub started_event_id: i64,
	pub previous_started_event_id: i64,
	/// First page of history. Further pages are fetched through
	/// `next_page_token`.
	pub history: Vec<HistoryEvent>,
	pub next_page_token: Option<Vec<u8>>,
	pub query: Option<WorkflowQuery>,
}

/// A read-only query piggybacked on a decision task. The worker answers it
/// from replayed state without emitting decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQuery {
	pub query_type: String,
	pub query_args: Option<Vec<u8>>,
}

/// One invocation of a user activity function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTask {
	pub task_token: Vec<u8>,
	pub workflow_type: String,
	pub execution: WorkflowExecution,
	pub activity_type: String,
	pub activity_id: String,
	pub input: Option<Vec<u8>>,
	pub scheduled_ts_nanos: i64,
	pub started_ts_nanos: i64,
	pub heartbeat_timeout_seconds: i64,
	pub schedule_to_close_timeout_seconds: i64,
	pub start_to_close_timeout_seconds: i64,
	pub attempt: i32,
}

/// One page of an execution's history as returned by the history RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
	pub events: Vec<HistoryEvent>,
	pub next_page_token: Option<Vec<u8>>,
}
