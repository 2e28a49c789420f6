use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::protocol::decision::Decision;
use crate::protocol::task::{
	ActivityTask, DecisionTask, HistoryPage, WorkflowExecution, WorkflowQuery,
};

pub type ServiceHandle = Arc<dyn WorkflowService>;

/// Cause reported alongside a failed decision task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum DecisionTaskFailedCause {
	UnhandledFailure,
	NondeterminismDetected,
	MalformedTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowExecutionRequest {
	pub domain: String,
	pub workflow_id: String,
	pub workflow_type: String,
	pub task_list: String,
	pub input: Option<Vec<u8>>,
	pub execution_start_to_close_timeout_seconds: i64,
	pub task_start_to_close_timeout_seconds: i64,
	pub identity: String,
	/// Idempotency key for the start call.
	pub request_id: String,
}

/// Capability set of the remote workflow service. Poll calls are long polls;
/// a poll returning no task is idle, not an error. All calls may fail with a
/// transient (`ServiceBusy`, `InternalService`, `Transport`) or permanent
/// `RpcError`; transient failures are retried by the caller under the
/// configured retry options.
///
/// Implementations must be thread-safe; one handle is shared by every poller
/// and by the client facade.
#[async_trait]
pub trait WorkflowService: Send + Sync {
	// MARK: Worker

	async fn poll_for_decision_task(
		&self,
		domain: &str,
		task_list: &str,
		identity: &str,
	) -> Result<Option<DecisionTask>, RpcError>;

	async fn poll_for_activity_task(
		&self,
		domain: &str,
		task_list: &str,
		identity: &str,
	) -> Result<Option<ActivityTask>, RpcError>;

	async fn respond_decision_task_completed(
		&self,
		task_token: Vec<u8>,
		decisions: Vec<Decision>,
		execution_context: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn respond_decision_task_failed(
		&self,
		task_token: Vec<u8>,
		cause: DecisionTaskFailedCause,
		details: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn respond_query_task_completed(
		&self,
		task_token: Vec<u8>,
		result: Result<Vec<u8>, String>,
	) -> Result<(), RpcError>;

	async fn respond_activity_task_completed(
		&self,
		task_token: Vec<u8>,
		result: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn respond_activity_task_failed(
		&self,
		task_token: Vec<u8>,
		reason: String,
		details: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn respond_activity_task_canceled(
		&self,
		task_token: Vec<u8>,
		details: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn get_workflow_execution_history(
		&self,
		domain: &str,
		execution: &WorkflowExecution,
		max_page_size: usize,
		next_page_token: Option<Vec<u8>>,
	) -> Result<HistoryPage, RpcError>;

	// MARK: Client facade

	async fn start_workflow_execution(
		&self,
		request: StartWorkflowExecutionRequest,
	) -> Result<WorkflowExecution, RpcError>;

	async fn signal_workflow_execution(
		&self,
		domain: &str,
		execution: &WorkflowExecution,
		signal_name: &str,
		input: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn request_cancel_workflow_execution(
		&self,
		domain: &str,
		execution: &WorkflowExecution,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn terminate_workflow_execution(
		&self,
		domain: &str,
		execution: &WorkflowExecution,
		reason: &str,
		details: Option<Vec<u8>>,
		identity: &str,
	) -> Result<(), RpcError>;

	async fn query_workflow(
		&self,
		domain: &str,
		execution: &WorkflowExecution,
		query: WorkflowQuery,
	) -> Result<Vec<u8>, RpcError>;
}
