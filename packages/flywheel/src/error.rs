/// Error returned by a service RPC. Transient kinds are retried under the
/// configured retry options; permanent kinds surface to the uncaught-error
/// sink and the poll loop continues after backoff.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
	#[error("service busy: {0}")]
	ServiceBusy(String),
	#[error("internal service error: {0}")]
	InternalService(String),
	#[error("bad request: {0}")]
	BadRequest(String),
	#[error("entity not exists: {0}")]
	EntityNotExists(String),
	#[error("workflow execution already started: {0}")]
	ExecutionAlreadyStarted(String),
	#[error("transport error: {0}")]
	Transport(String),
}

impl RpcError {
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			RpcError::ServiceBusy(_) | RpcError::InternalService(_) | RpcError::Transport(_)
		)
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			RpcError::ServiceBusy(_) => ErrorKind::ServiceBusy,
			RpcError::InternalService(_) => ErrorKind::InternalService,
			RpcError::BadRequest(_) => ErrorKind::BadRequest,
			RpcError::EntityNotExists(_) => ErrorKind::EntityNotExists,
			RpcError::ExecutionAlreadyStarted(_) => ErrorKind::ExecutionAlreadyStarted,
			RpcError::Transport(_) => ErrorKind::Transport,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
	#[error(transparent)]
	Rpc(#[from] RpcError),

	/// User workflow code diverged from recorded history. Fails the decision
	/// task with a descriptive message; the worker itself keeps running.
	#[error("nondeterministic workflow: {0}")]
	NondeterministicWorkflow(String),

	#[error("malformed decision task: {0}")]
	MalformedDecisionTask(String),

	/// Fetching the next history page did not finish inside the decision
	/// task's start-to-close budget. Retriable from the service's point of
	/// view: it will re-dispatch the task.
	#[error("history pagination exceeded task-start-to-close timeout ({timeout_seconds}s)")]
	HistoryPaginationDeadline { timeout_seconds: i64 },

	/// Raised by activity handlers to report cancellation instead of failure.
	#[error("activity canceled")]
	ActivityCanceled { details: Option<Vec<u8>> },

	#[error("activity type not registered: {0}")]
	ActivityTypeNotRegistered(String),

	/// User code emitted two decisions with the same id within one replay.
	#[error("duplicate decision: {0}")]
	DuplicateDecision(String),

	/// Workflow-caused activity failure. The retry evaluator consults the
	/// cause, not the wrapper.
	#[error("activity failed: {cause}")]
	ActivityFailure {
		activity_type: String,
		#[source]
		cause: Box<WorkerError>,
	},

	/// Workflow-caused child workflow failure. The retry evaluator consults
	/// the cause, not the wrapper.
	#[error("child workflow failed: {cause}")]
	ChildWorkflowFailure {
		workflow_type: String,
		#[source]
		cause: Box<WorkerError>,
	},

	#[error("worker shut down")]
	Shutdown,

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl WorkerError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			WorkerError::Rpc(err) => err.kind(),
			WorkerError::NondeterministicWorkflow(_) => ErrorKind::NondeterministicWorkflow,
			WorkerError::MalformedDecisionTask(_) => ErrorKind::MalformedDecisionTask,
			WorkerError::HistoryPaginationDeadline { .. } => ErrorKind::HistoryPaginationDeadline,
			WorkerError::ActivityCanceled { .. } => ErrorKind::ActivityCanceled,
			WorkerError::ActivityTypeNotRegistered(_) => ErrorKind::ActivityTypeNotRegistered,
			WorkerError::DuplicateDecision(_) => ErrorKind::Other,
			WorkerError::ActivityFailure { .. } => ErrorKind::ActivityFailure,
			WorkerError::ChildWorkflowFailure { .. } => ErrorKind::ChildWorkflowFailure,
			WorkerError::Shutdown => ErrorKind::Shutdown,
			WorkerError::Other(_) => ErrorKind::Other,
		}
	}

	pub fn is_transient(&self) -> bool {
		match self {
			WorkerError::Rpc(err) => err.is_transient(),
			_ => false,
		}
	}
}

/// Coarse error classification used by `RetryOptions::do_not_retry`.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	strum::Display,
	serde::Serialize,
	serde::Deserialize,
)]
pub enum ErrorKind {
	ServiceBusy,
	InternalService,
	BadRequest,
	EntityNotExists,
	ExecutionAlreadyStarted,
	Transport,
	NondeterministicWorkflow,
	MalformedDecisionTask,
	HistoryPaginationDeadline,
	ActivityCanceled,
	ActivityTypeNotRegistered,
	ActivityFailure,
	ChildWorkflowFailure,
	Shutdown,
	Other,
}

impl ErrorKind {
	/// Kinds that never make sense to retry at the RPC layer.
	pub fn permanent_rpc_kinds() -> Vec<ErrorKind> {
		vec![
			ErrorKind::BadRequest,
			ErrorKind::EntityNotExists,
			ErrorKind::ExecutionAlreadyStarted,
		]
	}
}
