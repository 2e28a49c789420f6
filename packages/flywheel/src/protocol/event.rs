use serde::{Deserialize, Serialize};

use crate::protocol::task::WorkflowExecution;

/// A single record in an execution's append-only event log. Events are
/// strictly ordered by `event_id`; history is the sole source of truth for
/// replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
	pub event_id: i64,
	pub timestamp_millis: i64,
	pub attributes: EventAttributes,
}

impl HistoryEvent {
	pub fn event_type(&self) -> EventType {
		EventType::from(&self.attributes)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TimeoutType {
	StartToClose,
	ScheduleToStart,
	ScheduleToClose,
	Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::EnumDiscriminants)]
#[strum_discriminants(name(EventType), derive(strum::Display, Hash))]
pub enum EventAttributes {
	WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),

	DecisionTaskStarted {
		scheduled_event_id: i64,
		identity: String,
	},
	DecisionTaskCompleted {
		scheduled_event_id: i64,
		started_event_id: i64,
		execution_context: Option<Vec<u8>>,
		identity: String,
	},

	ActivityTaskScheduled(ActivityTaskScheduledAttributes),
	ActivityTaskStarted {
		scheduled_event_id: i64,
		identity: String,
	},
	ActivityTaskCompleted {
		scheduled_event_id: i64,
		started_event_id: i64,
		result: Option<Vec<u8>>,
	},
	ActivityTaskFailed {
		scheduled_event_id: i64,
		started_event_id: i64,
		reason: String,
		details: Option<Vec<u8>>,
	},
	ActivityTaskTimedOut {
		scheduled_event_id: i64,
		started_event_id: i64,
		timeout_type: TimeoutType,
		details: Option<Vec<u8>>,
	},
	ActivityTaskCanceled {
		scheduled_event_id: i64,
		started_event_id: i64,
		details: Option<Vec<u8>>,
	},
	ActivityTaskCancelRequested {
		activity_id: String,
	},
	RequestCancelActivityTaskFailed {
		activity_id: String,
		cause: String,
	},

	TimerStarted {
		timer_id: String,
		start_to_fire_timeout_seconds: i64,
	},
	TimerFired {
		timer_id: String,
		started_event_id: i64,
	},
	TimerCanceled {
		timer_id: String,
		started_event_id: i64,
	},
	CancelTimerFailed {
		timer_id: String,
		cause: String,
	},

	StartChildWorkflowExecutionInitiated(StartChildWorkflowExecutionInitiatedAttributes),
	StartChildWorkflowExecutionFailed {
		workflow_id: String,
		workflow_type: String,
		initiated_event_id: i64,
		cause: String,
	},
	ChildWorkflowExecutionStarted {
		execution: WorkflowExecution,
		workflow_type: String,
		initiated_event_id: i64,
	},
	ChildWorkflowExecutionCompleted {
		execution: WorkflowExecution,
		workflow_type: String,
		initiated_event_id: i64,
		result: Option<Vec<u8>>,
	},
	ChildWorkflowExecutionFailed {
		execution: WorkflowExecution,
		workflow_type: String,
		initiated_event_id: i64,
		reason: String,
		details: Option<Vec<u8>>,
	},
	ChildWorkflowExecutionTimedOut {
		execution: WorkflowExecution,
		workflow_type: String,
		initiated_event_id: i64,
		timeout_type: TimeoutType,
	},
	ChildWorkflowExecutionCanceled {
		execution: WorkflowExecution,
		workflow_type: String,
		initiated_event_id: i64,
		details: Option<Vec<u8>>,
	},

	SignalExternalWorkflowExecutionInitiated {
		control: String,
		execution: WorkflowExecution,
		signal_name: String,
		input: Option<Vec<u8>>,
	},
	SignalExternalWorkflowExecutionFailed {
		initiated_event_id: i64,
		execution: WorkflowExecution,
		cause: String,
	},
	ExternalWorkflowExecutionSignaled {
		initiated_event_id: i64,
		execution: WorkflowExecution,
	},

	RequestCancelExternalWorkflowExecutionInitiated {
		execution: WorkflowExecution,
	},
	RequestCancelExternalWorkflowExecutionFailed {
		initiated_event_id: i64,
		execution: WorkflowExecution,
		cause: String,
	},
	ExternalWorkflowExecutionCancelRequested {
		initiated_event_id: i64,
		execution: WorkflowExecution,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionStartedAttributes {
	pub workflow_type: String,
	pub task_list: String,
	pub input: Option<Vec<u8>>,
	pub execution_start_to_close_timeout_seconds: i64,
	/// Wall-clock budget for a single decision task, including history
	/// pagination.
	pub task_start_to_close_timeout_seconds: i64,
	pub continued_execution_run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTaskScheduledAttributes {
	pub activity_id: String,
	pub activity_type: String,
	pub task_list: String,
	pub input: Option<Vec<u8>>,
	pub schedule_to_close_timeout_seconds: i64,
	pub schedule_to_start_timeout_seconds: i64,
	pub start_to_close_timeout_seconds: i64,
	pub heartbeat_timeout_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartChildWorkflowExecutionInitiatedAttributes {
	pub workflow_id: String,
	pub workflow_type: String,
	pub task_list: String,
	pub input: Option<Vec<u8>>,
	pub execution_start_to_close_timeout_seconds: i64,
	pub task_start_to_close_timeout_seconds: i64,
}
