use serde::{Deserialize, Serialize};

use crate::protocol::task::WorkflowExecution;

/// Timer id of the synthetic zero-duration timer appended when a decision
/// batch is truncated at the per-completion cap. Firing it forces the service
/// to schedule another decision task immediately so the remaining decisions
/// go out in the next batch.
pub const FORCE_IMMEDIATE_DECISION_TIMER_ID: &str = "FORCE_IMMEDIATE_DECISION";

/// A command emitted by the worker instructing the service to schedule work,
/// signal or cancel another execution, or close the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::EnumDiscriminants)]
#[strum_discriminants(name(DecisionType), derive(strum::Display, Hash))]
pub enum Decision {
	ScheduleActivityTask(ScheduleActivityTaskAttributes),
	RequestCancelActivityTask {
		activity_id: String,
	},
	StartTimer(StartTimerAttributes),
	CancelTimer {
		timer_id: String,
	},
	StartChildWorkflowExecution(StartChildWorkflowExecutionAttributes),
	SignalExternalWorkflowExecution(SignalExternalWorkflowExecutionAttributes),
	RequestCancelExternalWorkflowExecution {
		execution: WorkflowExecution,
	},
	CompleteWorkflowExecution {
		result: Option<Vec<u8>>,
	},
	FailWorkflowExecution {
		reason: String,
		details: Option<Vec<u8>>,
	},
	CancelWorkflowExecution {
		details: Option<Vec<u8>>,
	},
	ContinueAsNewWorkflowExecution(ContinueAsNewWorkflowExecutionAttributes),
}

impl Decision {
	pub fn decision_type(&self) -> DecisionType {
		DecisionType::from(self)
	}

	/// Whether this decision closes the current execution. At most one of
	/// these may appear in a batch and it must be the last element.
	pub fn is_workflow_completion(&self) -> bool {
		matches!(
			self,
			Decision::CompleteWorkflowExecution { .. }
				| Decision::FailWorkflowExecution { .. }
				| Decision::CancelWorkflowExecution { .. }
				| Decision::ContinueAsNewWorkflowExecution(_)
		)
	}

	pub(crate) fn force_immediate_decision() -> Decision {
		Decision::StartTimer(StartTimerAttributes {
			timer_id: FORCE_IMMEDIATE_DECISION_TIMER_ID.to_string(),
			start_to_fire_timeout_seconds: 0,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleActivityTaskAttributes {
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
pub struct StartTimerAttributes {
	pub timer_id: String,
	pub start_to_fire_timeout_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartChildWorkflowExecutionAttributes {
	pub workflow_id: String,
	pub workflow_type: String,
	pub task_list: String,
	pub input: Option<Vec<u8>>,
	pub execution_start_to_close_timeout_seconds: i64,
	pub task_start_to_close_timeout_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalExternalWorkflowExecutionAttributes {
	pub execution: WorkflowExecution,
	pub signal_name: String,
	pub input: Option<Vec<u8>>,
	/// Worker-generated token correlating the initiated event back to this
	/// decision. Filled in by the decision engine.
	pub control: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueAsNewWorkflowExecutionAttributes {
	pub workflow_type: String,
	pub task_list: String,
	pub input: Option<Vec<u8>>,
	pub execution_start_to_close_timeout_seconds: i64,
	pub task_start_to_close_timeout_seconds: i64,
}
