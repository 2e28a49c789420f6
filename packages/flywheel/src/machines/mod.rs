mod machine;

use std::collections::HashMap;

use indexmap::IndexMap;

pub use machine::{CancelOutcome, MachineState};
use machine::DecisionStateMachine;

use crate::error::WorkerError;
use crate::protocol::decision::{
	Decision, ScheduleActivityTaskAttributes, SignalExternalWorkflowExecutionAttributes,
	StartChildWorkflowExecutionAttributes, StartTimerAttributes,
	ContinueAsNewWorkflowExecutionAttributes,
};
use crate::protocol::event::{EventAttributes, HistoryEvent};
use crate::protocol::task::WorkflowExecution;

pub const DEFAULT_MAX_DECISIONS_PER_COMPLETION: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionTarget {
	Activity,
	Timer,
	ExternalWorkflow,
	Signal,
	#[strum(serialize = "SELF")]
	OwnExecution,
}

/// Key of one decision state machine. Keys come from user-supplied ids
/// (activity id, timer id, workflow id) or, for signals, a worker-generated
/// control token. The own-execution target has a null key and is singleton
/// per task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionId {
	pub target: DecisionTarget,
	pub id: Option<String>,
}

impl DecisionId {
	pub fn new(target: DecisionTarget, id: impl Into<String>) -> Self {
		DecisionId {
			target,
			id: Some(id.into()),
		}
	}

	pub fn own_execution() -> Self {
		DecisionId {
			target: DecisionTarget::OwnExecution,
			id: None,
		}
	}
}

impl std::fmt::Display for DecisionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"DecisionId({}, {})",
			self.target,
			self.id.as_deref().unwrap_or("")
		)
	}
}

/// Aggregates decision state machines for one replay pass.
///
/// Reconciles the decisions user code emits during this pass against the
/// events history says already happened: machines driven to terminal by
/// events do not re-emit their decision; machines still in `Created` do.
///
/// The machine map preserves insertion order and refreshes an entry to the
/// tail on every access, so `decisions()` emits batches in order of last
/// access. Single-owner: one replay task owns a helper for its lifetime and
/// rebuilds it from scratch on the next task.
pub struct DecisionsHelper {
	machines: IndexMap<DecisionId, DecisionStateMachine>,
	/// Resolves events that reference their scheduling event by id back to
	/// the user-visible activity id.
	activity_id_by_scheduled_event: HashMap<i64, String>,
	/// Same for external signals, keyed by the initiated event id.
	signal_id_by_initiated_event: HashMap<i64, String>,
	max_decisions_per_completion: usize,
	workflow_context: Option<Vec<u8>>,
	last_observed_context: Option<Vec<u8>>,
}

impl Default for DecisionsHelper {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_DECISIONS_PER_COMPLETION)
	}
}

impl DecisionsHelper {
	pub fn new(max_decisions_per_completion: usize) -> Self {
		DecisionsHelper {
			machines: IndexMap::new(),
			activity_id_by_scheduled_event: HashMap::new(),
			signal_id_by_initiated_event: HashMap::new(),
			max_decisions_per_completion: max_decisions_per_completion.max(1),
			workflow_context: None,
			last_observed_context: None,
		}
	}

	// MARK: Decisions emitted by user code

	pub fn schedule_activity_task(
		&mut self,
		attributes: ScheduleActivityTaskAttributes,
	) -> Result<(), WorkerError> {
		let id = DecisionId::new(DecisionTarget::Activity, attributes.activity_id.clone());
		self.add_machine(id, Decision::ScheduleActivityTask(attributes))
	}

	/// Cancel a scheduled activity. Returns `true` and invokes `callback`
	/// synchronously if the schedule decision had not been sent yet.
	pub fn request_cancel_activity_task(
		&mut self,
		activity_id: &str,
		callback: impl FnOnce(),
	) -> Result<bool, WorkerError> {
		let id = DecisionId::new(DecisionTarget::Activity, activity_id);
		let cancel = Decision::RequestCancelActivityTask {
			activity_id: activity_id.to_string(),
		};
		self.cancel_machine(&id, Some(cancel), callback)
	}

	pub fn start_timer(&mut self, attributes: StartTimerAttributes) -> Result<(), WorkerError> {
		let id = DecisionId::new(DecisionTarget::Timer, attributes.timer_id.clone());
		self.add_machine(id, Decision::StartTimer(attributes))
	}

	/// Cancel a started timer. Same callback contract as
	/// [`Self::request_cancel_activity_task`].
	pub fn cancel_timer(
		&mut self,
		timer_id: &str,
		callback: impl FnOnce(),
	) -> Result<bool, WorkerError> {
		let id = DecisionId::new(DecisionTarget::Timer, timer_id);
		let cancel = Decision::CancelTimer {
			timer_id: timer_id.to_string(),
		};
		self.cancel_machine(&id, Some(cancel), callback)
	}

	pub fn start_child_workflow(
		&mut self,
		attributes: StartChildWorkflowExecutionAttributes,
	) -> Result<(), WorkerError> {
		let id = DecisionId::new(DecisionTarget::ExternalWorkflow, attributes.workflow_id.clone());
		self.add_machine(id, Decision::StartChildWorkflowExecution(attributes))
	}

	/// Signal another execution. Returns the worker-generated control token
	/// identifying this signal in history.
	pub fn signal_external_workflow(
		&mut self,
		mut attributes: SignalExternalWorkflowExecutionAttributes,
	) -> Result<String, WorkerError> {
		let control = uuid::Uuid::new_v4().to_string();
		attributes.control = Some(control.clone());

		let id = DecisionId::new(DecisionTarget::Signal, control.clone());
		self.add_machine(id, Decision::SignalExternalWorkflowExecution(attributes))?;

		Ok(control)
	}

	pub fn request_cancel_external_workflow(
		&mut self,
		execution: WorkflowExecution,
	) -> Result<(), WorkerError> {
		let id = DecisionId::new(DecisionTarget::ExternalWorkflow, execution.workflow_id.clone());
		self.add_machine(
			id,
			Decision::RequestCancelExternalWorkflowExecution { execution },
		)
	}

	pub fn complete_workflow(&mut self, result: Option<Vec<u8>>) -> Result<(), WorkerError> {
		self.add_completion(Decision::CompleteWorkflowExecution { result })
	}

	pub fn fail_workflow(
		&mut self,
		reason: String,
		details: Option<Vec<u8>>,
	) -> Result<(), WorkerError> {
		self.add_completion(Decision::FailWorkflowExecution { reason, details })
	}

	pub fn cancel_workflow(&mut self, details: Option<Vec<u8>>) -> Result<(), WorkerError> {
		self.add_completion(Decision::CancelWorkflowExecution { details })
	}

	pub fn continue_as_new(
		&mut self,
		attributes: ContinueAsNewWorkflowExecutionAttributes,
	) -> Result<(), WorkerError> {
		self.add_completion(Decision::ContinueAsNewWorkflowExecution(attributes))
	}

	// MARK: History events

	/// Route one history event to the machine it belongs to. Events that no
	/// machine claims are a nondeterminism error: this replay's user code
	/// diverged from recorded history.
	pub fn handle_event(&mut self, event: &HistoryEvent) -> Result<(), WorkerError> {
		match &event.attributes {
			EventAttributes::WorkflowExecutionStarted(_) => Ok(()),

			EventAttributes::DecisionTaskStarted { .. } => {
				self.handle_decision_task_started();
				Ok(())
			}
			EventAttributes::DecisionTaskCompleted {
				execution_context, ..
			} => {
				self.last_observed_context = execution_context.clone();
				Ok(())
			}

			EventAttributes::ActivityTaskScheduled(attributes) => {
				self.activity_id_by_scheduled_event
					.insert(event.event_id, attributes.activity_id.clone());

				let id = DecisionId::new(DecisionTarget::Activity, attributes.activity_id.clone());
				self.with_machine(&id, |m| m.handle_initiated_event())
			}
			EventAttributes::ActivityTaskStarted {
				scheduled_event_id, ..
			} => {
				// No machine transition; just assert the reference resolves
				self.resolve_activity_id(*scheduled_event_id)?;
				Ok(())
			}
			EventAttributes::ActivityTaskCompleted {
				scheduled_event_id, ..
			}
			| EventAttributes::ActivityTaskFailed {
				scheduled_event_id, ..
			}
			| EventAttributes::ActivityTaskTimedOut {
				scheduled_event_id, ..
			} => {
				let id = self.resolve_activity_id(*scheduled_event_id)?;
				self.with_machine(&id, |m| m.handle_completion_event())
			}
			EventAttributes::ActivityTaskCanceled {
				scheduled_event_id, ..
			} => {
				let id = self.resolve_activity_id(*scheduled_event_id)?;
				self.with_machine(&id, |m| m.handle_canceled_event())
			}
			EventAttributes::ActivityTaskCancelRequested { activity_id } => {
				let id = DecisionId::new(DecisionTarget::Activity, activity_id.clone());
				self.with_machine(&id, |m| m.handle_cancellation_initiated_event())
			}
			EventAttributes::RequestCancelActivityTaskFailed { activity_id, .. } => {
				let id = DecisionId::new(DecisionTarget::Activity, activity_id.clone());
				self.with_machine(&id, |m| m.handle_cancellation_failure_event())
			}

			EventAttributes::TimerStarted { timer_id, .. } => {
				let id = DecisionId::new(DecisionTarget::Timer, timer_id.clone());
				self.with_machine(&id, |m| m.handle_initiated_event())
			}
			EventAttributes::TimerFired { timer_id, .. } => {
				let id = DecisionId::new(DecisionTarget::Timer, timer_id.clone());
				self.with_machine(&id, |m| m.handle_completion_event())
			}
			EventAttributes::TimerCanceled { timer_id, .. } => {
				let id = DecisionId::new(DecisionTarget::Timer, timer_id.clone());
				self.with_machine(&id, |m| m.handle_canceled_event())
			}
			EventAttributes::CancelTimerFailed { timer_id, .. } => {
				let id = DecisionId::new(DecisionTarget::Timer, timer_id.clone());
				self.with_machine(&id, |m| m.handle_cancellation_failure_event())
			}

			EventAttributes::StartChildWorkflowExecutionInitiated(attributes) => {
				let id = DecisionId::new(
					DecisionTarget::ExternalWorkflow,
					attributes.workflow_id.clone(),
				);
				self.with_machine(&id, |m| m.handle_initiated_event())
			}
			EventAttributes::StartChildWorkflowExecutionFailed { workflow_id, .. } => {
				let id = DecisionId::new(DecisionTarget::ExternalWorkflow, workflow_id.clone());
				self.with_machine(&id, |m| m.handle_completion_event())
			}
			EventAttributes::ChildWorkflowExecutionStarted { execution, .. } => {
				let id = DecisionId::new(
					DecisionTarget::ExternalWorkflow,
					execution.workflow_id.clone(),
				);
				self.with_machine(&id, |m| m.handle_started_event())
			}
			EventAttributes::ChildWorkflowExecutionCompleted { execution, .. }
			| EventAttributes::ChildWorkflowExecutionFailed { execution, .. }
			| EventAttributes::ChildWorkflowExecutionTimedOut { execution, .. } => {
				let id = DecisionId::new(
					DecisionTarget::ExternalWorkflow,
					execution.workflow_id.clone(),
				);
				self.with_machine(&id, |m| m.handle_completion_event())
			}
			EventAttributes::ChildWorkflowExecutionCanceled { execution, .. } => {
				let id = DecisionId::new(
					DecisionTarget::ExternalWorkflow,
					execution.workflow_id.clone(),
				);
				self.with_machine(&id, |m| m.handle_canceled_event())
			}

			EventAttributes::SignalExternalWorkflowExecutionInitiated { control, .. } => {
				self.signal_id_by_initiated_event
					.insert(event.event_id, control.clone());

				let id = DecisionId::new(DecisionTarget::Signal, control.clone());
				self.with_machine(&id, |m| m.handle_initiated_event())
			}
			EventAttributes::ExternalWorkflowExecutionSignaled {
				initiated_event_id, ..
			}
			| EventAttributes::SignalExternalWorkflowExecutionFailed {
				initiated_event_id, ..
			} => {
				let id = self.resolve_signal_id(*initiated_event_id)?;
				self.with_machine(&id, |m| m.handle_completion_event())
			}

			EventAttributes::RequestCancelExternalWorkflowExecutionInitiated { execution } => {
				let id = DecisionId::new(
					DecisionTarget::ExternalWorkflow,
					execution.workflow_id.clone(),
				);
				self.with_machine(&id, |m| m.handle_initiated_event())
			}
			EventAttributes::RequestCancelExternalWorkflowExecutionFailed {
				execution, ..
			}
			| EventAttributes::ExternalWorkflowExecutionCancelRequested { execution, .. } => {
				let id = DecisionId::new(
					DecisionTarget::ExternalWorkflow,
					execution.workflow_id.clone(),
				);
				self.with_machine(&id, |m| m.handle_completion_event())
			}
		}
	}

	/// All decisions pending at a decision task start went out with that
	/// completed batch; move their machines past the pending state.
	pub fn handle_decision_task_started(&mut self) {
		for machine in self.machines.values_mut() {
			machine.handle_decision_task_started();
		}
	}

	// MARK: Outgoing batch

	/// Collect the next outgoing decision batch in access order, capped at
	/// the per-completion maximum. A workflow-completion decision, when
	/// present, is always the last element.
	pub fn decisions(&self) -> Vec<Decision> {
		let mut out = Vec::new();
		let mut completion = None;

		for machine in self.machines.values() {
			let Some(decision) = machine.pending_decision() else {
				continue;
			};

			if decision.is_workflow_completion() {
				completion = Some(decision);
			} else {
				out.push(decision);
			}
		}

		if let Some(completion) = completion {
			out.push(completion);
		}

		let max = self.max_decisions_per_completion;
		if out.len() > max {
			if out[max - 1].is_workflow_completion() {
				out.truncate(max);
			} else {
				tracing::debug!(
					dropped = out.len() - (max - 1),
					"decision batch over cap, forcing immediate follow-up decision task"
				);

				out.truncate(max - 1);
				out.push(Decision::force_immediate_decision());
			}
		}

		out
	}

	pub fn is_done(&self, id: &DecisionId) -> bool {
		self.machines.get(id).map(|m| m.is_done()).unwrap_or(false)
	}

	pub fn machine_state(&self, id: &DecisionId) -> Option<MachineState> {
		self.machines.get(id).map(|m| m.state())
	}

	// MARK: Workflow context blob

	pub fn set_workflow_context(&mut self, context: Option<Vec<u8>>) {
		self.workflow_context = context;
	}

	pub fn workflow_context(&self) -> Option<&[u8]> {
		self.workflow_context.as_deref()
	}

	/// Context bytes to attach to the completion response, or `None` when
	/// they match what the last observed decision-task-completed event
	/// already echoed.
	pub fn workflow_context_to_return(&self) -> Option<Vec<u8>> {
		if self.workflow_context == self.last_observed_context {
			None
		} else {
			self.workflow_context.clone()
		}
	}

	// MARK: Internals

	fn add_machine(&mut self, id: DecisionId, decision: Decision) -> Result<(), WorkerError> {
		if self.machines.contains_key(&id) {
			return Err(WorkerError::DuplicateDecision(id.to_string()));
		}

		self.machines.insert(id, DecisionStateMachine::new(decision));
		Ok(())
	}

	fn add_completion(&mut self, decision: Decision) -> Result<(), WorkerError> {
		let id = DecisionId::own_execution();
		if self.machines.contains_key(&id) {
			return Err(WorkerError::DuplicateDecision(
				"workflow completion already emitted".to_string(),
			));
		}

		self.machines.insert(id, DecisionStateMachine::new(decision));
		Ok(())
	}

	/// Access a machine, refreshing its position to the tail of the emission
	/// order. Unknown ids are a nondeterminism error.
	fn with_machine<T>(
		&mut self,
		id: &DecisionId,
		f: impl FnOnce(&mut DecisionStateMachine) -> T,
	) -> Result<T, WorkerError> {
		let Some((key, mut machine)) = self.machines.shift_remove_entry(id) else {
			return Err(WorkerError::NondeterministicWorkflow(format!("unknown {id}")));
		};

		let out = f(&mut machine);
		self.machines.insert(key, machine);

		Ok(out)
	}

	fn cancel_machine(
		&mut self,
		id: &DecisionId,
		cancel_decision: Option<Decision>,
		callback: impl FnOnce(),
	) -> Result<bool, WorkerError> {
		let outcome = self.with_machine(id, |m| m.cancel(cancel_decision))?;

		match outcome {
			CancelOutcome::CanceledImmediately => {
				callback();
				Ok(true)
			}
			CancelOutcome::CancelDecisionStaged | CancelOutcome::Ignored => Ok(false),
		}
	}

	fn resolve_activity_id(&self, scheduled_event_id: i64) -> Result<DecisionId, WorkerError> {
		self.activity_id_by_scheduled_event
			.get(&scheduled_event_id)
			.map(|activity_id| DecisionId::new(DecisionTarget::Activity, activity_id.clone()))
			.ok_or_else(|| {
				WorkerError::NondeterministicWorkflow(format!(
					"no activity scheduled with event id {scheduled_event_id}"
				))
			})
	}

	fn resolve_signal_id(&self, initiated_event_id: i64) -> Result<DecisionId, WorkerError> {
		self.signal_id_by_initiated_event
			.get(&initiated_event_id)
			.map(|control| DecisionId::new(DecisionTarget::Signal, control.clone()))
			.ok_or_else(|| {
				WorkerError::NondeterministicWorkflow(format!(
					"no signal initiated with event id {initiated_event_id}"
				))
			})
	}
}
