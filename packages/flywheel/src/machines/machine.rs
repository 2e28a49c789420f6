use crate::protocol::decision::Decision;

/// Lifecycle of one emitted decision as it is reconciled against history.
///
/// The happy path runs `Created → DecisionSent → Initiated → {Started →}
/// Completed`. Cancellation branches depend on how far the decision got
/// before `cancel()` was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MachineState {
	Created,
	DecisionSent,
	CanceledBeforeInitiated,
	Initiated,
	Started,
	CanceledAfterInitiated,
	CanceledAfterStarted,
	CancellationDecisionSent,
	CompletedAfterCancellationDecisionSent,
	Completed,
}

/// Result of a `cancel()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
	/// The decision had not been sent yet; it was withdrawn and the caller
	/// must fire the immediate cancellation callback.
	CanceledImmediately,
	/// A cancel decision was staged for the next batch.
	CancelDecisionStaged,
	/// Nothing to do (already terminal, or the target kind has no cancel
	/// decision).
	Ignored,
}

/// State machine for a single decision target. Created when user code emits
/// the decision during replay, advanced by history events, never destroyed
/// before the decision task returns.
#[derive(Debug)]
pub(crate) struct DecisionStateMachine {
	state: MachineState,
	/// Initiating decision, until sent or withdrawn.
	decision: Option<Decision>,
	/// Cancel decision staged by `cancel()`, until sent.
	cancel_decision: Option<Decision>,
}

impl DecisionStateMachine {
	pub fn new(decision: Decision) -> Self {
		DecisionStateMachine {
			state: MachineState::Created,
			decision: Some(decision),
			cancel_decision: None,
		}
	}

	pub fn state(&self) -> MachineState {
		self.state
	}

	pub fn is_done(&self) -> bool {
		matches!(
			self.state,
			MachineState::Completed
				| MachineState::CompletedAfterCancellationDecisionSent
				| MachineState::CanceledBeforeInitiated
		)
	}

	/// Decision to include in the next outgoing batch, if any. Non-mutating:
	/// the decision stays pending until a decision-task-started event marks
	/// the batch as sent.
	pub fn pending_decision(&self) -> Option<Decision> {
		match self.state {
			MachineState::Created => self.decision.clone(),
			MachineState::CanceledAfterInitiated | MachineState::CanceledAfterStarted => {
				self.cancel_decision.clone()
			}
			_ => None,
		}
	}

	/// The service recorded a decision task start: everything pending at that
	/// point went out with the completed batch.
	pub fn handle_decision_task_started(&mut self) {
		match self.state {
			MachineState::Created => self.state = MachineState::DecisionSent,
			MachineState::CanceledAfterInitiated | MachineState::CanceledAfterStarted => {
				self.state = MachineState::CancellationDecisionSent
			}
			_ => {}
		}
	}

	pub fn handle_initiated_event(&mut self) {
		if self.state == MachineState::DecisionSent {
			self.state = MachineState::Initiated;
		}
	}

	pub fn handle_started_event(&mut self) {
		if self.state == MachineState::Initiated {
			self.state = MachineState::Started;
		}
	}

	/// Terminal event (completed, failed, timed out) for this target.
	/// Duplicate deliveries within one task are no-ops.
	pub fn handle_completion_event(&mut self) {
		match self.state {
			MachineState::CanceledAfterInitiated
			| MachineState::CanceledAfterStarted
			| MachineState::CancellationDecisionSent => {
				self.state = MachineState::CompletedAfterCancellationDecisionSent
			}
			MachineState::Completed
			| MachineState::CompletedAfterCancellationDecisionSent
			| MachineState::CanceledBeforeInitiated => {}
			_ => self.state = MachineState::Completed,
		}
	}

	/// The target was canceled at the service.
	pub fn handle_canceled_event(&mut self) {
		self.handle_completion_event();
	}

	/// The service acknowledged the cancel decision; terminal event still
	/// pending.
	pub fn handle_cancellation_initiated_event(&mut self) {}

	/// The cancel decision was rejected. Treated as a completion: the
	/// cancellation path is over for this machine.
	pub fn handle_cancellation_failure_event(&mut self) {
		self.handle_completion_event();
	}

	/// Cancel this decision. `cancel_decision` is the kind-specific cancel
	/// command, or `None` for targets that cannot be canceled once sent.
	pub fn cancel(&mut self, cancel_decision: Option<Decision>) -> CancelOutcome {
		match self.state {
			MachineState::Created => {
				self.state = MachineState::CanceledBeforeInitiated;
				self.decision = None;
				CancelOutcome::CanceledImmediately
			}
			MachineState::DecisionSent | MachineState::Initiated => match cancel_decision {
				Some(decision) => {
					self.state = MachineState::CanceledAfterInitiated;
					self.cancel_decision = Some(decision);
					CancelOutcome::CancelDecisionStaged
				}
				None => CancelOutcome::Ignored,
			},
			MachineState::Started => match cancel_decision {
				Some(decision) => {
					self.state = MachineState::CanceledAfterStarted;
					self.cancel_decision = Some(decision);
					CancelOutcome::CancelDecisionStaged
				}
				None => CancelOutcome::Ignored,
			},
			_ => CancelOutcome::Ignored,
		}
	}
}
