use std::sync::Arc;

use crate::error::WorkerError;
use crate::history::WorkflowHistoryIterator;
use crate::protocol::event::HistoryEvent;
use crate::protocol::task::{DecisionTask, WorkflowExecution, WorkflowQuery};
use crate::worker::workflow::{DecisionTaskHandler, DecisionTaskOutcome};

/// Synthesize a decision task for offline replay of a pre-supplied history.
/// Both started-event ids are `i64::MAX` so the dispatcher treats every event
/// as already processed and emits nothing new.
pub fn replay_decision_task(
	workflow_type: impl Into<String>,
	execution: WorkflowExecution,
	history: Vec<HistoryEvent>,
	query: Option<WorkflowQuery>,
) -> DecisionTask {
	DecisionTask {
		task_token: Vec::new(),
		workflow_type: workflow_type.into(),
		execution,
		started_event_id: i64::MAX,
		previous_started_event_id: i64::MAX,
		history,
		next_page_token: None,
		query,
	}
}

/// Read-only replay of recorded histories without polling. Used to answer
/// queries against closed or remote executions and to validate workflow code
/// changes against production histories.
pub struct WorkflowReplayer {
	handler: Arc<dyn DecisionTaskHandler>,
}

impl WorkflowReplayer {
	pub fn new(handler: Arc<dyn DecisionTaskHandler>) -> Self {
		WorkflowReplayer { handler }
	}

	#[tracing::instrument(skip_all, fields(execution=%execution))]
	pub async fn replay(
		&self,
		workflow_type: impl Into<String>,
		execution: WorkflowExecution,
		history: Vec<HistoryEvent>,
		query: Option<WorkflowQuery>,
	) -> Result<DecisionTaskOutcome, WorkerError> {
		let task = replay_decision_task(workflow_type, execution, history, query);
		let mut iterator = WorkflowHistoryIterator::offline(&task)?;

		self.handler.handle_decision_task(&task, &mut iterator).await
	}

	/// Replay and answer a query from the reconstructed state.
	pub async fn query(
		&self,
		workflow_type: impl Into<String>,
		execution: WorkflowExecution,
		history: Vec<HistoryEvent>,
		query: WorkflowQuery,
	) -> Result<Vec<u8>, WorkerError> {
		let outcome = self
			.replay(workflow_type, execution, history, Some(query))
			.await?;

		match outcome {
			DecisionTaskOutcome::QueryCompleted { result } => {
				result.map_err(|message| WorkerError::Other(anyhow::anyhow!(message)))
			}
			other => Err(WorkerError::Other(anyhow::anyhow!(
				"replay produced {other:?} instead of a query result"
			))),
		}
	}
}
