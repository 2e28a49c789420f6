//! Client-side worker core for a durable workflow orchestration service.
//!
//! The remote service is the source of truth: it persists an append-only
//! history of events per workflow execution and hands out decision tasks
//! (replay user workflow code, emit the next batch of decisions) and activity
//! tasks (run one side-effecting function, report the result). This crate
//! implements the poll/dispatch/report loop, the decision state machine
//! engine that reconciles emitted decisions against history across replays,
//! the deadline-bounded paginated history iterator, and the retry policy
//! evaluator shared by RPC and user-level retries.

pub mod config;
pub mod convert;
pub mod error;
pub mod history;
pub mod machines;
pub mod metrics;
pub mod poller;
pub mod protocol;
pub mod replay;
pub mod retry;
pub mod service;
pub mod throttle;
pub mod worker;

pub mod prelude {
	pub use crate::config::{PollerOptions, WorkerConfig};
	pub use crate::convert::{JsonPayloadConverter, PayloadConverter};
	pub use crate::error::{RpcError, WorkerError};
	pub use crate::history::WorkflowHistoryIterator;
	pub use crate::machines::DecisionsHelper;
	pub use crate::protocol::decision::Decision;
	pub use crate::protocol::event::{EventAttributes, EventType, HistoryEvent};
	pub use crate::protocol::task::{ActivityTask, DecisionTask, WorkflowExecution};
	pub use crate::retry::RetryOptions;
	pub use crate::service::{ServiceHandle, WorkflowService};
	pub use crate::worker::activity::{ActivityHandler, ActivityRegistry};
	pub use crate::worker::workflow::{DecisionTaskHandler, DecisionTaskOutcome};
	pub use crate::worker::Worker;
}
