use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ErrorKind, WorkerError};

/// Cap applied to the computed sleep when `max_interval` is unset.
const UNBOUNDED_MAX_INTERVAL_FACTOR: u32 = 100;

pub const DEFAULT_BACKOFF_COEFFICIENT: f64 = 2.0;

/// Retry policy shared by RPC call classes and user-level workflow/activity
/// retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
	pub initial_interval: Duration,
	pub max_interval: Option<Duration>,
	pub backoff_coefficient: f64,
	/// 0 = unbounded.
	pub max_attempts: usize,
	/// Attempts always granted even once past `expiration`.
	pub minimum_attempts: usize,
	pub expiration: Option<Duration>,
	pub do_not_retry: Vec<ErrorKind>,
}

impl Default for RetryOptions {
	fn default() -> Self {
		RetryOptions {
			initial_interval: Duration::from_millis(200),
			max_interval: None,
			backoff_coefficient: DEFAULT_BACKOFF_COEFFICIENT,
			max_attempts: 0,
			minimum_attempts: 0,
			expiration: None,
			do_not_retry: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
	Retry { sleep: Duration },
	Rethrow,
}

impl RetryOptions {
	pub fn new(initial_interval: Duration) -> Self {
		RetryOptions {
			initial_interval,
			..Default::default()
		}
	}

	pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
		self.max_interval = Some(max_interval);
		self
	}

	pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
		self.max_attempts = max_attempts;
		self
	}

	pub fn with_minimum_attempts(mut self, minimum_attempts: usize) -> Self {
		self.minimum_attempts = minimum_attempts;
		self
	}

	pub fn with_expiration(mut self, expiration: Duration) -> Self {
		self.expiration = Some(expiration);
		self
	}

	pub fn with_do_not_retry(mut self, kinds: Vec<ErrorKind>) -> Self {
		self.do_not_retry = kinds;
		self
	}

	/// Sleep before attempt `attempt + 1`, i.e. after `attempt` failures.
	pub fn next_sleep(&self, attempt: usize) -> Duration {
		let attempt = attempt.max(1);
		let cap = self
			.max_interval
			.unwrap_or(self.initial_interval * UNBOUNDED_MAX_INTERVAL_FACTOR);
		let sleep = self
			.initial_interval
			.mul_f64(self.backoff_coefficient.powi(attempt as i32 - 1));

		sleep.min(cap)
	}

	/// Decide whether `err` on attempt number `attempt` (1-based) should be
	/// retried given `elapsed` time since the first attempt.
	pub fn evaluate(&self, err: &WorkerError, attempt: usize, elapsed: Duration) -> RetryDecision {
		// Workflow-caused wrappers defer to their cause
		let err = match err {
			WorkerError::ActivityFailure { cause, .. }
			| WorkerError::ChildWorkflowFailure { cause, .. } => cause.as_ref(),
			other => other,
		};

		if self.do_not_retry.contains(&err.kind()) {
			return RetryDecision::Rethrow;
		}

		if self.max_attempts > 0 && attempt >= self.max_attempts {
			return RetryDecision::Rethrow;
		}

		let sleep = self.next_sleep(attempt);
		if let Some(expiration) = self.expiration {
			if elapsed + sleep >= expiration && attempt > self.minimum_attempts {
				return RetryDecision::Rethrow;
			}
		}

		RetryDecision::Retry { sleep }
	}
}

/// Run `op` under `options`, sleeping a jittered backoff between attempts.
#[tracing::instrument(skip_all)]
pub async fn retry<T, F, Fut>(options: &RetryOptions, mut op: F) -> Result<T, WorkerError>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, WorkerError>>,
{
	let start = Instant::now();
	let mut attempt = 1;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) => match options.evaluate(&err, attempt, start.elapsed()) {
				RetryDecision::Rethrow => return Err(err),
				RetryDecision::Retry { sleep } => {
					tracing::debug!(%err, attempt, ?sleep, "retrying after error");

					tokio::time::sleep(jitter(sleep)).await;
					attempt += 1;
				}
			},
		}
	}
}

fn jitter(duration: Duration) -> Duration {
	duration.mul_f64(rand::thread_rng().gen_range(0.8..1.2))
}
