use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream::FuturesUnordered, StreamExt};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::PollerOptions;
use crate::error::WorkerError;
use crate::metrics;
use crate::throttle::{BackoffThrottler, RateThrottler};

/// One poll → handle cycle. The cycle runs in-line on its poll worker, so a
/// slow `handle` consumes its worker; backpressure comes from sizing the
/// pool.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
	type Task: Send + Sync + 'static;

	/// Long-poll for the next task. `None` means idle, not an error.
	async fn poll(&self) -> Result<Option<Self::Task>, WorkerError>;

	async fn handle(&self, task: &Self::Task) -> Result<(), WorkerError>;

	/// Wrap a handling error with task context before it reaches the
	/// uncaught-error sink.
	fn wrap_failure(&self, _task: &Self::Task, err: WorkerError) -> anyhow::Error {
		err.into()
	}
}

pub type ErrorSink = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

/// Fixed pool of identical poll workers with cooperative suspension,
/// exponential backoff on failure, and optional steady-rate throttling.
pub struct Poller<H: TaskHandler> {
	options: PollerOptions,
	kind: &'static str,
	domain: String,
	task_list: String,
	handler: Arc<H>,
	backoff: Arc<BackoffThrottler>,
	rate: Option<Arc<RateThrottler>>,
	concurrency: Option<Arc<Semaphore>>,
	suspended: watch::Sender<bool>,
	shutdown: CancellationToken,
	abort: CancellationToken,
	workers: Mutex<Vec<JoinHandle<()>>>,
	error_sink: ErrorSink,
}

impl<H: TaskHandler> Poller<H> {
	pub fn new(
		options: PollerOptions,
		kind: &'static str,
		domain: impl Into<String>,
		task_list: impl Into<String>,
		handler: Arc<H>,
		max_concurrent: Option<usize>,
	) -> Self {
		let backoff = Arc::new(BackoffThrottler::new(
			options.backoff_initial,
			options.backoff_max,
			options.backoff_coefficient,
		));
		let rate = options
			.max_polls_per_second
			.map(|rate| Arc::new(RateThrottler::new(rate, options.rate_window)));
		let concurrency = max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1))));
		let (suspended, _) = watch::channel(false);

		Poller {
			options,
			kind,
			domain: domain.into(),
			task_list: task_list.into(),
			handler,
			backoff,
			rate,
			concurrency,
			suspended,
			shutdown: CancellationToken::new(),
			abort: CancellationToken::new(),
			workers: Mutex::new(Vec::new()),
			error_sink: Arc::new(|err| tracing::error!(?err, "uncaught poll task error")),
		}
	}

	pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
		self.error_sink = sink;
		self
	}

	pub fn backoff(&self) -> &BackoffThrottler {
		&self.backoff
	}

	/// Spawn the pool.
	#[tracing::instrument(skip_all, fields(kind=%self.kind, domain=%self.domain, task_list=%self.task_list))]
	pub fn start(&self) {
		let poller_count = self.options.poller_count.max(1);
		tracing::debug!(poller_count, "starting poll workers");

		let mut workers = self.workers.lock().expect("poisoned");
		for index in 0..poller_count {
			metrics::POLLER_START
				.with_label_values(&[&self.domain, &self.task_list, self.kind])
				.inc();

			let worker = PollWorker {
				handler: self.handler.clone(),
				backoff: self.backoff.clone(),
				rate: self.rate.clone(),
				concurrency: self.concurrency.clone(),
				suspended: self.suspended.subscribe(),
				shutdown: self.shutdown.clone(),
				abort: self.abort.clone(),
				error_sink: self.error_sink.clone(),
			};

			let span = tracing::info_span!(
				"poll_worker",
				worker = %format!("{}-{index}", self.options.task_name_prefix)
			);
			workers.push(tokio::spawn(worker.run().instrument(span)));
		}
	}

	/// Park all workers before their next poll. In-flight cycles are not
	/// interrupted.
	pub fn suspend_polling(&self) {
		let _ = self.suspended.send(true);
	}

	pub fn resume_polling(&self) {
		let _ = self.suspended.send(false);
	}

	pub fn is_suspended(&self) -> bool {
		*self.suspended.borrow()
	}

	/// Graceful stop: workers finish their current iteration and exit.
	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}

	/// Force stop: additionally cancels blocking polls and sleeps.
	pub fn shutdown_now(&self) {
		self.shutdown.cancel();
		self.abort.cancel();
	}

	/// Wait for all poll workers to exit. Returns `false` on timeout; workers
	/// still running stay joinable by a later call.
	pub async fn await_termination(&self, timeout: Duration) -> bool {
		let mut workers = std::mem::take(&mut *self.workers.lock().expect("poisoned"));
		workers.retain(|worker| !worker.is_finished());

		let join_fut = async {
			let mut workers = workers.iter_mut().collect::<FuturesUnordered<_>>();
			while workers.next().await.is_some() {}
		};
		let done = tokio::time::timeout(timeout, join_fut).await.is_ok();

		if !done {
			tracing::warn!(
				remaining_workers = workers.iter().filter(|w| !w.is_finished()).count(),
				"poll workers did not exit in time"
			);

			workers.retain(|worker| !worker.is_finished());
			self.workers.lock().expect("poisoned").extend(workers);
		}

		done
	}

	pub async fn shutdown_and_await_termination(&self, timeout: Duration) -> bool {
		self.shutdown_now();
		self.await_termination(timeout).await
	}
}

struct PollWorker<H: TaskHandler> {
	handler: Arc<H>,
	backoff: Arc<BackoffThrottler>,
	rate: Option<Arc<RateThrottler>>,
	concurrency: Option<Arc<Semaphore>>,
	suspended: watch::Receiver<bool>,
	shutdown: CancellationToken,
	abort: CancellationToken,
	error_sink: ErrorSink,
}

impl<H: TaskHandler> PollWorker<H> {
	async fn run(mut self) {
		self.run_loop().await;

		tracing::debug!("poll worker exited");
	}

	async fn run_loop(&mut self) {
		loop {
			if self.shutdown.is_cancelled() {
				break;
			}

			// Backoff from previous failures. Inter-iteration sleeps also end
			// on graceful shutdown; only the in-flight cycle is spared.
			tokio::select! {
				_ = self.backoff.throttle() => {}
				_ = self.shutdown.cancelled() => break,
			}

			// Steady-rate cap
			if let Some(rate) = &self.rate {
				tokio::select! {
					_ = rate.acquire() => {}
					_ = self.shutdown.cancelled() => break,
				}
			}

			if !self.wait_resumed().await {
				break;
			}
			if self.shutdown.is_cancelled() {
				break;
			}

			let permit = match &self.concurrency {
				Some(semaphore) => {
					tokio::select! {
						permit = semaphore.clone().acquire_owned() => match permit {
							Ok(permit) => Some(permit),
							Err(_) => break,
						},
						_ = self.shutdown.cancelled() => break,
					}
				}
				None => None,
			};

			let outcome = tokio::select! {
				outcome = self.cycle() => Some(outcome),
				_ = self.abort.cancelled() => None,
			};
			drop(permit);

			match outcome {
				// Interrupted mid-cycle by an immediate shutdown
				None => break,
				Some(Ok(())) => self.backoff.success(),
				Some(Err(err)) => {
					self.backoff.failure();

					// An uncaught error never stops the worker; hand it to
					// the sink unless we are already shutting down
					if self.shutdown.is_cancelled() {
						tracing::debug!(?err, "poll task error during shutdown, ignoring");
					} else {
						(self.error_sink)(err);
					}
				}
			}
		}
	}

	async fn cycle(&self) -> Result<(), anyhow::Error> {
		if let Some(task) = self.handler.poll().await? {
			if let Err(err) = self.handler.handle(&task).await {
				return Err(self.handler.wrap_failure(&task, err));
			}
		}

		Ok(())
	}

	/// Block while the suspend latch is set. Returns `false` on shutdown.
	async fn wait_resumed(&mut self) -> bool {
		loop {
			if !*self.suspended.borrow_and_update() {
				return true;
			}

			tracing::debug!("polling suspended");
			tokio::select! {
				res = self.suspended.changed() => {
					if res.is_err() {
						return false;
					}
				}
				_ = self.shutdown.cancelled() => return false,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

	use super::*;
	use crate::error::RpcError;

	struct CountingHandler {
		polls: AtomicUsize,
		handled: AtomicUsize,
		fail_polls: AtomicBool,
		hang_polls: AtomicBool,
	}

	impl CountingHandler {
		fn new() -> Arc<Self> {
			Arc::new(CountingHandler {
				polls: AtomicUsize::new(0),
				handled: AtomicUsize::new(0),
				fail_polls: AtomicBool::new(false),
				hang_polls: AtomicBool::new(false),
			})
		}
	}

	#[async_trait]
	impl TaskHandler for CountingHandler {
		type Task = u64;

		async fn poll(&self) -> Result<Option<u64>, WorkerError> {
			if self.hang_polls.load(Ordering::Acquire) {
				std::future::pending::<()>().await;
			}

			// Simulated long poll
			tokio::time::sleep(Duration::from_millis(1)).await;

			let n = self.polls.fetch_add(1, Ordering::AcqRel) as u64;
			if self.fail_polls.load(Ordering::Acquire) {
				return Err(RpcError::ServiceBusy("busy".to_string()).into());
			}

			Ok(Some(n))
		}

		async fn handle(&self, _task: &u64) -> Result<(), WorkerError> {
			self.handled.fetch_add(1, Ordering::AcqRel);
			Ok(())
		}
	}

	fn options() -> PollerOptions {
		PollerOptions {
			poller_count: 2,
			backoff_initial: Duration::from_millis(1),
			backoff_max: Duration::from_millis(10),
			..Default::default()
		}
	}

	fn poller(handler: Arc<CountingHandler>) -> Poller<CountingHandler> {
		Poller::new(options(), "decision", "test-domain", "tl", handler, None)
	}

	#[tokio::test]
	async fn polls_and_handles_until_shutdown() {
		let handler = CountingHandler::new();
		let poller = poller(handler.clone());

		poller.start();
		tokio::time::sleep(Duration::from_millis(50)).await;

		poller.shutdown();
		assert!(poller.await_termination(Duration::from_secs(1)).await);
		assert!(handler.handled.load(Ordering::Acquire) > 0);
	}

	#[tokio::test]
	async fn suspend_and_resume_round_trip() {
		let handler = CountingHandler::new();
		let poller = poller(handler.clone());

		assert!(!poller.is_suspended());
		poller.start();
		tokio::time::sleep(Duration::from_millis(30)).await;

		poller.suspend_polling();
		assert!(poller.is_suspended());
		// Let in-flight cycles drain, then the count must hold still
		tokio::time::sleep(Duration::from_millis(30)).await;
		let suspended_at = handler.handled.load(Ordering::Acquire);
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(handler.handled.load(Ordering::Acquire), suspended_at);

		poller.resume_polling();
		assert!(!poller.is_suspended());
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert!(handler.handled.load(Ordering::Acquire) > suspended_at);

		poller.shutdown();
		assert!(poller.await_termination(Duration::from_secs(1)).await);
	}

	#[tokio::test]
	async fn poll_failures_feed_the_sink_and_never_stop_the_loop() {
		let handler = CountingHandler::new();
		handler.fail_polls.store(true, Ordering::Release);

		let sunk = Arc::new(AtomicUsize::new(0));
		let sunk2 = sunk.clone();
		let poller = poller(handler.clone())
			.with_error_sink(Arc::new(move |_| {
				sunk2.fetch_add(1, Ordering::AcqRel);
			}));

		poller.start();
		tokio::time::sleep(Duration::from_millis(80)).await;

		// The loop kept polling through failures
		assert!(sunk.load(Ordering::Acquire) >= 2);
		assert!(poller.backoff().delay() > Duration::ZERO);

		poller.shutdown();
		assert!(poller.await_termination(Duration::from_secs(1)).await);
	}

	#[tokio::test]
	async fn shutdown_now_interrupts_hung_polls() {
		let handler = CountingHandler::new();
		handler.hang_polls.store(true, Ordering::Release);

		let poller = poller(handler.clone());
		poller.start();
		tokio::time::sleep(Duration::from_millis(20)).await;

		// Graceful shutdown alone cannot finish: every worker is stuck in poll
		assert!(
			poller
				.shutdown_and_await_termination(Duration::from_secs(1))
				.await
		);
		assert_eq!(handler.handled.load(Ordering::Acquire), 0);
	}

	#[tokio::test]
	async fn concurrency_cap_limits_in_flight_handling() {
		struct SlowHandler {
			in_flight: AtomicUsize,
			max_in_flight: AtomicUsize,
		}

		#[async_trait]
		impl TaskHandler for SlowHandler {
			type Task = ();

			async fn poll(&self) -> Result<Option<()>, WorkerError> {
				Ok(Some(()))
			}

			async fn handle(&self, _task: &()) -> Result<(), WorkerError> {
				let n = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
				self.max_in_flight.fetch_max(n, Ordering::AcqRel);
				tokio::time::sleep(Duration::from_millis(5)).await;
				self.in_flight.fetch_sub(1, Ordering::AcqRel);
				Ok(())
			}
		}

		let handler = Arc::new(SlowHandler {
			in_flight: AtomicUsize::new(0),
			max_in_flight: AtomicUsize::new(0),
		});

		let poller = Poller::new(
			PollerOptions {
				poller_count: 4,
				..options()
			},
			"activity",
			"test-domain",
			"tl",
			handler.clone(),
			Some(1),
		);

		poller.start();
		tokio::time::sleep(Duration::from_millis(50)).await;
		poller.shutdown();
		assert!(poller.await_termination(Duration::from_secs(1)).await);

		assert_eq!(handler.max_in_flight.load(Ordering::Acquire), 1);
	}
}
