use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Exponential backoff on consecutive failures, shared by all workers of one
/// poller pool. A single success resets the failure count.
pub struct BackoffThrottler {
	initial: Duration,
	max: Duration,
	coefficient: f64,
	consecutive_failures: AtomicU32,
}

impl BackoffThrottler {
	pub fn new(initial: Duration, max: Duration, coefficient: f64) -> Self {
		BackoffThrottler {
			initial,
			max,
			coefficient,
			consecutive_failures: AtomicU32::new(0),
		}
	}

	pub fn delay(&self) -> Duration {
		let failures = self.consecutive_failures.load(Ordering::Acquire);
		if failures == 0 {
			return Duration::ZERO;
		}

		self.initial
			.mul_f64(self.coefficient.powi(failures as i32 - 1))
			.min(self.max)
	}

	pub fn success(&self) {
		self.consecutive_failures.store(0, Ordering::Release);
	}

	pub fn failure(&self) {
		self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
	}

	/// Sleeps out the current delay, if any.
	pub async fn throttle(&self) {
		let delay = self.delay();
		if !delay.is_zero() {
			tracing::debug!(?delay, "backing off");

			tokio::time::sleep(delay).await;
		}
	}
}

/// Caps calls at `rate_per_second` averaged over a sliding window. Overshoot
/// blocks the caller until it is eligible again.
pub struct RateThrottler {
	window: Duration,
	capacity: usize,
	recent: Mutex<VecDeque<Instant>>,
}

impl RateThrottler {
	pub fn new(rate_per_second: f64, window: Duration) -> Self {
		let capacity = (rate_per_second * window.as_secs_f64()).floor().max(1.0) as usize;

		RateThrottler {
			window,
			capacity,
			recent: Mutex::new(VecDeque::with_capacity(capacity)),
		}
	}

	/// Blocks until one more call fits the configured rate, then records it.
	pub async fn acquire(&self) {
		let mut recent = self.recent.lock().await;

		loop {
			let now = Instant::now();
			while let Some(front) = recent.front() {
				if now.duration_since(*front) >= self.window {
					recent.pop_front();
				} else {
					break;
				}
			}

			if recent.len() < self.capacity {
				recent.push_back(now);
				return;
			}

			// Oldest call ages out of the window first
			let eligible_at = *recent.front().expect("non-empty at capacity") + self.window;
			tokio::time::sleep_until(eligible_at).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_delay_is_zero_without_failures() {
		let backoff = BackoffThrottler::new(
			Duration::from_millis(10),
			Duration::from_secs(1),
			2.0,
		);

		assert_eq!(backoff.delay(), Duration::ZERO);

		// Success after success keeps it at zero
		for _ in 0..10 {
			backoff.success();
			assert_eq!(backoff.delay(), Duration::ZERO);
		}
	}

	#[test]
	fn backoff_grows_monotonically_until_capped() {
		let backoff = BackoffThrottler::new(
			Duration::from_millis(10),
			Duration::from_secs(1),
			2.0,
		);

		// 5 consecutive failures: 10, 20, 40, 80, 160 ms
		let mut expected = Vec::new();
		for _ in 0..5 {
			backoff.failure();
			expected.push(backoff.delay());
		}
		assert_eq!(
			expected,
			vec![
				Duration::from_millis(10),
				Duration::from_millis(20),
				Duration::from_millis(40),
				Duration::from_millis(80),
				Duration::from_millis(160),
			]
		);

		// Monotone non-decreasing until the cap
		let mut prev = backoff.delay();
		for _ in 0..20 {
			backoff.failure();
			let delay = backoff.delay();
			assert!(delay >= prev);
			assert!(delay <= Duration::from_secs(1));
			prev = delay;
		}
		assert_eq!(backoff.delay(), Duration::from_secs(1));

		// A single success resets
		backoff.success();
		assert_eq!(backoff.delay(), Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn rate_throttler_blocks_on_overshoot() {
		let throttler = RateThrottler::new(2.0, Duration::from_secs(1));

		let start = Instant::now();
		throttler.acquire().await;
		throttler.acquire().await;
		assert!(start.elapsed() < Duration::from_millis(10));

		// Third call within the window must wait for the first to age out
		throttler.acquire().await;
		assert!(start.elapsed() >= Duration::from_secs(1));
	}

	#[tokio::test(start_paused = true)]
	async fn rate_throttler_allows_steady_rate() {
		let throttler = RateThrottler::new(10.0, Duration::from_secs(1));

		for _ in 0..10 {
			let start = Instant::now();
			throttler.acquire().await;
			tokio::time::sleep(Duration::from_millis(100)).await;
			// Steady 10/s never blocks beyond the explicit sleep
			assert!(start.elapsed() <= Duration::from_millis(110));
		}
	}
}
