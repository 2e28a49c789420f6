/// Histogram buckets for latencies measured in seconds.
pub const BUCKETS: &[f64] = &[
	0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0,
	100.0,
];

/// Finer-grained buckets for long-poll and end-to-end latencies.
pub const LATENCY_BUCKETS: &[f64] = &[
	0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];
