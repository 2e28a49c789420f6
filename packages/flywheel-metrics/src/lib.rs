mod buckets;
mod registry;

pub use buckets::{BUCKETS, LATENCY_BUCKETS};
pub use prometheus;
pub use registry::REGISTRY;
