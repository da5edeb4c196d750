//! Host Stream Registry: a process-scoped table of backpressured,
//! single-consumer, push/pull byte streams shared by the host and the guest
//! VM across the fetch bridge boundary.

mod ops;
mod registry;

pub use ops::islet_io;
pub use registry::{
    CleanupFn, ErrorValue, PullOutcome, RegistryMetrics, StreamId, StreamMetrics, StreamRegistry,
};

/// Registry-wide backpressure constants (spec §6).
pub const HIGH_WATER_MARK: usize = 65_536;
pub const MAX_QUEUE_CHUNKS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Stream deleted")]
    Deleted,
}
