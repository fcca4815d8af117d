pub mod backpressure;
pub mod batch;
pub mod error;
pub mod queue;

pub use backpressure::{OverflowPolicy, OverflowPolicyKind};
pub use batch::{Batch, BatchConfig, BatchFormer, BatchType};
pub use error::BufferError;
pub use queue::IngressQueue;
