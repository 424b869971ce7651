//! Durable per-stage work queues.
//!
//! A queue is a directory (`queues/<stage>/`) holding one small JSON file
//! per pending project. The file's existence is the pending work; its body
//! only records when the project arrived, which fixes the FIFO order.

pub mod error;
pub mod queue;
pub mod set;

pub use error::QueueError;
pub use queue::{Queue, QueueEntry};
pub use set::QueueSet;
