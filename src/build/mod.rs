//! Build orchestration: budgets, worker pool, blob writer and the
//! builder that ties them together.

pub mod budget;
pub mod builder;
pub mod pool;
pub mod progress;
pub mod writer;

pub use budget::{FileBudget, PointBudget};
pub use builder::{BuildSummary, OctreeBuilder};
pub use pool::WorkerPool;
pub use progress::Progress;
pub use writer::{OctreeWriter, WriteRecord, WriterHandle};
