//! Running ensemble operators in parallel: in memory on a worker pool, or
//! across processes with per-member checkpoint files.

extern crate crossbeam_channel;
extern crate na_core;
extern crate na_storage;
extern crate parking_lot;
extern crate rand;
extern crate rand_isaac;
extern crate rayon;
extern crate serde;
#[macro_use]
extern crate tracing;

pub use distributed::{Backend, DistributedOperator, PoolConfig};
pub use divvy::{divvy, divvy_range};
pub use partial::{run_partial_operator, PartialOutcome, PartialRun};
pub use queue::run_job_queue;

pub mod distributed;
pub mod divvy;
pub mod partial;
pub mod queue;
