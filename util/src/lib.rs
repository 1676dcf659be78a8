//! Odds and ends shared by the problem binaries.

extern crate na_core;
extern crate pbr;
#[macro_use]
extern crate tracing;

pub use bootstrap::Bootstrap;
pub use progress::{Reporting, ReportingIterator};

pub mod bootstrap;
pub mod progress;
