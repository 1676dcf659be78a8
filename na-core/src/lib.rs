//! Ensembles of candidate states and the operators that act on them.

extern crate ndarray as nd;
extern crate parking_lot;
extern crate rand;
extern crate rand_distr;
extern crate rand_isaac;
extern crate serde;
extern crate serde_json;
extern crate thiserror;
#[macro_use]
extern crate tracing;

pub use error::{Error, Result};
pub use ensemble::{merge, Ensemble};
pub use member::{Member, Value};
pub use noisy::{Noise, NoisyObserver};
pub use operator::{apply, apply_in_place, split_clean_noisy,
                   FnOperator, Model, ModelOperator, ModelStats, NoisyOperator, Operator};
pub use vectorize::{devectorize, devectorize_into, from_matrix, to_matrix, vectorize};

pub mod ensemble;
pub mod error;
pub mod member;
pub mod noisy;
pub mod operator;
pub mod stats;
pub mod vectorize;
