//! Discrete-time filtering: fusing observations into an ensemble.

extern crate na_core;
extern crate ndarray as nd;
extern crate num_traits;
extern crate rand;
extern crate rand_distr;
#[macro_use]
extern crate tracing;

use std::collections::BTreeMap;

use na_core::{Ensemble, Member, Result, Value};

pub use ensemble::gaussian_ensemble;
pub use kalman::enkf::EnKF;

pub mod ensemble;
pub mod kalman;
pub mod utils;

/// Diagnostics an assimilator may write; nothing reads them back.
pub type Log = BTreeMap<String, Value>;

/// Fuses a real observation into a forecast ensemble.
///
/// `obs_clean` and `obs_noisy` are the aligned halves of the observation
/// operator's output on `prior` (see `na_core::split_clean_noisy`); for a
/// plain observation operator they're the same ensemble.
pub trait Assimilator: Send + Sync {
  fn assimilate(&self, prior: &Ensemble,
                obs_clean: &Ensemble, obs_noisy: &Ensemble,
                y_obs: &Member,
                log: Option<&mut Log>) -> Result<Ensemble>;
}

impl<'a, T> Assimilator for &'a T
  where T: Assimilator + ?Sized,
{
  fn assimilate(&self, prior: &Ensemble,
                obs_clean: &Ensemble, obs_noisy: &Ensemble,
                y_obs: &Member,
                log: Option<&mut Log>) -> Result<Ensemble> {
    (**self).assimilate(prior, obs_clean, obs_noisy, y_obs, log)
  }
}

impl<T> Assimilator for Box<T>
  where T: Assimilator + ?Sized,
{
  fn assimilate(&self, prior: &Ensemble,
                obs_clean: &Ensemble, obs_noisy: &Ensemble,
                y_obs: &Member,
                log: Option<&mut Log>) -> Result<Ensemble> {
    (**self).assimilate(prior, obs_clean, obs_noisy, y_obs, log)
  }
}

/// Leaves the prior as it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoAssimilation;

impl Assimilator for NoAssimilation {
  fn assimilate(&self, prior: &Ensemble, _: &Ensemble, _: &Ensemble,
                _: &Member, _: Option<&mut Log>) -> Result<Ensemble> {
    Ok(prior.clone())
  }
}
