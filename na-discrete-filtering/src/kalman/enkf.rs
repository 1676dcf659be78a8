//! Stochastic ensemble Kalman filter with perturbed observations.

use nd::parallel::prelude::*;
use nd::Axis;

use std::time::Instant;

use na_core::{devectorize, to_matrix, vectorize, Ensemble, Error, Member, Result, Value};

use super::anomalies;
use crate::utils::spd_solve;
use crate::{Assimilator, Log};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnKF {
  /// Variance of the (independent) observation errors, R = variance * I.
  pub observation_variance: f64,
}

impl EnKF {
  pub fn new(observation_variance: f64) -> EnKF {
    EnKF { observation_variance }
  }
}

fn check_len(prior: &Ensemble, other: &Ensemble) -> Result<()> {
  if prior.len() != other.len() {
    return Err(Error::LengthMismatch {
      left: prior.len(),
      right: other.len(),
    });
  }
  Ok(())
}

impl Assimilator for EnKF {
  /// `x_i += K (y - y~_i)` with `K = Cxy (Cyy + R)^-1`, the covariances
  /// taken between the prior states and the clean predicted observations.
  fn assimilate(&self, prior: &Ensemble, obs_clean: &Ensemble, obs_noisy: &Ensemble,
                y_obs: &Member, log: Option<&mut Log>) -> Result<Ensemble> {
    let start = Instant::now();
    check_len(prior, obs_clean)?;
    check_len(prior, obs_noisy)?;

    let obs_keys = &obs_clean.state_keys;
    let x = to_matrix(&prior.state_keys, &prior.members)?;
    let y = to_matrix(obs_keys, &obs_clean.members)?;
    let y_noisy = to_matrix(obs_keys, &obs_noisy.members)?;
    let y_obs = vectorize(obs_keys, y_obs)?;
    if y_obs.len() != y.nrows() {
      return Err(Error::Shape {
        consumed: y.nrows(),
        provided: y_obs.len(),
      });
    }

    let (_, a) = anomalies(x.view())?;
    let (y_mean, b) = anomalies(y.view())?;

    let cxy = a.dot(&b.t());
    let mut s = b.dot(&b.t());
    for d in s.diag_mut() {
      *d += self.observation_variance;
    }
    // S K^T = Cxy^T
    let gain_t = spd_solve(s.view(), cxy.t())?;

    let mut innovations = -&y_noisy;
    innovations += &y_obs.view().insert_axis(Axis(1));
    let posterior = x + gain_t.t().dot(&innovations);

    let members = prior.members
      .par_iter()
      .zip(posterior.axis_iter(Axis(1)).into_par_iter())
      .map(|(m, column)| devectorize(&prior.state_keys, m, column))
      .collect::<Result<Vec<_>>>()?;

    let innovation_norm = (&y_obs - &y_mean).mapv(|v| v * v).sum().sqrt();
    let seconds = start.elapsed().as_secs_f64();
    debug!(members = prior.len(),
           state = posterior.nrows(),
           observations = y_obs.len(),
           innovation_norm,
           seconds,
           "enkf analysis");
    if let Some(log) = log {
      log.insert("enkf_seconds".into(), Value::Scalar(seconds));
      log.insert("innovation_norm".into(), Value::Scalar(innovation_norm));
    }

    Ok(prior.derive(members))
  }
}
