//! Per-field ensemble statistics, shaped like a member.

use nd::{Array1, Axis};

use crate::ensemble::Ensemble;
use crate::error::{Error, Result};
use crate::member::Member;
use crate::vectorize::{devectorize, to_matrix};

#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
  pub mean: Member,
  /// Unbiased (N - 1); zero for single-member ensembles.
  pub var: Member,
  pub std: Member,
}

fn keys_or_state_keys<'a>(ensemble: &'a Ensemble, keys: Option<&'a [String]>) -> &'a [String] {
  keys.unwrap_or(&ensemble.state_keys[..])
}

/// Mean, variance and standard deviation of `keys` (default: the state
/// keys) across members.
pub fn moments(ensemble: &Ensemble, keys: Option<&[String]>) -> Result<Moments> {
  let keys = keys_or_state_keys(ensemble, keys);
  let template = ensemble.members.first().ok_or(Error::EmptyEnsemble)?;
  let template: Member = keys
    .iter()
    .filter_map(|k| template.get(k).map(|v| (k.clone(), v.clone())))
    .collect();

  let mat = to_matrix(keys, &ensemble.members)?;
  let n = mat.ncols();
  let mean: Array1<f64> = mat.mean_axis(Axis(1)).ok_or(Error::EmptyEnsemble)?;
  let ddof = if n > 1 { 1.0 } else { 0.0 };
  let var = mat.var_axis(Axis(1), ddof);
  let std = var.mapv(f64::sqrt);

  Ok(Moments {
    mean: devectorize(keys, &template, mean.view())?,
    var: devectorize(keys, &template, var.view())?,
    std: devectorize(keys, &template, std.view())?,
  })
}

pub fn mean(ensemble: &Ensemble, keys: Option<&[String]>) -> Result<Member> {
  moments(ensemble, keys).map(|m| m.mean)
}
pub fn var(ensemble: &Ensemble, keys: Option<&[String]>) -> Result<Member> {
  moments(ensemble, keys).map(|m| m.var)
}
pub fn std(ensemble: &Ensemble, keys: Option<&[String]>) -> Result<Member> {
  moments(ensemble, keys).map(|m| m.std)
}
