use nd::{Array1, Array2, ArrayView2, Axis};

use na_core::{Error, Result};

pub mod enkf;

/// Row means of `m` and its columns' deviations from them, scaled by
/// `1/sqrt(N - 1)` so that `A A^T` is the sample covariance.
pub fn anomalies(m: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
  let n = m.ncols();
  if n < 2 {
    return Err(Error::Numeric(format!("need at least two members for a covariance, got {}", n)));
  }

  let mean = m.mean_axis(Axis(1)).ok_or(Error::EmptyEnsemble)?;
  let mut a = &m - &mean.view().insert_axis(Axis(1));
  a *= ((n - 1) as f64).sqrt().recip();
  Ok((mean, a))
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::arr2;

  #[test]
  fn anomalies_give_the_sample_covariance() {
    let m = arr2(&[[1.0, 3.0, 5.0], [0.0, 0.0, 3.0]]);
    let (mean, a) = anomalies(m.view()).unwrap();

    assert_eq!(mean.to_vec(), vec![3.0, 1.0]);
    let c = a.dot(&a.t());
    assert!((c[[0, 0]] - 4.0).abs() < 1e-12);
    assert!((c[[1, 1]] - 3.0).abs() < 1e-12);
    assert!((c[[0, 1]] - 3.0).abs() < 1e-12);
  }

  #[test]
  fn one_member_has_no_covariance() {
    let m = arr2(&[[1.0], [2.0]]);
    assert!(matches!(anomalies(m.view()), Err(Error::Numeric(_))));
  }
}
