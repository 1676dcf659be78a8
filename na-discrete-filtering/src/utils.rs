use nd::parallel::prelude::*;
use nd::{s, Array2, ArrayView2, Axis};
use num_traits::Float;

use na_core::{Error, Result};

/// Returns the upper triangular factor, R, of A = R^T R.
///
/// Only the upper triangle of `a` is read.
pub fn cholesky<E>(a: ArrayView2<E>) -> Result<Array2<E>>
  where E: Float,
{
  let (m, n) = a.dim();
  if m != n {
    return Err(Error::Numeric(format!("cholesky of a non-square {}x{} matrix", m, n)));
  }

  let mut r = a.to_owned();
  for k in 0..m {
    let pivot = r[[k, k]];
    if !(pivot > E::zero()) {
      return Err(Error::Numeric(format!("matrix isn't positive definite (pivot {})", k)));
    }

    for j in k + 1..m {
      let factor = r[[k, j]] / pivot;
      for i in j..m {
        let t = r[[k, i]] * factor;
        r[[j, i]] = r[[j, i]] - t;
      }
    }

    let t = pivot.sqrt().recip();
    r.row_mut(k)
      .slice_mut(s![k..])
      .mapv_inplace(|v| v * t);
  }

  for k in 1..m {
    r.row_mut(k)
      .slice_mut(s![..k])
      .fill(E::zero());
  }

  Ok(r)
}

/// Solves A X = B given A's factor from `cholesky`. Columns of B are solved
/// in parallel.
pub fn cholesky_solve<E>(r: ArrayView2<E>, b: ArrayView2<E>) -> Result<Array2<E>>
  where E: Float + Send + Sync,
{
  let m = r.nrows();
  if r.ncols() != m || b.nrows() != m {
    return Err(Error::Shape {
      consumed: m,
      provided: b.nrows(),
    });
  }

  let mut x = b.to_owned();
  x.axis_iter_mut(Axis(1))
    .into_par_iter()
    .for_each(|mut col| {
      // R^T y = b
      for i in 0..m {
        let mut acc = col[i];
        for k in 0..i {
          acc = acc - r[[k, i]] * col[k];
        }
        col[i] = acc / r[[i, i]];
      }
      // R x = y
      for i in (0..m).rev() {
        let mut acc = col[i];
        for k in i + 1..m {
          acc = acc - r[[i, k]] * col[k];
        }
        col[i] = acc / r[[i, i]];
      }
    });

  Ok(x)
}

/// Symmetric positive definite solve.
pub fn spd_solve<E>(a: ArrayView2<E>, b: ArrayView2<E>) -> Result<Array2<E>>
  where E: Float + Send + Sync,
{
  let r = cholesky(a)?;
  cholesky_solve(r.view(), b)
}
