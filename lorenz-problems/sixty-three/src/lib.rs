extern crate na_core;
extern crate ndarray as nd;
extern crate serde;

use nd::{ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use na_core::operator::check_finite;
use na_core::{vectorize, Error, Member, Model, Operator, Result};

pub const STATE_KEY: &str = "state";
pub const OBSERVATION_KEY: &str = "obs";

/// The Lorenz '63 system, integrated with fixed-step RK4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L63Model {
  pub rho: f64,
  pub sigma: f64,
  pub beta: f64,
  /// Largest RK4 step; spans are split into equal steps no longer than this.
  pub dt: f64,
}
impl Default for L63Model {
  fn default() -> Self {
    L63Model {
      rho: 28.0,
      sigma: 10.0,
      beta: 8.0 / 3.0,
      dt: 0.01,
    }
  }
}

impl L63Model {
  pub fn derivative(&self, y: &[f64; 3]) -> [f64; 3] {
    [
      self.sigma * (y[1] - y[0]),
      y[0] * (self.rho - y[2]) - y[1],
      y[0] * y[1] - self.beta * y[2],
    ]
  }

  fn rk4_step(&self, h: f64, y: &mut [f64; 3]) {
    let offset = |y: &[f64; 3], k: &[f64; 3], s: f64| {
      [y[0] + s * k[0], y[1] + s * k[1], y[2] + s * k[2]]
    };

    let k1 = self.derivative(y);
    let k2 = self.derivative(&offset(y, &k1, h / 2.0));
    let k3 = self.derivative(&offset(y, &k2, h / 2.0));
    let k4 = self.derivative(&offset(y, &k3, h));
    for i in 0..3 {
      y[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
  }
}

impl Model for L63Model {
  fn run_model(&self, t0: f64, t: f64,
               state: ArrayView1<f64>,
               mut out: ArrayViewMut1<f64>) -> Result<()> {
    if state.len() != 3 || out.len() != 3 {
      return Err(Error::Shape {
        consumed: 3,
        provided: state.len(),
      });
    }

    let mut y = [state[0], state[1], state[2]];
    let span = t - t0;
    if span != 0.0 {
      let steps = (span.abs() / self.dt).ceil().max(1.0);
      let h = span / steps;
      for _ in 0..steps as usize {
        self.rk4_step(h, &mut y);
      }
    }

    for (o, v) in out.iter_mut().zip(y.iter()) {
      *o = *v;
    }
    check_finite(out.view())
  }
}

/// Observes a subset of the state's components under `obs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L63Observer {
  pub components: Vec<usize>,
}
impl Default for L63Observer {
  fn default() -> Self {
    L63Observer {
      components: vec![0, 1],
    }
  }
}

impl Operator for L63Observer {
  fn apply(&self, member: &Member, _: &()) -> Result<Member> {
    let state = vectorize(&[STATE_KEY.to_owned()], member)?;
    let obs = self.components
      .iter()
      .map(|&i| {
        state.get(i).cloned().ok_or(Error::Shape {
          consumed: i + 1,
          provided: state.len(),
        })
      })
      .collect::<Result<Vec<f64>>>()?;
    Ok(Member::new().with(OBSERVATION_KEY, obs))
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use na_core::{apply, ModelOperator, ModelStats, Value};
  use nd::{arr1, Array1};

  fn run(model: &L63Model, y: [f64; 3], t: f64) -> Array1<f64> {
    let mut out = Array1::zeros(3);
    model.run_model(0.0, t, arr1(&y).view(), out.view_mut()).unwrap();
    out
  }

  #[test]
  fn fixed_points_stay_put() {
    let m = L63Model::default();
    assert_eq!(run(&m, [0.0; 3], 1.0), arr1(&[0.0; 3]));

    let c = (m.beta * (m.rho - 1.0)).sqrt();
    let out = run(&m, [c, c, m.rho - 1.0], 0.5);
    for (o, e) in out.iter().zip(&[c, c, m.rho - 1.0]) {
      assert!((o - e).abs() < 1e-9, "{} vs {}", o, e);
    }
  }

  #[test]
  fn rk4_converges_with_smaller_steps() {
    let coarse = L63Model::default();
    let fine = L63Model { dt: 0.001, ..L63Model::default() };
    let a = run(&coarse, [1.0, 1.0, 1.0], 0.1);
    let b = run(&fine, [1.0, 1.0, 1.0], 0.1);
    let err = (&a - &b).mapv(f64::abs).fold(0.0f64, |acc, &v| acc.max(v));
    assert!(err < 1e-4, "{}", err);
    assert_ne!(a, arr1(&[1.0, 1.0, 1.0]));
  }

  #[test]
  fn zero_span_copies() {
    let m = L63Model::default();
    assert_eq!(run(&m, [1.0, 2.0, 3.0], 0.0), arr1(&[1.0, 2.0, 3.0]));
  }

  #[test]
  fn wrong_dimension() {
    let mut out = Array1::zeros(2);
    let r = L63Model::default().run_model(0.0, 1.0, arr1(&[1.0, 2.0]).view(), out.view_mut());
    assert!(matches!(r, Err(Error::Shape { consumed: 3, provided: 2 })));
  }

  #[test]
  fn blow_up_is_reported() {
    let m = L63Model { dt: 10.0, ..L63Model::default() };
    let mut out = Array1::zeros(3);
    let r = m.run_model(0.0, 1e3, arr1(&[1e3, -1e3, 1e3]).view(), out.view_mut());
    assert!(matches!(r, Err(Error::Numeric(_))));
  }

  #[test]
  fn observer_picks_components() {
    let m = Member::new().with(STATE_KEY, vec![1.0, 2.0, 3.0]);
    let out = L63Observer { components: vec![2, 0] }.apply(&m, &()).unwrap();
    assert_eq!(out.get(OBSERVATION_KEY), Some(&Value::from(vec![3.0, 1.0])));

    let bad = L63Observer { components: vec![3] };
    assert!(bad.apply(&m, &()).is_err());
  }

  #[test]
  fn operator_runs_every_member() {
    let op = ModelOperator::new(ModelStats::from(L63Model::default()), vec![STATE_KEY.into()]);
    let members = (0..4)
      .map(|i| Member::new().with(STATE_KEY, vec![i as f64, 1.0, 1.0]))
      .collect();
    let e = na_core::Ensemble::new(members, None).unwrap();

    let out = apply(&op, &e, &(0.0, 0.05)).unwrap();
    assert_eq!(op.model.calls(), 4);
    assert_ne!(out[1], e[1]);
    assert_eq!(out.state_keys, e.state_keys);
  }
}
