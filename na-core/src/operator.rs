//! Per-member transforms and how they're lifted over an ensemble.

use nd::{Array1, ArrayView1, ArrayViewMut1};

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ensemble::{default_state_keys, Ensemble};
use crate::error::{Error, Result};
use crate::member::Member;
use crate::vectorize::{devectorize, vectorize};

/// A transform of one member. `A` carries whatever extra arguments the
/// operator needs (a time span for transition models, usually).
///
/// Implementations must not share mutable state across calls unless they
/// are noisy operators, which are reseeded per worker instead.
pub trait Operator<A: ?Sized = ()>: Send + Sync {
  fn apply(&self, member: &Member, args: &A) -> Result<Member>;

  fn as_noisy(&self) -> Option<&dyn NoisyOperator<A>> { None }
}

/// An operator whose output carries both clean and noise-perturbed values.
pub trait NoisyOperator<A: ?Sized = ()>: Operator<A> {
  /// Reseeds the private stream from `base seed ^ modifier`.
  fn xor_seed(&mut self, modifier: u64);

  /// Splits one of our own outputs into its `(clean, noisy)` parts.
  fn split_member(&self, member: &Member) -> Result<(Member, Member)>;

  /// A copy with an independent, reproducible stream for a single worker.
  fn fork<'a>(&'a self, modifier: u64) -> Box<dyn NoisyOperator<A> + 'a>;
}

impl<'b, A, O> Operator<A> for &'b O
  where A: ?Sized,
        O: Operator<A> + ?Sized,
{
  fn apply(&self, member: &Member, args: &A) -> Result<Member> {
    (**self).apply(member, args)
  }
  fn as_noisy(&self) -> Option<&dyn NoisyOperator<A>> { (**self).as_noisy() }
}

impl<A, O> Operator<A> for Box<O>
  where A: ?Sized,
        O: Operator<A> + ?Sized,
{
  fn apply(&self, member: &Member, args: &A) -> Result<Member> {
    (**self).apply(member, args)
  }
  fn as_noisy(&self) -> Option<&dyn NoisyOperator<A>> { (**self).as_noisy() }
}

/// Lifts a closure into an `Operator`.
#[derive(Debug, Clone, Copy)]
pub struct FnOperator<F>(pub F);

impl<F> From<F> for FnOperator<F> {
  fn from(f: F) -> FnOperator<F> { FnOperator(f) }
}

impl<F, A> Operator<A> for FnOperator<F>
  where A: ?Sized,
        F: Fn(&Member, &A) -> Result<Member> + Send + Sync,
{
  fn apply(&self, member: &Member, args: &A) -> Result<Member> {
    (self.0)(member, args)
  }
}

/// A leaf model working on raw state vectors, e.g. an ODE integrator.
pub trait Model: Send + Sync {
  /// Advances `state` from `t0` to `t`, writing into `out`.
  fn run_model(&self, t0: f64, t: f64,
               state: ArrayView1<f64>,
               out: ArrayViewMut1<f64>) -> Result<()>;
}

/// Counts how many times the wrapped model has been run.
#[derive(Debug, Default)]
pub struct ModelStats<M> {
  pub model: M,
  calls: AtomicU64,
}
impl<M> ModelStats<M> {
  pub fn calls(&self) -> u64 { self.calls.load(Ordering::Relaxed) }
}
impl<M> From<M> for ModelStats<M> {
  fn from(v: M) -> ModelStats<M> {
    ModelStats {
      model: v,
      calls: AtomicU64::new(0),
    }
  }
}
impl<M> Model for ModelStats<M>
  where M: Model,
{
  fn run_model(&self, t0: f64, t: f64,
               state: ArrayView1<f64>,
               out: ArrayViewMut1<f64>) -> Result<()> {
    self.calls.fetch_add(1, Ordering::Relaxed);
    self.model.run_model(t0, t, state, out)
  }
}

/// Runs a `Model` on the vectorized `state_keys` of each member.
/// Args are the `(t0, t)` span.
#[derive(Debug, Clone)]
pub struct ModelOperator<M> {
  pub model: M,
  pub state_keys: Vec<String>,
}

impl<M> ModelOperator<M>
  where M: Model,
{
  pub fn new(model: M, state_keys: Vec<String>) -> ModelOperator<M> {
    ModelOperator {
      model,
      state_keys,
    }
  }

  pub fn apply_raw(&self, state: ArrayView1<f64>, span: (f64, f64)) -> Result<Array1<f64>> {
    let mut out = Array1::zeros(state.len());
    self.model.run_model(span.0, span.1, state, out.view_mut())?;
    Ok(out)
  }
}

impl<M> Operator<(f64, f64)> for ModelOperator<M>
  where M: Model,
{
  fn apply(&self, member: &Member, span: &(f64, f64)) -> Result<Member> {
    let state = vectorize(&self.state_keys, member)?;
    let next = self.apply_raw(state.view(), *span)?;
    devectorize(&self.state_keys, member, next.view())
  }
}

/// Maps `op` over every member, in order. `ensemble` isn't touched.
pub fn apply<O, A>(op: &O, ensemble: &Ensemble, args: &A) -> Result<Ensemble>
  where O: Operator<A> + ?Sized,
        A: ?Sized,
{
  let members = ensemble.members
    .iter()
    .map(|m| op.apply(m, args))
    .collect::<Result<Vec<_>>>()?;
  Ok(ensemble.derive(members))
}

/// Merges the output of `op` into each member. Every output is computed
/// before anything is written, so a failure leaves `ensemble` unchanged.
pub fn apply_in_place<'e, O, A>(op: &O, ensemble: &'e mut Ensemble,
                                args: &A) -> Result<&'e mut Ensemble>
  where O: Operator<A> + ?Sized,
        A: ?Sized,
{
  let outputs = ensemble.members
    .iter()
    .map(|m| op.apply(m, args))
    .collect::<Result<Vec<_>>>()?;
  for (member, out) in ensemble.members.iter_mut().zip(outputs) {
    member.merge(out);
  }
  Ok(ensemble)
}

/// `(clean, noisy)` views of an ensemble of `op`'s outputs. Plain operators
/// have no noise to split, so both halves are the input.
pub fn split_clean_noisy<O, A>(op: &O, observations: &Ensemble) -> Result<(Ensemble, Ensemble)>
  where O: Operator<A> + ?Sized,
        A: ?Sized,
{
  let noisy_op = match op.as_noisy() {
    Some(n) => n,
    None => return Ok((observations.clone(), observations.clone())),
  };

  let (clean, noisy): (Vec<_>, Vec<_>) = observations.members
    .iter()
    .map(|m| noisy_op.split_member(m))
    .collect::<Result<Vec<_>>>()?
    .into_iter()
    .unzip();

  let clean = Ensemble {
    state_keys: default_state_keys(&clean),
    members: clean,
    monolithic_storage: observations.monolithic_storage,
  };
  let noisy = Ensemble {
    state_keys: default_state_keys(&noisy),
    members: noisy,
    monolithic_storage: observations.monolithic_storage,
  };
  Ok((clean, noisy))
}

/// Common failure for models reporting a non-finite result.
pub fn check_finite(out: ArrayView1<f64>) -> Result<()> {
  if out.iter().all(|v| v.is_finite()) {
    Ok(())
  } else {
    Err(Error::Numeric("model produced a non-finite state".into()))
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::member::Value;
  use nd::arr1;

  fn state_ensemble(xs: &[f64]) -> Ensemble {
    let members = xs.iter()
      .map(|&x| Member::new().with("state", vec![x]))
      .collect();
    Ensemble::new(members, None).unwrap()
  }

  fn double() -> FnOperator<impl Fn(&Member, &()) -> Result<Member> + Send + Sync> {
    FnOperator(|m: &Member, _: &()| -> Result<Member> {
      let x = vectorize(&["state".to_owned()], m)?;
      Ok(Member::new().with("state", x.mapv(|v| 2.0 * v)))
    })
  }

  #[test]
  fn apply_doubles_without_touching_input() {
    let e = state_ensemble(&[0.7, 0.5, 0.3]);
    let out = apply(&double(), &e, &()).unwrap();

    let got: Vec<f64> = out.iter()
      .map(|m| vectorize(&out.state_keys, m).unwrap()[0])
      .collect();
    assert_eq!(got, vec![1.4, 1.0, 0.6]);
    assert_eq!(out.state_keys, e.state_keys);
    assert_eq!(e, state_ensemble(&[0.7, 0.5, 0.3]));
  }

  #[test]
  fn apply_in_place_merges_outputs() {
    let mut e = state_ensemble(&[1.0, 2.0]);
    for m in e.members.iter_mut() {
      m.insert("keep", 9.0);
    }
    let op = FnOperator(|m: &Member, _: &()| -> Result<Member> {
      let x = vectorize(&["state".to_owned()], m)?[0];
      Ok(Member::new().with("state", -x).with("obs", x * x))
    });
    apply_in_place(&op, &mut e, &()).unwrap();

    assert_eq!(e[1].get("state"), Some(&Value::Scalar(-2.0)));
    assert_eq!(e[1].get("obs"), Some(&Value::Scalar(4.0)));
    assert_eq!(e[1].get("keep"), Some(&Value::Scalar(9.0)));
    assert_eq!(e.state_keys, vec!["state"]);
  }

  #[test]
  fn apply_in_place_is_all_or_nothing() {
    let mut e = state_ensemble(&[1.0, 2.0, 3.0]);
    let before = e.clone();
    let op = FnOperator(|m: &Member, _: &()| -> Result<Member> {
      let x = vectorize(&["state".to_owned()], m)?[0];
      if x > 2.5 {
        Err(Error::operator("too big"))
      } else {
        Ok(Member::new().with("state", 0.0))
      }
    });
    assert!(apply_in_place(&op, &mut e, &()).is_err());
    assert_eq!(e, before);
  }

  #[test]
  fn plain_split_is_identity() {
    let e = state_ensemble(&[1.0, 2.0]);
    let (clean, noisy) = split_clean_noisy::<_, ()>(&double(), &e).unwrap();
    assert_eq!(clean, e);
    assert_eq!(noisy, e);
  }

  struct Decay;
  impl Model for Decay {
    fn run_model(&self, t0: f64, t: f64, state: ArrayView1<f64>,
                 mut out: ArrayViewMut1<f64>) -> Result<()> {
      out.assign(&state.mapv(|v| v * (t0 - t).exp()));
      check_finite(out.view())
    }
  }

  #[test]
  fn model_operator_round_trips_through_vectors() {
    let op = ModelOperator::new(Decay, vec!["state".into()]);
    let m = Member::new()
      .with("state", vec![1.0, 2.0])
      .with("t", 0.0);
    let out = op.apply(&m, &(0.0, 0.0)).unwrap();
    assert_eq!(out, m);

    let raw = op.apply_raw(arr1(&[1.0]).view(), (1.0, 1.0)).unwrap();
    assert_eq!(raw, arr1(&[1.0]));
  }

  #[test]
  fn model_stats_counts_runs() {
    let op = ModelOperator::new(ModelStats::from(Decay), vec!["state".into()]);
    let e = state_ensemble(&[1.0, 2.0, 3.0]);
    apply(&op, &e, &(0.0, 1.0)).unwrap();
    assert_eq!(op.model.calls(), 3);
  }
}
