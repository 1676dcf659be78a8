//! Observation operators with reproducible Gaussian noise.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_isaac::Isaac64Rng;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::member::Member;
use crate::operator::{NoisyOperator, Operator};
use crate::vectorize::{flatten, unflatten};

pub const NOISY_SUFFIX: &str = "_noisy";

/// Noise standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Noise {
  Uniform(f64),
  /// Per output key; every key the inner operator produces needs an entry.
  PerKey(BTreeMap<String, f64>),
}

impl Noise {
  pub fn std_for(&self, key: &str) -> Result<f64> {
    match *self {
      Noise::Uniform(std) => Ok(std),
      Noise::PerKey(ref m) => m.get(key)
        .cloned()
        .ok_or_else(|| Error::UnknownKey(key.to_owned())),
    }
  }
}

impl From<f64> for Noise {
  fn from(v: f64) -> Noise { Noise::Uniform(v) }
}

/// Wraps an observation operator and perturbs each of its output fields
/// with i.i.d. Gaussian noise.
///
/// Unless `only_noisy` is set, the output holds the clean value under the
/// original key and the perturbed one under `<key>_noisy`.
pub struct NoisyObserver<O> {
  op: O,
  noise: Noise,
  seed: u64,
  only_noisy: bool,
  rng: Mutex<Isaac64Rng>,
}

impl<O> NoisyObserver<O> {
  /// A `seed` of 0 picks a fresh random seed.
  pub fn new<N>(op: O, noise: N, seed: u64, only_noisy: bool) -> NoisyObserver<O>
    where N: Into<Noise>,
  {
    let seed = if seed == 0 {
      fresh_seed()
    } else {
      seed
    };
    debug!(seed, only_noisy, "seeding noisy observer");

    NoisyObserver {
      op,
      noise: noise.into(),
      seed,
      only_noisy,
      rng: Mutex::new(Isaac64Rng::seed_from_u64(seed)),
    }
  }

  pub fn seed(&self) -> u64 { self.seed }
  pub fn only_noisy(&self) -> bool { self.only_noisy }
  pub fn noise(&self) -> &Noise { &self.noise }
  pub fn inner(&self) -> &O { &self.op }

  /// Reseeds the private stream to `seed ^ modifier`; the base seed is
  /// kept, so reseeding twice with the same modifier restarts the stream.
  pub fn xor_seed(&mut self, modifier: u64) {
    *self.rng.get_mut() = Isaac64Rng::seed_from_u64(self.seed ^ modifier);
  }

  /// `({key: clean}, {key: noisy})` for every `key` of `member` that has a
  /// `<key>_noisy` companion.
  pub fn split_member(&self, member: &Member) -> Result<(Member, Member)> {
    if self.only_noisy {
      return Err(Error::operator("observer keeps only noisy values, there is no clean part to split"));
    }

    let mut clean = Member::new();
    let mut noisy = Member::new();
    for (key, value) in member.iter() {
      if key.ends_with(NOISY_SUFFIX) {
        continue;
      }
      if let Some(n) = member.get(&format!("{}{}", key, NOISY_SUFFIX)) {
        clean.insert(key.clone(), value.clone());
        noisy.insert(key.clone(), n.clone());
      }
    }
    Ok((clean, noisy))
  }

  /// A reseeded copy; our own stream is left where it is.
  pub fn fork(&self, modifier: u64) -> NoisyObserver<O>
    where O: Clone,
  {
    let mut forked = self.clone();
    forked.xor_seed(modifier);
    forked
  }
}

fn fresh_seed() -> u64 {
  loop {
    let s: u64 = rand::random();
    if s != 0 {
      return s;
    }
  }
}

impl<O> Clone for NoisyObserver<O>
  where O: Clone,
{
  fn clone(&self) -> Self {
    NoisyObserver {
      op: self.op.clone(),
      noise: self.noise.clone(),
      seed: self.seed,
      only_noisy: self.only_noisy,
      rng: Mutex::new(self.rng.lock().clone()),
    }
  }
}

impl<O> fmt::Debug for NoisyObserver<O>
  where O: fmt::Debug,
{
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("NoisyObserver")
      .field("op", &self.op)
      .field("noise", &self.noise)
      .field("seed", &self.seed)
      .field("only_noisy", &self.only_noisy)
      .finish()
  }
}

impl<O, A> Operator<A> for NoisyObserver<O>
  where O: Operator<A> + Clone,
        A: ?Sized,
{
  fn apply(&self, member: &Member, args: &A) -> Result<Member> {
    let clean = self.op.apply(member, args)?;

    let mut out = Member::new();
    let mut rng = self.rng.lock();
    for (key, value) in clean {
      let std = self.noise.std_for(&key)?;
      let mut values = flatten(&key, &value)?;
      for v in values.iter_mut() {
        let z: f64 = rng.sample(StandardNormal);
        *v += std * z;
      }
      let noisy = unflatten(&key, &value, &values)?;

      if self.only_noisy {
        out.insert(key, noisy);
      } else {
        out.insert(format!("{}{}", key, NOISY_SUFFIX), noisy);
        out.insert(key, value);
      }
    }
    Ok(out)
  }

  fn as_noisy(&self) -> Option<&dyn NoisyOperator<A>> { Some(self) }
}

impl<O, A> NoisyOperator<A> for NoisyObserver<O>
  where O: Operator<A> + Clone,
        A: ?Sized,
{
  fn xor_seed(&mut self, modifier: u64) { NoisyObserver::xor_seed(self, modifier) }

  fn split_member(&self, member: &Member) -> Result<(Member, Member)> {
    NoisyObserver::split_member(self, member)
  }

  fn fork<'a>(&'a self, modifier: u64) -> Box<dyn NoisyOperator<A> + 'a> {
    Box::new(NoisyObserver::fork(self, modifier))
  }
}
