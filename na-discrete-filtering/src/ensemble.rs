//! Common stuffs for ensembles

use rand::Rng;
use rand_distr::StandardNormal;

use na_core::vectorize::{field_len, flatten, unflatten};
use na_core::{Ensemble, Member, Noise, Result};

/// `n` members scattered around `mean` with i.i.d. Gaussian perturbations
/// of every state field. Fields outside `state_keys` (default: every
/// numeric field of `mean`) are copied as is.
pub fn gaussian_ensemble<N, R>(mean: &Member, std: N, n: usize,
                               state_keys: Option<Vec<String>>,
                               rng: &mut R) -> Result<Ensemble>
  where N: Into<Noise>,
        R: Rng,
{
  let std = std.into();
  let state_keys = match state_keys {
    Some(keys) => keys,
    None => mean.iter()
      .filter(|&(k, v)| field_len(k, v).is_ok())
      .map(|(k, _)| k.clone())
      .collect(),
  };

  let mut members = Vec::with_capacity(n);
  for _ in 0..n {
    let mut member = mean.clone();
    for key in state_keys.iter() {
      let sigma = std.std_for(key)?;
      let template = match mean.get(key) {
        Some(v) => v,
        None => continue,
      };
      let mut values = flatten(key, template)?;
      for v in values.iter_mut() {
        let z: f64 = rng.sample(StandardNormal);
        *v += sigma * z;
      }
      member.insert(key.clone(), unflatten(key, template, &values)?);
    }
    members.push(member);
  }

  debug!(members = n, keys = state_keys.len(), "initialized gaussian ensemble");
  Ensemble::new(members, Some(state_keys))
}

#[cfg(test)]
mod test {
  use super::*;
  use na_core::stats::moments;
  use na_core::{Error, Value};
  use rand::SeedableRng;
  use rand_isaac::Isaac64Rng;
  use std::collections::BTreeMap;

  fn mean() -> Member {
    Member::new()
      .with("x", 1.0)
      .with("v", vec![-5.0, 5.0])
      .with("name", "l63")
  }

  #[test]
  fn spread_matches_std() {
    let mut rng = Isaac64Rng::seed_from_u64(42);
    let e = gaussian_ensemble(&mean(), 0.5,
                              4000, Some(vec!["x".into(), "v".into()]),
                              &mut rng)
      .unwrap();
    assert_eq!(e.len(), 4000);
    assert_eq!(e[17].get("name"), Some(&Value::from("l63")));

    let m = moments(&e, None).unwrap();
    let x_mean = m.mean.get("x").and_then(Value::as_scalar).unwrap();
    let x_std = m.std.get("x").and_then(Value::as_scalar).unwrap();
    assert!((x_mean - 1.0).abs() < 0.05, "mean {}", x_mean);
    assert!((x_std - 0.5).abs() < 0.05, "std {}", x_std);
  }

  #[test]
  fn same_seed_same_ensemble() {
    let keys = Some(vec!["x".to_owned()]);
    let a = gaussian_ensemble(&mean(), 1.0, 5, keys.clone(),
                              &mut Isaac64Rng::seed_from_u64(3)).unwrap();
    let b = gaussian_ensemble(&mean(), 1.0, 5, keys,
                              &mut Isaac64Rng::seed_from_u64(3)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a[0].get("v"), mean().get("v"));
  }

  #[test]
  fn default_keys_skip_text() {
    let e = gaussian_ensemble(&mean(), 1.0, 2, None, &mut Isaac64Rng::seed_from_u64(9)).unwrap();
    assert_eq!(e.state_keys, vec!["v", "x"]);
    assert_ne!(e[1].get("x"), mean().get("x"));
  }

  #[test]
  fn per_key_noise_needs_every_key() {
    let mut std = BTreeMap::new();
    std.insert("x".to_owned(), 0.1);
    let r = gaussian_ensemble(&mean(), Noise::PerKey(std), 2,
                              Some(vec!["x".into(), "v".into()]),
                              &mut Isaac64Rng::seed_from_u64(1));
    assert!(matches!(r, Err(Error::UnknownKey(ref k)) if k == "v"));
  }
}
