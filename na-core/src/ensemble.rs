//! The ensemble: ordered members plus the keys that take part in
//! vectorized math.

use serde::{Deserialize, Serialize};

use std::ops::Index;
use std::slice;

use crate::error::{Error, Result};
use crate::member::Member;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
  pub members: Vec<Member>,
  pub state_keys: Vec<String>,
  /// Persistence hint only: one file vs. one file per member.
  pub monolithic_storage: bool,
}

impl Ensemble {
  /// `state_keys` defaults to the (sorted) keys of the first member.
  pub fn new(members: Vec<Member>, state_keys: Option<Vec<String>>) -> Result<Ensemble> {
    let state_keys = match state_keys {
      Some(keys) => keys,
      None => default_state_keys(&members),
    };
    let e = Ensemble {
      members,
      state_keys,
      monolithic_storage: true,
    };
    e.check_state_keys()?;
    Ok(e)
  }

  pub fn with_monolithic_storage(mut self, monolithic: bool) -> Ensemble {
    self.monolithic_storage = monolithic;
    self
  }

  /// Same keys and storage flag, different members. Used by operators
  /// producing derived ensembles.
  pub fn derive(&self, members: Vec<Member>) -> Ensemble {
    Ensemble {
      members,
      state_keys: self.state_keys.clone(),
      monolithic_storage: self.monolithic_storage,
    }
  }

  /// Every member has to carry every state key.
  pub fn check_state_keys(&self) -> Result<()> {
    for (index, member) in self.members.iter().enumerate() {
      if let Some(key) = self.state_keys.iter().find(|k| !member.contains_key(k)) {
        return Err(Error::MissingKey {
          index,
          key: key.clone(),
        });
      }
    }
    Ok(())
  }

  pub fn len(&self) -> usize { self.members.len() }
  pub fn is_empty(&self) -> bool { self.members.is_empty() }
  pub fn iter(&self) -> slice::Iter<Member> { self.members.iter() }
  pub fn members(&self) -> &[Member] { &self.members[..] }
}

impl Index<usize> for Ensemble {
  type Output = Member;
  fn index(&self, i: usize) -> &Member { &self.members[i] }
}

impl<'a> IntoIterator for &'a Ensemble {
  type Item = &'a Member;
  type IntoIter = slice::Iter<'a, Member>;
  fn into_iter(self) -> Self::IntoIter { self.members.iter() }
}

pub fn default_state_keys(members: &[Member]) -> Vec<String> {
  members
    .first()
    .map(|m| m.keys().cloned().collect())
    .unwrap_or_default()
}

/// Member-wise union of two equally sized ensembles; `e1` wins on
/// overlapping keys.
pub fn merge(e: &Ensemble, e1: &Ensemble) -> Result<Ensemble> {
  if e.len() != e1.len() {
    return Err(Error::LengthMismatch {
      left: e.len(),
      right: e1.len(),
    });
  }

  let members = e.members
    .iter()
    .zip(e1.members.iter())
    .map(|(m, m1)| {
      let mut m = m.clone();
      m.merge(m1.clone());
      m
    })
    .collect();

  let mut state_keys = e.state_keys.clone();
  for key in e1.state_keys.iter() {
    if !state_keys.contains(key) {
      state_keys.push(key.clone());
    }
  }

  Ok(Ensemble {
    members,
    state_keys,
    monolithic_storage: e.monolithic_storage,
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::member::Value;

  fn member(pairs: &[(&str, f64)]) -> Member {
    pairs.iter()
      .map(|&(k, v)| (k.to_owned(), Value::Scalar(v)))
      .collect()
  }

  #[test]
  fn keys_default_to_first_member() {
    let e = Ensemble::new(vec![member(&[("y", 1.0), ("x", 2.0)]),
                               member(&[("x", 3.0), ("y", 4.0), ("z", 0.0)])],
                          None)
      .unwrap();
    assert_eq!(e.state_keys, vec!["x", "y"]);
    assert!(e.monolithic_storage);
  }

  #[test]
  fn missing_state_key_is_rejected() {
    let r = Ensemble::new(vec![member(&[("x", 1.0)]), member(&[("y", 1.0)])],
                          Some(vec!["x".into()]));
    match r {
      Err(Error::MissingKey { index: 1, ref key }) if key == "x" => {},
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn empty_ensemble_has_no_keys() {
    let e = Ensemble::new(vec![], None).unwrap();
    assert!(e.is_empty());
    assert!(e.state_keys.is_empty());
  }

  #[test]
  fn merge_unions_keys_with_right_winning() {
    let e = Ensemble::new(vec![member(&[("a", 1.0), ("b", 2.0)]),
                               member(&[("a", 3.0), ("b", 4.0)])],
                          None)
      .unwrap();
    let e1 = Ensemble::new(vec![member(&[("b", 20.0), ("c", 30.0)]),
                                member(&[("b", 40.0), ("c", 50.0)])],
                           None)
      .unwrap();

    let m = merge(&e, &e1).unwrap();
    assert_eq!(m.state_keys, vec!["a", "b", "c"]);
    assert_eq!(m[0], member(&[("a", 1.0), ("b", 20.0), ("c", 30.0)]));
    assert_eq!(m[1], member(&[("a", 3.0), ("b", 40.0), ("c", 50.0)]));
    // inputs untouched
    assert_eq!(e[0], member(&[("a", 1.0), ("b", 2.0)]));
  }

  #[test]
  fn merge_rejects_size_mismatch() {
    let e = Ensemble::new(vec![member(&[("a", 1.0)])], None).unwrap();
    let e1 = Ensemble::new(vec![], Some(vec![])).unwrap();
    assert!(matches!(merge(&e, &e1), Err(Error::LengthMismatch { left: 1, right: 0 })));
  }
}
