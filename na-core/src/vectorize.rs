//! Conversion between member fields and flat numeric vectors.
//!
//! Fields are concatenated in `state_keys` order. Within a field, arrays are
//! flattened row-major, lists element by element, and nested maps over their
//! own (sorted) keys. `Text` leaves can't be vectorized.

use nd::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use std::slice;

use crate::ensemble::Ensemble;
use crate::error::{Error, Result};
use crate::member::{Member, Value};

/// Number of scalars `value` flattens to.
pub fn field_len(key: &str, value: &Value) -> Result<usize> {
  match *value {
    Value::Scalar(_) => Ok(1),
    Value::Array(ref a) => Ok(a.len()),
    Value::List(ref l) => {
      l.iter().try_fold(0, |acc, v| Ok(acc + field_len(key, v)?))
    },
    Value::Map(ref m) => {
      m.iter().try_fold(0, |acc, (_, v)| Ok(acc + field_len(key, v)?))
    },
    Value::Text(_) => Err(unsupported(key, value)),
  }
}

fn unsupported(key: &str, value: &Value) -> Error {
  Error::UnsupportedLeaf {
    key: key.to_owned(),
    kind: value.kind(),
  }
}

fn flatten_into(key: &str, value: &Value, out: &mut Vec<f64>) -> Result<()> {
  match *value {
    Value::Scalar(v) => out.push(v),
    Value::Array(ref a) => out.extend(a.iter().cloned()),
    Value::List(ref l) => {
      for v in l.iter() {
        flatten_into(key, v, out)?;
      }
    },
    Value::Map(ref m) => {
      for (_, v) in m.iter() {
        flatten_into(key, v, out)?;
      }
    },
    Value::Text(_) => return Err(unsupported(key, value)),
  }
  Ok(())
}

/// Flattens a single field.
pub fn flatten(key: &str, value: &Value) -> Result<Vec<f64>> {
  let mut out = Vec::new();
  flatten_into(key, value, &mut out)?;
  Ok(out)
}

/// Writes values back into `value`'s existing containers. The caller has
/// already checked `it` holds enough values.
fn fill(value: &mut Value, it: &mut slice::Iter<f64>) {
  match *value {
    Value::Scalar(ref mut v) => {
      if let Some(&next) = it.next() {
        *v = next;
      }
    },
    Value::Array(ref mut a) => {
      for (dst, &src) in a.iter_mut().zip(it) {
        *dst = src;
      }
    },
    Value::List(ref mut l) => {
      for v in l.iter_mut() {
        fill(v, it);
      }
    },
    Value::Map(ref mut m) => {
      let keys: Vec<String> = m.keys().cloned().collect();
      for k in keys {
        if let Some(v) = m.get_mut(&k) {
          fill(v, it);
        }
      }
    },
    Value::Text(_) => {},
  }
}

/// A copy of `template` holding `values`, which must be exactly as long as
/// the template's flattening.
pub fn unflatten(key: &str, template: &Value, values: &[f64]) -> Result<Value> {
  let consumed = field_len(key, template)?;
  if consumed != values.len() {
    return Err(Error::Shape {
      consumed,
      provided: values.len(),
    });
  }
  let mut out = template.clone();
  fill(&mut out, &mut values.iter());
  Ok(out)
}

fn field<'a>(member: &'a Member, key: &str) -> Result<&'a Value> {
  member.get(key)
    .ok_or_else(|| Error::MissingField(key.to_owned()))
}

/// Total number of scalars the `state_keys` fields of `member` hold.
pub fn vector_len(state_keys: &[String], member: &Member) -> Result<usize> {
  state_keys
    .iter()
    .try_fold(0, |acc, key| Ok(acc + field_len(key, field(member, key)?)?))
}

pub fn vectorize(state_keys: &[String], member: &Member) -> Result<Array1<f64>> {
  let mut out = Vec::new();
  for key in state_keys.iter() {
    flatten_into(key, field(member, key)?, &mut out)?;
  }
  Ok(Array1::from(out))
}

/// Distributes `vector` over the `state_keys` fields of `member`, in place.
/// `member` is left untouched if the lengths don't line up.
pub fn devectorize_into(state_keys: &[String], member: &mut Member,
                        vector: ArrayView1<f64>) -> Result<()> {
  let consumed = vector_len(state_keys, member)?;
  if consumed != vector.len() {
    return Err(Error::Shape {
      consumed,
      provided: vector.len(),
    });
  }

  let values = vector.to_vec();
  let mut it = values.iter();
  for key in state_keys.iter() {
    if let Some(v) = member.get_mut(key) {
      fill(v, &mut it);
    }
  }
  debug_assert!(it.next().is_none());
  Ok(())
}

pub fn devectorize(state_keys: &[String], member: &Member,
                   vector: ArrayView1<f64>) -> Result<Member> {
  let mut out = member.clone();
  devectorize_into(state_keys, &mut out, vector)?;
  Ok(out)
}

fn at_member(e: Error, index: usize) -> Error {
  match e {
    Error::MissingField(key) => Error::MissingKey { index, key },
    e => e,
  }
}

/// One column per member.
pub fn to_matrix(state_keys: &[String], members: &[Member]) -> Result<Array2<f64>> {
  let columns = members
    .iter()
    .enumerate()
    .map(|(i, m)| vectorize(state_keys, m).map_err(|e| at_member(e, i)))
    .collect::<Result<Vec<_>>>()?;

  let rows = columns.first().map(|c| c.len()).unwrap_or(0);
  let mut out = Array2::zeros((rows, columns.len()));
  for (index, (column, mut dst)) in columns
    .iter()
    .zip(out.axis_iter_mut(Axis(1)))
    .enumerate()
  {
    if column.len() != rows {
      return Err(Error::RaggedMembers {
        index,
        expected: rows,
        found: column.len(),
      });
    }
    dst.assign(column);
  }

  Ok(out)
}

/// Builds one member per column by devectorizing into copies of the
/// ensemble's first member.
pub fn from_matrix(ensemble: &Ensemble, matrix: ArrayView2<f64>) -> Result<Vec<Member>> {
  if matrix.ncols() == 0 {
    return Ok(vec![]);
  }
  let template = ensemble.members.first().ok_or(Error::EmptyEnsemble)?;
  matrix
    .axis_iter(Axis(1))
    .map(|column| devectorize(&ensemble.state_keys, template, column))
    .collect()
}
