//! One candidate state: a record of named fields.

use nd::{Array1, ArrayD};
use serde::{Deserialize, Serialize};

use std::collections::btree_map::{self, BTreeMap};
use std::iter::FromIterator;

/// A member field. Everything except `Text` flattens to a run of `f64`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
  Scalar(f64),
  /// Any rank; flattened in row-major order.
  Array(ArrayD<f64>),
  /// Array of arrays, may be ragged.
  List(Vec<Value>),
  Map(Member),
  Text(String),
}

impl Value {
  pub fn kind(&self) -> &'static str {
    match *self {
      Value::Scalar(_) => "scalar",
      Value::Array(_) => "array",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Text(_) => "text",
    }
  }

  pub fn as_scalar(&self) -> Option<f64> {
    match *self {
      Value::Scalar(v) => Some(v),
      _ => None,
    }
  }
  pub fn as_array(&self) -> Option<&ArrayD<f64>> {
    match *self {
      Value::Array(ref a) => Some(a),
      _ => None,
    }
  }
  pub fn as_map(&self) -> Option<&Member> {
    match *self {
      Value::Map(ref m) => Some(m),
      _ => None,
    }
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Value { Value::Scalar(v) }
}
impl From<Vec<f64>> for Value {
  fn from(v: Vec<f64>) -> Value { Value::Array(Array1::from(v).into_dyn()) }
}
impl From<Array1<f64>> for Value {
  fn from(v: Array1<f64>) -> Value { Value::Array(v.into_dyn()) }
}
impl From<ArrayD<f64>> for Value {
  fn from(v: ArrayD<f64>) -> Value { Value::Array(v) }
}
impl From<Member> for Value {
  fn from(v: Member) -> Value { Value::Map(v) }
}
impl<'a> From<&'a str> for Value {
  fn from(v: &'a str) -> Value { Value::Text(v.to_owned()) }
}

/// Fields are kept sorted by name, so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Member {
  fields: BTreeMap<String, Value>,
}

impl Member {
  pub fn new() -> Member { Default::default() }

  pub fn get(&self, key: &str) -> Option<&Value> { self.fields.get(key) }
  pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> { self.fields.get_mut(key) }
  pub fn contains_key(&self, key: &str) -> bool { self.fields.contains_key(key) }

  pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<Value>
    where K: Into<String>,
          V: Into<Value>,
  {
    self.fields.insert(key.into(), value.into())
  }
  pub fn remove(&mut self, key: &str) -> Option<Value> { self.fields.remove(key) }

  pub fn keys(&self) -> impl Iterator<Item = &String> { self.fields.keys() }
  pub fn iter(&self) -> btree_map::Iter<String, Value> { self.fields.iter() }
  pub fn len(&self) -> usize { self.fields.len() }
  pub fn is_empty(&self) -> bool { self.fields.is_empty() }

  /// Overwrites our fields with `other`'s; keys only we have are kept.
  pub fn merge(&mut self, other: Member) {
    self.fields.extend(other.fields);
  }

  /// Builder-style `insert`.
  pub fn with<K, V>(mut self, key: K, value: V) -> Member
    where K: Into<String>,
          V: Into<Value>,
  {
    self.insert(key, value);
    self
  }
}

impl FromIterator<(String, Value)> for Member {
  fn from_iter<I>(iter: I) -> Member
    where I: IntoIterator<Item = (String, Value)>,
  {
    Member {
      fields: iter.into_iter().collect(),
    }
  }
}
impl IntoIterator for Member {
  type Item = (String, Value);
  type IntoIter = btree_map::IntoIter<String, Value>;
  fn into_iter(self) -> Self::IntoIter { self.fields.into_iter() }
}
impl<'a> IntoIterator for &'a Member {
  type Item = (&'a String, &'a Value);
  type IntoIter = btree_map::Iter<'a, String, Value>;
  fn into_iter(self) -> Self::IntoIter { self.fields.iter() }
}
