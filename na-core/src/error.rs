
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// Vector length doesn't match the total size of the fields it is
  /// being written into.
  #[error("shape mismatch: fields consume {consumed} values, vector provides {provided}")]
  Shape {
    consumed: usize,
    provided: usize,
  },
  #[error("field `{key}` has a non-numeric leaf ({kind})")]
  UnsupportedLeaf {
    key: String,
    kind: &'static str,
  },
  #[error("member {index} vectorizes to {found} values, expected {expected}")]
  RaggedMembers {
    index: usize,
    expected: usize,
    found: usize,
  },
  #[error("member {index} is missing state key `{key}`")]
  MissingKey {
    index: usize,
    key: String,
  },
  #[error("member has no field `{0}`")]
  MissingField(String),
  #[error("ensemble sizes differ: {left} vs {right}")]
  LengthMismatch {
    left: usize,
    right: usize,
  },
  #[error("ensemble has no members")]
  EmptyEnsemble,

  #[error("`{}` already exists", .0.display())]
  AlreadyExists(PathBuf),
  #[error("unsupported ensemble format version `{0}`")]
  UnsupportedVersion(String),
  #[error("member file {index} is missing from `{}`", .dir.display())]
  MissingMember {
    dir: PathBuf,
    index: usize,
  },

  #[error("backend `{backend}` can't run this operator: {reason}")]
  UnsupportedBackend {
    backend: String,
    reason: &'static str,
  },
  #[error("worker {worker} is outside 1..={workers}")]
  InvalidWorker {
    worker: usize,
    workers: usize,
  },
  #[error("worker failed on member {index}: {source}")]
  Worker {
    index: usize,
    #[source]
    source: Box<Error>,
  },
  #[error("worker panicked: {0}")]
  WorkerPanic(String),
  #[error("couldn't build worker pool: {0}")]
  Pool(String),

  #[error("no handler registered for `{0}`")]
  UnknownKey(String),
  #[error("operator failed: {0}")]
  Operator(String),
  #[error("numeric failure: {0}")]
  Numeric(String),

  #[error(transparent)]
  Io(#[from] io::Error),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub fn operator<S: Into<String>>(msg: S) -> Error {
    Error::Operator(msg.into())
  }

  /// Wraps a failure observed while processing member `index` in a worker.
  pub fn worker(index: usize, source: Error) -> Error {
    Error::Worker {
      index,
      source: Box::new(source),
    }
  }

  /// Strips any `Worker` wrapping, returning the original cause.
  pub fn root_cause(&self) -> &Error {
    match *self {
      Error::Worker { ref source, .. } => source.root_cause(),
      ref e => e,
    }
  }
}
