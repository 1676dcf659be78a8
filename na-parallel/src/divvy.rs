use std::ops::Range;

use na_core::{Error, Result};

/// Worker `worker`'s share (of `workers`) of `n` items, as 1-based
/// inclusive bounds. The first `n % workers` workers take one extra item;
/// an empty share has `start == end + 1`.
pub fn divvy(n: usize, worker: usize, workers: usize) -> Result<(usize, usize)> {
  if worker == 0 || worker > workers {
    return Err(Error::InvalidWorker { worker, workers });
  }

  let base = n / workers;
  let extra = n % workers;
  let before = worker - 1;
  let start = before * base + before.min(extra) + 1;
  let len = base + if worker <= extra { 1 } else { 0 };
  Ok((start, start + len - 1))
}

/// `divvy` as a 0-based index range.
pub fn divvy_range(n: usize, worker: usize, workers: usize) -> Result<Range<usize>> {
  let (start, end) = divvy(n, worker, workers)?;
  Ok(start - 1..end)
}
