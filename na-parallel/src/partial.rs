//! Splitting one operator run across independent processes that share a
//! filesystem, checkpointing every member as it finishes.
//!
//! Each of `num_workers` invocations handles its `divvy` slice and writes
//! `<work_dir>/<i>.json` per member. A final invocation as worker 1 of 1
//! (the closer) fills in anything missing and consolidates the directory
//! into the target ensemble. Members whose file is already present are
//! skipped, so a crashed run is resumed by running it again.

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::PathBuf;

use na_core::{Ensemble, Error, Operator, Result};
use na_storage::{check_path, file_path, member_path, save, save_member, PathState, SaveOptions};

use crate::divvy::divvy_range;
use crate::queue::run_job_queue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRun {
  /// Stem the consolidated ensemble is saved under. Must not exist yet.
  pub target: PathBuf,
  /// Scratch directory for member files, owned by this run until the
  /// closer consolidates it.
  pub work_dir: PathBuf,
  /// 1-based.
  pub worker_id: usize,
  pub num_workers: usize,
  /// Members computed concurrently by this invocation.
  pub in_flight: usize,
  /// Consolidate by merging results over the input members.
  pub merge: bool,
  pub reset_state_keys: bool,
}

impl PartialRun {
  /// A single closing invocation, one member at a time.
  pub fn new<T, W>(target: T, work_dir: W) -> PartialRun
    where T: Into<PathBuf>,
          W: Into<PathBuf>,
  {
    PartialRun {
      target: target.into(),
      work_dir: work_dir.into(),
      worker_id: 1,
      num_workers: 1,
      in_flight: 1,
      merge: false,
      reset_state_keys: false,
    }
  }

  pub fn worker(mut self, worker_id: usize, num_workers: usize) -> PartialRun {
    self.worker_id = worker_id;
    self.num_workers = num_workers;
    self
  }
  pub fn in_flight(mut self, in_flight: usize) -> PartialRun {
    self.in_flight = in_flight;
    self
  }
  pub fn merge(mut self, merge: bool) -> PartialRun {
    self.merge = merge;
    self
  }
  pub fn reset_state_keys(mut self, reset: bool) -> PartialRun {
    self.reset_state_keys = reset;
    self
  }

  pub fn is_closer(&self) -> bool {
    self.worker_id == 1 && self.num_workers == 1
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialOutcome {
  /// The target ensemble was written by this invocation.
  pub is_closer: bool,
  /// Members computed by this invocation (skipped ones excluded).
  pub completed: usize,
}

/// One invocation of a checkpointed operator run; see the module docs.
///
/// Noisy operators are reseeded with the 1-based member index before each
/// member, so the noise a member gets doesn't depend on which worker, or
/// which attempt, computed it.
pub fn run_partial_operator<O, A>(op: &O, ensemble: &Ensemble, args: &A, run: &PartialRun)
  -> Result<PartialOutcome>
  where O: Operator<A>,
        A: ?Sized + Sync,
{
  if check_path(&run.target) == PathState::Existing {
    return Err(Error::AlreadyExists(file_path(&run.target)));
  }

  let n = ensemble.len();
  let is_closer = run.is_closer();
  let range = if is_closer {
    0..n
  } else {
    divvy_range(n, run.worker_id, run.num_workers)?
  };

  fs::create_dir_all(&run.work_dir)?;
  let share = range.len();
  let pending: Vec<usize> = range
    .filter(|&i| !member_path(&run.work_dir, i + 1).is_file())
    .collect();
  info!(worker = run.worker_id,
        workers = run.num_workers,
        pending = pending.len(),
        skipped = share - pending.len(),
        "running partial operator");

  let completed = pending.len();
  if !pending.is_empty() {
    let in_flight = run.in_flight.max(1).min(completed);
    let noisy = op.as_noisy();
    let workers: Vec<_> = (0..in_flight)
      .map(|_| move |_: usize, index: usize| -> Result<()> {
        let member = &ensemble.members[index];
        let out = match noisy {
          Some(noisy) => noisy.fork(index as u64 + 1).apply(member, args)?,
          None => op.apply(member, args)?,
        };
        save_member(&run.work_dir, index + 1, &out)
      })
      .collect();
    run_job_queue(pending, workers, in_flight)?;
  }

  if is_closer {
    let options = SaveOptions {
      existing_member_directory: Some(run.work_dir.clone()),
      merge_members: run.merge,
      reset_state_keys: run.reset_state_keys,
    };
    save(ensemble, &run.target, &options)?;
  }

  Ok(PartialOutcome {
    is_closer,
    completed,
  })
}
