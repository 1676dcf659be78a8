//! Applying one operator across an ensemble on a pool of workers.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_isaac::Isaac64Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use std::fmt;

use na_core::{Ensemble, Error, Member, NoisyOperator, Operator, Result};

use crate::divvy::divvy_range;
use crate::queue::run_job_queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
  /// Order-preserving parallel map.
  OrderedMap,
  /// One contiguous slice of members per worker.
  StaticPartition,
  /// Long-lived workers pulling members off a bounded queue. The only
  /// backend that can give each worker its own noise stream.
  JobQueue,
}

impl Backend {
  pub fn name(&self) -> &'static str {
    match *self {
      Backend::OrderedMap => "ordered_map",
      Backend::StaticPartition => "static_partition",
      Backend::JobQueue => "job_queue",
    }
  }
}

impl Default for Backend {
  fn default() -> Backend { Backend::OrderedMap }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  pub backend: Backend,
  pub workers: usize,
  /// Bound of the job and result channels (job queue only).
  pub queue_capacity: usize,
  /// Seeds the stream worker seeds are drawn from. 0 picks one at random.
  pub seed: u64,
}

impl Default for PoolConfig {
  fn default() -> PoolConfig {
    PoolConfig {
      backend: Default::default(),
      workers: rayon::current_num_threads(),
      queue_capacity: 16,
      seed: 0,
    }
  }
}

enum WorkerOp<'a, A: ?Sized> {
  Shared(&'a dyn Operator<A>),
  Forked(Box<dyn NoisyOperator<A> + 'a>),
}

impl<'a, A: ?Sized> WorkerOp<'a, A> {
  fn apply(&self, member: &Member, args: &A) -> Result<Member> {
    match *self {
      WorkerOp::Shared(op) => op.apply(member, args),
      WorkerOp::Forked(ref op) => op.apply(member, args),
    }
  }
}

pub struct DistributedOperator<O> {
  op: O,
  config: PoolConfig,
  pool: ThreadPool,
  rng: Mutex<Isaac64Rng>,
}

impl<O> DistributedOperator<O> {
  pub fn new(op: O, config: PoolConfig) -> Result<DistributedOperator<O>> {
    let workers = config.workers.max(1);
    let pool = ThreadPoolBuilder::new()
      .num_threads(workers)
      .thread_name(|i| format!("na-worker-{}", i + 1))
      .build()
      .map_err(|e| Error::Pool(e.to_string()))?;
    let seed = match config.seed {
      0 => rand::random::<u64>() | 1,
      seed => seed,
    };
    debug!(backend = %config.backend, workers, seed, "built distributed operator");

    Ok(DistributedOperator {
      op,
      config: PoolConfig { workers, ..config },
      pool,
      rng: Mutex::new(Isaac64Rng::seed_from_u64(seed)),
    })
  }

  pub fn inner(&self) -> &O { &self.op }
  pub fn config(&self) -> &PoolConfig { &self.config }
  pub fn backend(&self) -> Backend { self.config.backend }
  pub fn workers(&self) -> usize { self.config.workers }

  /// Applies the operator to every member. The result is in member order
  /// whatever the backend, and matches `na_core::apply` for deterministic
  /// operators.
  pub fn apply_ensemble<A>(&self, ensemble: &Ensemble, args: &A) -> Result<Ensemble>
    where O: Operator<A>,
          A: ?Sized + Sync,
  {
    let backend = self.config.backend;
    if backend != Backend::JobQueue && self.op.as_noisy().is_some() {
      return Err(Error::UnsupportedBackend {
        backend: backend.name().to_owned(),
        reason: "noisy operators need a private stream per worker",
      });
    }

    let members = match backend {
      Backend::OrderedMap => self.ordered_map(ensemble, args)?,
      Backend::StaticPartition => self.static_partition(ensemble, args)?,
      Backend::JobQueue => self.job_queue(ensemble, args)?,
    };
    Ok(ensemble.derive(members))
  }

  fn ordered_map<A>(&self, ensemble: &Ensemble, args: &A) -> Result<Vec<Member>>
    where O: Operator<A>,
          A: ?Sized + Sync,
  {
    let op = &self.op;
    self.pool.install(|| {
      ensemble.members
        .par_iter()
        .enumerate()
        .map(|(i, m)| op.apply(m, args).map_err(|e| Error::worker(i, e)))
        .collect()
    })
  }

  fn static_partition<A>(&self, ensemble: &Ensemble, args: &A) -> Result<Vec<Member>>
    where O: Operator<A>,
          A: ?Sized + Sync,
  {
    let op = &self.op;
    let n = ensemble.len();
    let workers = self.workers();

    let mut slices: Vec<(usize, Vec<Member>)> = self.pool.install(|| {
      (1..=workers)
        .into_par_iter()
        .map(|worker| {
          let range = divvy_range(n, worker, workers)?;
          trace!(worker, start = range.start, end = range.end, "partition");
          let start = range.start;
          let out = ensemble.members[range]
            .iter()
            .enumerate()
            .map(|(i, m)| op.apply(m, args).map_err(|e| Error::worker(start + i, e)))
            .collect::<Result<Vec<_>>>()?;
          Ok((start, out))
        })
        .collect::<Result<_>>()
    })?;

    slices.sort_by_key(|s| s.0);
    Ok(slices.into_iter().flat_map(|s| s.1).collect())
  }

  fn job_queue<A>(&self, ensemble: &Ensemble, args: &A) -> Result<Vec<Member>>
    where O: Operator<A>,
          A: ?Sized + Sync,
  {
    let n = ensemble.len();
    let workers = self.workers().min(n.max(1));

    let ops: Vec<WorkerOp<A>> = match self.op.as_noisy() {
      Some(noisy) => {
        let mut rng = self.rng.lock();
        (0..workers)
          .map(|_| WorkerOp::Forked(noisy.fork(rng.gen())))
          .collect()
      },
      None => {
        let op: &dyn Operator<A> = &self.op;
        (0..workers).map(|_| WorkerOp::Shared(op)).collect()
      },
    };
    let workers: Vec<_> = ops
      .into_iter()
      .map(|op| move |_: usize, m: &Member| op.apply(m, args))
      .collect();

    let done = run_job_queue(ensemble.members.iter().collect(), workers,
                             self.config.queue_capacity)?;

    let mut slots: Vec<Option<Member>> = (0..n).map(|_| None).collect();
    for (index, member) in done {
      slots[index] = Some(member);
    }
    slots
      .into_iter()
      .enumerate()
      .map(|(i, m)| m.ok_or_else(|| Error::WorkerPanic(format!("member {} never completed", i))))
      .collect()
  }
}

/// Per member this is just the wrapped operator.
impl<O, A> Operator<A> for DistributedOperator<O>
  where O: Operator<A>,
        A: ?Sized,
{
  fn apply(&self, member: &Member, args: &A) -> Result<Member> {
    self.op.apply(member, args)
  }
  fn as_noisy(&self) -> Option<&dyn NoisyOperator<A>> { self.op.as_noisy() }
}

impl<O> fmt::Debug for DistributedOperator<O>
  where O: fmt::Debug,
{
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("DistributedOperator")
      .field("op", &self.op)
      .field("config", &self.config)
      .finish()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use na_core::{apply, split_clean_noisy, FnOperator, NoisyObserver};

  const BACKENDS: [Backend; 3] = [Backend::OrderedMap, Backend::StaticPartition, Backend::JobQueue];

  fn ensemble(n: usize) -> Ensemble {
    let members = (0..n)
      .map(|i| Member::new().with("x", i as f64).with("v", vec![i as f64, 1.0]))
      .collect();
    Ensemble::new(members, None).unwrap()
  }

  fn config(backend: Backend, workers: usize) -> PoolConfig {
    PoolConfig {
      backend,
      workers,
      queue_capacity: 2,
      seed: 7,
    }
  }

  fn square(m: &Member, _: &()) -> Result<Member> {
    let x = m.get("x").and_then(|v| v.as_scalar()).ok_or_else(|| Error::operator("no x"))?;
    Ok(Member::new().with("x", x * x).with("v", vec![x, -x]))
  }

  /// Early members take longest, so workers finish out of order.
  fn slow_square(m: &Member, args: &()) -> Result<Member> {
    let x = m.get("x").and_then(|v| v.as_scalar()).unwrap_or(0.0);
    let delay = 7u64.saturating_sub(x as u64);
    std::thread::sleep(std::time::Duration::from_millis(delay * 3));
    square(m, args)
  }

  #[test]
  fn backends_agree_with_sequential_apply() {
    let e = ensemble(7);
    let op = FnOperator(slow_square);
    let expected = apply(&op, &e, &()).unwrap();

    for &backend in BACKENDS.iter() {
      for &workers in &[1, 3, 16] {
        let d = DistributedOperator::new(op, config(backend, workers)).unwrap();
        let out = d.apply_ensemble(&e, &()).unwrap();
        assert_eq!(out, expected, "{} with {} workers", backend, workers);
      }
    }
  }

  #[test]
  fn empty_ensemble() {
    for &backend in BACKENDS.iter() {
      let d = DistributedOperator::new(FnOperator(square), config(backend, 4)).unwrap();
      let out = d.apply_ensemble(&ensemble(0), &()).unwrap();
      assert!(out.is_empty());
    }
  }

  #[test]
  fn member_errors_name_the_member() {
    let op = FnOperator(|m: &Member, _: &()| -> Result<Member> {
      match m.get("x").and_then(|v| v.as_scalar()) {
        Some(x) if x == 4.0 => Err(Error::operator("bad member")),
        _ => Ok(m.clone()),
      }
    });

    for &backend in BACKENDS.iter() {
      let d = DistributedOperator::new(op, config(backend, 3)).unwrap();
      match d.apply_ensemble(&ensemble(9), &()) {
        Err(Error::Worker { index: 4, ref source }) => {
          assert!(matches!(**source, Error::Operator(_)));
        },
        other => panic!("{}: unexpected {:?}", backend, other),
      }
    }
  }

  #[test]
  fn noisy_operators_need_the_job_queue() {
    let observe = FnOperator(|m: &Member, _: &()| -> Result<Member> { Ok(m.clone()) });
    let noisy = NoisyObserver::new(observe, 0.5, 11, false);

    for &backend in &[Backend::OrderedMap, Backend::StaticPartition] {
      let d = DistributedOperator::new(noisy.clone(), config(backend, 2)).unwrap();
      match d.apply_ensemble(&ensemble(3), &()) {
        Err(Error::UnsupportedBackend { backend: ref b, .. }) => assert_eq!(b, backend.name()),
        other => panic!("unexpected {:?}", other),
      }
    }

    let d = DistributedOperator::new(noisy, config(Backend::JobQueue, 2)).unwrap();
    let e = ensemble(6);
    let out = d.apply_ensemble(&e, &()).unwrap();
    assert_eq!(out.len(), 6);
    let (clean, perturbed) = split_clean_noisy::<_, ()>(&d, &out).unwrap();
    for i in 0..6 {
      assert_eq!(clean[i], e[i]);
      assert_ne!(perturbed[i].get("x"), e[i].get("x"));
    }
  }

  #[test]
  fn pool_size_is_at_least_one() {
    let d = DistributedOperator::new(FnOperator(square), config(Backend::OrderedMap, 0)).unwrap();
    assert_eq!(d.workers(), 1);
    assert_eq!(d.apply_ensemble(&ensemble(2), &()).unwrap().len(), 2);
  }

  #[test]
  fn config_from_json() {
    let c: PoolConfig = serde_json::from_str(r#"{"backend":"job_queue","workers":3}"#).unwrap();
    assert_eq!(c.backend, Backend::JobQueue);
    assert_eq!(c.workers, 3);
    assert_eq!(c.queue_capacity, PoolConfig::default().queue_capacity);
  }
}
