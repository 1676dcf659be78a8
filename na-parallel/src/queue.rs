//! A fixed set of long-lived workers fed through bounded channels.

use crossbeam_channel::{bounded, Receiver};

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use na_core::{Error, Result};

/// A receive that treats a closed channel as the end of the stream.
pub enum Recv<T> {
  Value(T),
  Closed,
}

pub fn recv<T>(rx: &Receiver<T>) -> Recv<T> {
  match rx.recv() {
    Ok(v) => Recv::Value(v),
    Err(_) => Recv::Closed,
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_owned()
  }
}

/// Runs every job through one of `workers`, each on its own thread, with at
/// most `capacity` jobs and `capacity` results buffered at a time.
///
/// Workers are called with the job's index in `jobs`. Results come back in
/// completion order, tagged with that index. The first failing job cancels
/// the rest and is returned wrapped in `Error::Worker`; nothing else is
/// returned in that case. Every thread has been joined by the time this
/// returns.
pub fn run_job_queue<J, R, F>(jobs: Vec<J>, workers: Vec<F>, capacity: usize)
  -> Result<Vec<(usize, R)>>
  where J: Send,
        R: Send,
        F: FnMut(usize, J) -> Result<R> + Send,
{
  let n = jobs.len();
  if n == 0 {
    return Ok(vec![]);
  }
  if workers.is_empty() {
    return Err(Error::Pool("job queue needs at least one worker".into()));
  }

  let capacity = capacity.max(1);
  debug!(jobs = n, workers = workers.len(), capacity, "starting job queue");

  let (job_tx, job_rx) = bounded::<(usize, J)>(capacity);
  let (res_tx, res_rx) = bounded::<Result<(usize, R)>>(capacity);
  let cancel = AtomicBool::new(false);

  thread::scope(|s| {
    let cancel = &cancel;

    let producer = s.spawn(move || {
      for job in jobs.into_iter().enumerate() {
        if cancel.load(Ordering::Relaxed) || job_tx.send(job).is_err() {
          break;
        }
      }
      // dropping `job_tx` closes the job channel
    });

    let handles: Vec<_> = workers
      .into_iter()
      .enumerate()
      .map(|(id, mut work)| {
        let job_rx = job_rx.clone();
        let res_tx = res_tx.clone();
        s.spawn(move || {
          while let Recv::Value((index, job)) = recv(&job_rx) {
            if cancel.load(Ordering::Relaxed) {
              break;
            }
            let out = work(index, job)
              .map(|r| (index, r))
              .map_err(|e| Error::worker(index, e));
            let failed = out.is_err();
            if failed {
              cancel.store(true, Ordering::Relaxed);
            }
            if res_tx.send(out).is_err() || failed {
              break;
            }
          }
          trace!(worker = id + 1, "worker done");
        })
      })
      .collect();
    drop(job_rx);
    drop(res_tx);

    let mut results = Vec::with_capacity(n);
    let mut failure = None;
    while let Recv::Value(out) = recv(&res_rx) {
      match out {
        Ok(r) => results.push(r),
        Err(e) => {
          cancel.store(true, Ordering::Relaxed);
          if failure.is_none() {
            failure = Some(e);
          }
        },
      }
    }

    let mut panicked = None;
    for handle in handles {
      if let Err(payload) = handle.join() {
        panicked.get_or_insert_with(|| panic_message(payload));
      }
    }
    if let Err(payload) = producer.join() {
      panicked.get_or_insert_with(|| panic_message(payload));
    }

    if let Some(e) = failure {
      warn!(error = %e, "job queue failed");
      return Err(e);
    }
    if let Some(msg) = panicked {
      return Err(Error::WorkerPanic(msg));
    }
    if results.len() != n {
      let msg = format!("{} of {} jobs finished", results.len(), n);
      return Err(Error::WorkerPanic(msg));
    }
    Ok(results)
  })
}
