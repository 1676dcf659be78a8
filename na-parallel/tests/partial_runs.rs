extern crate na_core;
extern crate na_parallel;
extern crate na_storage;
extern crate tempfile;

use std::sync::atomic::{AtomicUsize, Ordering};

use na_core::{apply, Ensemble, Error, FnOperator, Member, NoisyObserver, Result, Value};
use na_parallel::{run_partial_operator, PartialRun};
use na_storage::{load, member_indices, member_path};

fn ensemble(n: usize) -> Ensemble {
  let members = (0..n)
    .map(|i| Member::new().with("x", i as f64).with("v", vec![i as f64, 0.5]))
    .collect();
  Ensemble::new(members, None).unwrap()
}

fn double(m: &Member, _: &()) -> Result<Member> {
  let x = m.get("x").and_then(Value::as_scalar).ok_or_else(|| Error::operator("no x"))?;
  Ok(Member::new().with("x", 2.0 * x).with("v", vec![x, 1.0]))
}

#[test]
fn workers_then_closer() {
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("forecast");
  let work = dir.path().join("forecast_work");
  let e = ensemble(10);
  let op = FnOperator(double);

  let mut completed = vec![];
  for worker in 1..=3 {
    let run = PartialRun::new(&target, &work).worker(worker, 3).in_flight(2);
    let outcome = run_partial_operator(&op, &e, &(), &run).unwrap();
    assert!(!outcome.is_closer);
    completed.push(outcome.completed);
  }
  assert_eq!(completed, vec![4, 3, 3]);
  assert_eq!(member_indices(&work).unwrap(), (1..=10).collect::<Vec<_>>());
  assert!(!na_storage::exists(&target));

  let outcome = run_partial_operator(&op, &e, &(), &PartialRun::new(&target, &work)).unwrap();
  assert!(outcome.is_closer);
  assert_eq!(outcome.completed, 0);
  assert!(!work.exists());
  assert_eq!(load(&target).unwrap(), apply(&op, &e, &()).unwrap());
}

#[test]
fn resumed_noisy_run_reproduces_the_noise() {
  let dir = tempfile::tempdir().unwrap();
  let e = ensemble(8);
  let observe = FnOperator(|m: &Member, _: &()| -> Result<Member> { Ok(m.clone()) });
  let op = NoisyObserver::new(observe, 0.3, 1234, false);

  // one uninterrupted run
  let straight = dir.path().join("straight");
  let run = PartialRun::new(&straight, dir.path().join("straight_work")).in_flight(3);
  run_partial_operator(&op, &e, &(), &run).unwrap();

  // two workers, one member lost to a crash, then the closer
  let resumed = dir.path().join("resumed");
  let work = dir.path().join("resumed_work");
  for worker in 1..=2 {
    let run = PartialRun::new(&resumed, &work).worker(worker, 2).in_flight(2);
    run_partial_operator(&op, &e, &(), &run).unwrap();
  }
  std::fs::remove_file(member_path(&work, 3)).unwrap();
  let outcome = run_partial_operator(&op, &e, &(), &PartialRun::new(&resumed, &work)).unwrap();
  assert_eq!(outcome.completed, 1);

  let straight = load(&straight).unwrap();
  let resumed = load(&resumed).unwrap();
  assert_eq!(straight, resumed);
  assert!(straight[2].contains_key("x_noisy"));
  assert_ne!(straight[2].get("x_noisy"), straight[2].get("x"));
}

#[test]
fn failed_run_keeps_finished_members() {
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("out");
  let work = dir.path().join("work");
  let e = ensemble(10);

  let flaky = FnOperator(|m: &Member, args: &()| -> Result<Member> {
    match m.get("x").and_then(Value::as_scalar) {
      Some(x) if x == 5.0 => Err(Error::operator("diverged")),
      _ => double(m, args),
    }
  });
  match run_partial_operator(&flaky, &e, &(), &PartialRun::new(&target, &work)) {
    Err(e) => assert!(matches!(e.root_cause(), Error::Operator(_))),
    Ok(outcome) => panic!("unexpected {:?}", outcome),
  }
  assert!(!na_storage::exists(&target));
  assert_eq!(member_indices(&work).unwrap(), vec![1, 2, 3, 4, 5]);

  let calls = AtomicUsize::new(0);
  let counted = FnOperator(|m: &Member, args: &()| -> Result<Member> {
    calls.fetch_add(1, Ordering::SeqCst);
    double(m, args)
  });
  let outcome = run_partial_operator(&counted, &e, &(), &PartialRun::new(&target, &work)).unwrap();
  assert_eq!(outcome.completed, 5);
  assert_eq!(calls.load(Ordering::SeqCst), 5);
  assert_eq!(load(&target).unwrap(), apply(&FnOperator(double), &e, &()).unwrap());
}

#[test]
fn merged_consolidation_keeps_input_fields() {
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("observed");
  let e = ensemble(4).with_monolithic_storage(false);

  let observe = FnOperator(|m: &Member, _: &()| -> Result<Member> {
    let x = m.get("x").and_then(Value::as_scalar).unwrap_or(0.0);
    Ok(Member::new().with("y", x + 0.25))
  });
  let run = PartialRun::new(&target, dir.path().join("work")).merge(true).in_flight(4);
  run_partial_operator(&observe, &e, &(), &run).unwrap();

  let out = load(&target).unwrap();
  assert!(!out.monolithic_storage);
  assert_eq!(out.state_keys, e.state_keys);
  assert_eq!(out[3].get("x"), Some(&Value::Scalar(3.0)));
  assert_eq!(out[3].get("y"), Some(&Value::Scalar(3.25)));
}
