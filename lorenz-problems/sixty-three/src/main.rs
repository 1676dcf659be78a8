extern crate na_core;
extern crate na_discrete_filtering as na_df;
extern crate na_parallel;
extern crate na_storage;
extern crate rand;
extern crate rand_isaac;
extern crate serde;
extern crate serde_json;
extern crate sixty_three;
#[macro_use]
extern crate tracing;
extern crate tracing_subscriber;
extern crate util;

use rand::SeedableRng;
use rand_isaac::Isaac64Rng;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;

use na_core::stats::mean;
use na_core::{apply, split_clean_noisy, vectorize, Ensemble, Error, Member,
              ModelOperator, ModelStats, NoisyObserver, Result};
use na_df::{gaussian_ensemble, Assimilator, EnKF, Log};
use na_parallel::{Backend, DistributedOperator, PoolConfig};
use na_storage::SaveOptions;
use sixty_three::{L63Model, L63Observer, STATE_KEY};
use util::{Bootstrap, Reporting};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Setup {
  members: usize,
  steps: usize,
  /// Model time between two analyses.
  window: f64,
  model: L63Model,
  observer: L63Observer,
  initial_state: [f64; 3],
  initial_spread: f64,
  observation_std: f64,
  seed: u64,
  pool: PoolConfig,
  /// Stem the final analysis ensemble is saved under.
  output: Option<PathBuf>,
  split_output: bool,
  install: Vec<String>,
}

impl Default for Setup {
  fn default() -> Setup {
    Setup {
      members: 20,
      steps: 200,
      window: 0.1,
      model: Default::default(),
      observer: Default::default(),
      initial_state: [1.0, 1.0, 1.0],
      initial_spread: 2.0,
      observation_std: 1.0,
      seed: 1,
      pool: Default::default(),
      output: None,
      split_output: false,
      install: vec!["logging".into()],
    }
  }
}

impl Setup {
  fn read() -> Result<Setup> {
    match std::env::args_os().nth(1) {
      Some(path) => {
        let file = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(file)?)
      },
      None => Ok(Default::default()),
    }
  }

  fn bootstrap(&self) -> Bootstrap {
    let mut b = Bootstrap::new();
    b.register("logging", || {
      tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| Error::operator(e.to_string()))
    });
    let output = self.output.clone();
    b.register("output", move || {
      match output.as_ref().and_then(|o| o.parent()) {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
      }
    });
    b
  }
}

fn state(member: &Member) -> Result<Vec<f64>> {
  Ok(vectorize(&[STATE_KEY.to_owned()], member)?.to_vec())
}

fn rmse(analysis: &Ensemble, truth: &Member) -> Result<f64> {
  let m = state(&mean(analysis, None)?)?;
  let t = state(truth)?;
  let sum: f64 = m.iter().zip(t.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
  Ok((sum / m.len() as f64).sqrt())
}

fn run(setup: &Setup) -> Result<()> {
  setup.bootstrap().install_all(&setup.install)?;
  info!(members = setup.members, steps = setup.steps,
        backend = %setup.pool.backend, workers = setup.pool.workers,
        "starting lorenz-63 enkf");

  let keys = vec![STATE_KEY.to_owned()];
  let mut rng = Isaac64Rng::seed_from_u64(setup.seed);

  let truth_op = ModelOperator::new(setup.model.clone(), keys.clone());
  let truth_obs = NoisyObserver::new(setup.observer.clone(), setup.observation_std,
                                     setup.seed ^ 0x5eed, true);

  let forecast = DistributedOperator::new(
    ModelOperator::new(ModelStats::from(setup.model.clone()), keys.clone()),
    setup.pool.clone(),
  )?;
  let observe = DistributedOperator::new(
    NoisyObserver::new(setup.observer.clone(), setup.observation_std, setup.seed, false),
    PoolConfig {
      backend: Backend::JobQueue,
      ..setup.pool.clone()
    },
  )?;
  let enkf = EnKF::new(setup.observation_std * setup.observation_std);

  let initial = Member::new().with(STATE_KEY, setup.initial_state.to_vec());
  let mut truth = Ensemble::new(vec![initial.clone()], Some(keys.clone()))?;
  let mut analysis = gaussian_ensemble(&initial, setup.initial_spread, setup.members,
                                       Some(keys), &mut rng)?;

  let mut log = Log::new();
  for step in (0..setup.steps).reporting("l63 enkf") {
    let span = (step as f64 * setup.window, (step + 1) as f64 * setup.window);
    truth = apply(&truth_op, &truth, &span)?;
    let y_obs = apply(&truth_obs, &truth, &())?[0].clone();

    let prior = forecast.apply_ensemble(&analysis, &span)?;
    let observations = observe.apply_ensemble(&prior, &())?;
    let (clean, noisy) = split_clean_noisy::<_, ()>(&observe, &observations)?;
    analysis = enkf.assimilate(&prior, &clean, &noisy, &y_obs, Some(&mut log))?;

    let error = rmse(&analysis, &truth[0])?;
    debug!(step, error, "analysis");
  }

  let error = rmse(&analysis, &truth[0])?;
  info!(model_runs = forecast.inner().model.calls(), error, "finished");

  if let Some(ref stem) = setup.output {
    let analysis = analysis.with_monolithic_storage(!setup.split_output);
    na_storage::save(&analysis, stem, &SaveOptions::default())?;
    info!(path = %stem.display(), "saved analysis ensemble");
  }
  Ok(())
}

fn main() {
  let result = Setup::read().and_then(|setup| run(&setup));
  if let Err(e) = result {
    error!(error = %e, "run failed");
    eprintln!("error: {}", e);
    process::exit(1);
  }
}
