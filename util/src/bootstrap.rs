//! Named setup steps (logging, output directories, ...) a binary can ask
//! for by name, e.g. from its config file.

use std::collections::BTreeMap;
use std::fmt;

use na_core::{Error, Result};

pub type Installer = Box<dyn Fn() -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct Bootstrap {
  installers: BTreeMap<String, Installer>,
}

impl Bootstrap {
  pub fn new() -> Bootstrap { Default::default() }

  /// Registers `installer` under `name`, replacing any previous one.
  pub fn register<S, F>(&mut self, name: S, installer: F) -> &mut Bootstrap
    where S: Into<String>,
          F: Fn() -> Result<()> + Send + Sync + 'static,
  {
    self.installers.insert(name.into(), Box::new(installer));
    self
  }

  pub fn contains(&self, name: &str) -> bool { self.installers.contains_key(name) }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.installers.keys().map(|k| &k[..])
  }

  pub fn install(&self, name: &str) -> Result<()> {
    let installer = self.installers
      .get(name)
      .ok_or_else(|| Error::UnknownKey(name.to_owned()))?;
    debug!(name, "installing");
    installer()
  }

  /// Installs each of `names` in order, stopping at the first failure.
  pub fn install_all<I, S>(&self, names: I) -> Result<()>
    where I: IntoIterator<Item = S>,
          S: AsRef<str>,
  {
    for name in names {
      self.install(name.as_ref())?;
    }
    Ok(())
  }
}

impl fmt::Debug for Bootstrap {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_set()
      .entries(self.installers.keys())
      .finish()
  }
}
