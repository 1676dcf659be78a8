//! Versioned on-disk ensembles.
//!
//! An ensemble saved under a path stem is either one `<stem>.json` holding
//! everything, or a `<stem>.json` metadata record next to a
//! `<stem>_ensemble/` directory of per-member files. Saving over an
//! occupied stem never clobbers it: the old copy is first renamed to
//! `<stem>-1`.

extern crate na_core;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate tracing;

use serde::de::Error as DeError;
use serde::{Deserialize, Serialize};

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use na_core::ensemble::default_state_keys;
use na_core::{Ensemble, Error, Member, Result};

pub use members::{load_member, load_member_directory, member_indices, member_path, save_member};
pub use paths::{backup, check_path, file_path, member_dir, PathState};

use members::{read_json, write_json_atomic};
use paths::create_parent;

pub mod members;
pub mod paths;

/// Written by `save`; supports both layouts.
pub const VERSION: &str = "1.0.1";
/// Always monolithic, no `monolithic_storage` field.
pub const LEGACY_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
  /// A directory of `<i>.json` member files to save in place of the
  /// in-memory members. It's consumed by the save.
  pub existing_member_directory: Option<PathBuf>,
  /// Merge the on-disk members over the in-memory ones (on-disk fields
  /// win) instead of replacing them.
  pub merge_members: bool,
  /// Recompute `state_keys` from the first saved member.
  pub reset_state_keys: bool,
}

#[derive(Serialize)]
struct MonolithicRecord<'a> {
  members: &'a [Member],
  state_keys: &'a [String],
  monolithic_storage: bool,
  version: &'a str,
}

#[derive(Serialize)]
struct SplitRecord<'a> {
  state_keys: &'a [String],
  monolithic_storage: bool,
  version: &'a str,
}

#[derive(Deserialize)]
struct StoredRecord {
  version: String,
  #[serde(default)]
  monolithic_storage: Option<bool>,
  #[serde(default)]
  state_keys: Option<Vec<String>>,
  #[serde(default)]
  members: Option<Vec<Member>>,
}

pub fn exists(stem: &Path) -> bool {
  file_path(stem).is_file()
}

/// Members to write, and whether they had to be pulled off disk.
fn gather_members<'a>(ensemble: &'a Ensemble, options: &SaveOptions)
  -> Result<Cow<'a, [Member]>>
{
  let dir = match options.existing_member_directory {
    Some(ref dir) => dir,
    None => return Ok(Cow::Borrowed(&ensemble.members[..])),
  };

  // An ensemble with no members in memory only contributes metadata.
  let count = if ensemble.is_empty() { None } else { Some(ensemble.len()) };
  let on_disk = load_member_directory(dir, count)?;
  if !options.merge_members {
    return Ok(Cow::Owned(on_disk));
  }

  let merged = ensemble.members
    .iter()
    .zip(on_disk.into_iter())
    .map(|(m, fresh)| {
      let mut m = m.clone();
      m.merge(fresh);
      m
    })
    .collect();
  Ok(Cow::Owned(merged))
}

fn write_split(dir: &Path, members: &[Member], existing: Option<&Path>, merged: bool)
  -> Result<()>
{
  if let (Some(src), false) = (existing, merged) {
    // The scratch directory already holds exactly these files.
    match fs::rename(src, dir) {
      Ok(()) => return Ok(()),
      Err(e) => debug!(src = %src.display(), error = %e, "rename failed, rewriting members"),
    }
  }

  fs::create_dir_all(dir)?;
  for (i, member) in members.iter().enumerate() {
    save_member(dir, i + 1, member)?;
  }
  if let Some(src) = existing {
    fs::remove_dir_all(src)?;
  }
  Ok(())
}

/// Saves `ensemble` under `stem`, honoring its `monolithic_storage` flag.
pub fn save(ensemble: &Ensemble, stem: &Path, options: &SaveOptions) -> Result<()> {
  let existing = options.existing_member_directory.as_deref();
  let members = gather_members(ensemble, options)?;
  let state_keys = if options.reset_state_keys {
    default_state_keys(&members)
  } else {
    ensemble.state_keys.clone()
  };
  if existing.is_some() {
    // Check the on-disk members before anything on disk changes.
    Ensemble::new(members.to_vec(), Some(state_keys.clone()))?;
  }

  if check_path(stem) == PathState::Existing {
    backup(stem)?;
  }
  let file = file_path(stem);
  create_parent(&file)?;

  if ensemble.monolithic_storage {
    write_json_atomic(&file, &MonolithicRecord {
      members: &members,
      state_keys: &state_keys,
      monolithic_storage: true,
      version: VERSION,
    })?;
    if let Some(src) = existing {
      fs::remove_dir_all(src)?;
    }
  } else {
    write_split(&member_dir(stem), &members, existing, options.merge_members)?;
    // Metadata last: a crash mid-save leaves no record pointing at a
    // half-written directory.
    write_json_atomic(&file, &SplitRecord {
      state_keys: &state_keys,
      monolithic_storage: false,
      version: VERSION,
    })?;
  }

  info!(stem = %stem.display(),
        members = members.len(),
        monolithic = ensemble.monolithic_storage,
        "saved ensemble");
  Ok(())
}

pub fn load(stem: &Path) -> Result<Ensemble> {
  let record: StoredRecord = read_json(&file_path(stem))?;

  let monolithic = match record.version.as_str() {
    LEGACY_VERSION => true,
    VERSION => record.monolithic_storage
      .ok_or_else(|| serde_json::Error::missing_field("monolithic_storage"))?,
    other => return Err(Error::UnsupportedVersion(other.to_owned())),
  };

  let members = if monolithic {
    record.members
      .ok_or_else(|| serde_json::Error::missing_field("members"))?
  } else {
    let dir = member_dir(stem);
    // `save` always creates the directory, even for an empty ensemble.
    if !dir.is_dir() {
      return Err(Error::MissingMember { dir, index: 1 });
    }
    load_member_directory(&dir, None)?
  };

  let ensemble = Ensemble::new(members, record.state_keys)?
    .with_monolithic_storage(monolithic);
  debug!(stem = %stem.display(),
         version = %record.version,
         members = ensemble.len(),
         "loaded ensemble");
  Ok(ensemble)
}

/// Relocates a saved ensemble, backing up whatever occupies `new_stem`.
pub fn move_ensemble(stem: &Path, new_stem: &Path) -> Result<()> {
  if !exists(stem) {
    let msg = format!("no ensemble saved at {}", file_path(stem).display());
    return Err(io::Error::new(io::ErrorKind::NotFound, msg).into());
  }
  if file_path(stem) == file_path(new_stem) {
    return Ok(());
  }
  if check_path(new_stem) == PathState::Existing {
    backup(new_stem)?;
  }

  let to = file_path(new_stem);
  create_parent(&to)?;
  fs::rename(file_path(stem), to)?;
  let dir = member_dir(stem);
  if dir.exists() {
    fs::rename(dir, member_dir(new_stem))?;
  }
  info!(from = %stem.display(), to = %new_stem.display(), "moved ensemble");
  Ok(())
}
