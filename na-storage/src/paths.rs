//! Where an ensemble saved under a path stem lives on disk, and how an
//! occupied stem is moved out of the way.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use na_core::Result;

pub const EXTENSION: &str = "json";
pub const MEMBER_DIR_SUFFIX: &str = "_ensemble";
pub const BACKUP_SUFFIX: &str = "-1";

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
  let mut s: OsString = stem.as_os_str().to_owned();
  s.push(suffix);
  PathBuf::from(s)
}

/// `<stem>.json`: the monolithic file, or the split layout's metadata.
pub fn file_path(stem: &Path) -> PathBuf {
  with_suffix(stem, &format!(".{}", EXTENSION))
}

/// `<stem>_ensemble/`: the split layout's member files.
pub fn member_dir(stem: &Path) -> PathBuf {
  with_suffix(stem, MEMBER_DIR_SUFFIX)
}

pub fn backup_stem(stem: &Path) -> PathBuf {
  with_suffix(stem, BACKUP_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
  /// Something is saved at (or left over under) this stem.
  Existing,
  Fresh,
}

pub fn check_path(stem: &Path) -> PathState {
  if file_path(stem).exists() || member_dir(stem).exists() {
    PathState::Existing
  } else {
    PathState::Fresh
  }
}

fn rename_if_exists(from: &Path, to: &Path) -> io::Result<()> {
  if from.exists() {
    fs::rename(from, to)?;
  }
  Ok(())
}

/// Renames whatever is saved under `stem` to `<stem>-1`, first backing up
/// `<stem>-1` itself if that's taken. Returns the stem it was moved to.
pub fn backup(stem: &Path) -> Result<PathBuf> {
  let to = backup_stem(stem);
  if check_path(&to) == PathState::Existing {
    backup(&to)?;
  }

  rename_if_exists(&file_path(stem), &file_path(&to))?;
  rename_if_exists(&member_dir(stem), &member_dir(&to))?;
  warn!(from = %stem.display(), to = %to.display(), "backed up existing ensemble");
  Ok(to)
}

pub(crate) fn create_parent(path: &Path) -> io::Result<()> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
    _ => Ok(()),
  }
}
