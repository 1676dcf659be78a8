//! One file per member: `<dir>/<index>.json` holding `{"member": ...}`,
//! indices 1-based.

use serde::{Deserialize, Serialize};

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use na_core::{Error, Member, Result};

use crate::paths::{create_parent, EXTENSION};

#[derive(Serialize)]
struct MemberFileRef<'a> {
  member: &'a Member,
}
#[derive(Deserialize)]
struct MemberFile {
  member: Member,
}

pub fn member_path(dir: &Path, index: usize) -> PathBuf {
  dir.join(format!("{}.{}", index, EXTENSION))
}

/// Serializes into `<path>.tmp` and renames over `path`; a crash leaves
/// either the old file or the new one, never a torn one.
pub(crate) fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
  where T: Serialize + ?Sized,
{
  create_parent(path)?;
  let mut tmp = path.as_os_str().to_owned();
  tmp.push(".tmp");
  let tmp = PathBuf::from(tmp);

  {
    let mut out = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer(&mut out, value)?;
    out.flush()?;
    out.into_inner()
      .map_err(|e| e.into_error())?
      .sync_all()?;
  }
  fs::rename(&tmp, path)?;
  Ok(())
}

pub(crate) fn read_json<T>(path: &Path) -> Result<T>
  where T: for<'de> Deserialize<'de>,
{
  let file = BufReader::new(File::open(path)?);
  Ok(serde_json::from_reader(file)?)
}

pub fn save_member(dir: &Path, index: usize, member: &Member) -> Result<()> {
  write_json_atomic(&member_path(dir, index), &MemberFileRef { member })?;
  trace!(dir = %dir.display(), index, "saved member");
  Ok(())
}

pub fn load_member(dir: &Path, index: usize) -> Result<Member> {
  let path = member_path(dir, index);
  if !path.is_file() {
    return Err(Error::MissingMember {
      dir: dir.to_owned(),
      index,
    });
  }
  let file: MemberFile = read_json(&path)?;
  Ok(file.member)
}

/// Sorted indices of the member files present in `dir`. Anything not named
/// `<positive integer>.json` (temp files included) is ignored. A missing
/// directory has no members.
pub fn member_indices(dir: &Path) -> Result<Vec<usize>> {
  if !dir.is_dir() {
    return Ok(vec![]);
  }

  let mut out = vec![];
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
      continue;
    }
    let index = path.file_stem()
      .and_then(|s| s.to_str())
      .and_then(|s| s.parse::<usize>().ok());
    match index {
      Some(i) if i > 0 => out.push(i),
      _ => {},
    }
  }
  out.sort_unstable();
  Ok(out)
}

/// Loads members `1..=count` (default: up to the highest index present).
/// A gap in the numbering is an error.
pub fn load_member_directory(dir: &Path, count: Option<usize>) -> Result<Vec<Member>> {
  let count = match count {
    Some(count) => count,
    None => member_indices(dir)?.last().cloned().unwrap_or(0),
  };

  let mut members = Vec::with_capacity(count);
  for index in 1..=count {
    members.push(load_member(dir, index)?);
  }
  debug!(dir = %dir.display(), count, "loaded member directory");
  Ok(members)
}
