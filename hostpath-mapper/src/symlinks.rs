// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./symlinks_test.rs"]
mod symlinks_test;

use crate::names::container_entry_pod_identity;
use anyhow::Context;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filesystem failures that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum MapperError {
  #[error("error creating symlink {} -> {}: {source}", .link.display(), .target.display())]
  CreateLink {
    link: PathBuf,
    target: PathBuf,
    source: io::Error,
  },
  #[error("error creating directory {}: {source}", .path.display())]
  CreateDir { path: PathBuf, source: io::Error },
  #[error("error reading physical kubelet pod dir {}: {source}", .path.display())]
  ReadPhysicalDir { path: PathBuf, source: io::Error },
}

/// Creates `link` pointing at `target`. Returns false if something already exists at `link`.
pub fn symlink_if_absent(target: &Path, link: &Path) -> Result<bool, MapperError> {
  match std::os::unix::fs::symlink(target, link) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
    Err(source) => Err(MapperError::CreateLink {
      link: link.to_path_buf(),
      target: target.to_path_buf(),
      source,
    }),
  }
}

pub fn create_pod_log_link(link: &Path, target: &Path) -> Result<(), MapperError> {
  if symlink_if_absent(target, link)? {
    log::info!(
      "created symlink from {} -> {}",
      link.display(),
      target.display()
    );
  }
  Ok(())
}

/// Mirrors the immediate children of `physical_dir` into `virtual_dir` as one symlink each.
pub fn create_kubelet_links(virtual_dir: &Path, physical_dir: &Path) -> Result<(), MapperError> {
  fs::create_dir_all(virtual_dir).map_err(|source| MapperError::CreateDir {
    path: virtual_dir.to_path_buf(),
    source,
  })?;

  let read_error = |source| MapperError::ReadPhysicalDir {
    path: physical_dir.to_path_buf(),
    source,
  };
  for entry in fs::read_dir(physical_dir).map_err(read_error)? {
    let name = entry.map_err(read_error)?.file_name();
    let link = virtual_dir.join(&name);
    let target = physical_dir.join(&name);
    if symlink_if_absent(&target, &link)? {
      log::info!(
        "created kubelet pod symlink {} -> {}",
        link.display(),
        target.display()
      );
    }
  }

  Ok(())
}

//
// Cleanup
//

fn remove_entry(path: &Path) -> bool {
  log::info!("cleaning up {}", path.display());
  let result = match fs::symlink_metadata(path) {
    Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) => Err(e),
  };
  match result {
    Ok(()) => true,
    Err(e) => {
      log::error!("error deleting symlink {}: {e}", path.display());
      false
    },
  }
}

fn read_entries(root: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
  let mut entries = Vec::new();
  for entry in fs::read_dir(root).with_context(|| format!("reading {}", root.display()))? {
    let entry = entry.with_context(|| format!("reading {}", root.display()))?;
    entries.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
  }
  Ok(entries)
}

/// Removes every child of `root` whose path is not in `seen`. Returns the number removed.
pub fn cleanup_unseen(root: &Path, seen: &HashSet<PathBuf>) -> anyhow::Result<usize> {
  Ok(
    read_entries(root)?
      .into_iter()
      .filter(|(_, path)| !seen.contains(path))
      .filter(|(_, path)| remove_entry(path))
      .count(),
  )
}

fn is_dangling(link: &Path) -> bool {
  matches!(fs::metadata(link), Err(e) if e.kind() == io::ErrorKind::NotFound)
}

/// Kubelet pod directories are kept while their owning virtual pod is gone, since backup tooling
/// may still read through them. Only links whose target vanished are removed, and the directory
/// itself once nothing is left in it.
pub fn cleanup_kubelet_pods(root: &Path, seen: &HashSet<PathBuf>) -> anyhow::Result<usize> {
  let mut removed = 0;
  for (_, pod_dir) in read_entries(root)? {
    if seen.contains(&pod_dir) {
      continue;
    }

    let links = match read_entries(&pod_dir) {
      Ok(links) => links,
      Err(e) => {
        log::error!("error iterating over vpod dir {}: {e:#}", pod_dir.display());
        continue;
      },
    };

    let mut remaining = links.len();
    for (_, link) in links {
      if is_dangling(&link) && remove_entry(&link) {
        removed += 1;
        remaining -= 1;
      }
    }

    if remaining == 0 {
      log::info!("cleaning up empty kubelet pod dir {}", pod_dir.display());
      if let Err(e) = fs::remove_dir(&pod_dir) {
        log::error!("error deleting {}: {e}", pod_dir.display());
      }
    }
  }
  Ok(removed)
}

/// Removes container log links whose `name_namespace` prefix is not a live virtual pod. Matching
/// on the pod rather than the full link name keeps links of a pod whose container set changes.
pub fn cleanup_container_logs(
  root: &Path,
  live_pods: &HashSet<String>,
) -> anyhow::Result<usize> {
  Ok(
    read_entries(root)?
      .into_iter()
      .filter(|(name, _)| {
        container_entry_pod_identity(name).is_none_or(|identity| !live_pods.contains(&identity))
      })
      .filter(|(_, path)| remove_entry(path))
      .count(),
  )
}
