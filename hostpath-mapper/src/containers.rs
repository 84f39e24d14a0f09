// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./containers_test.rs"]
mod containers_test;

use crate::config::MapperPaths;
use crate::names::{container_log_name, strip_runtime_prefix};
use crate::symlinks::{MapperError, symlink_if_absent};
use hostpath_common::k8s::{object_name, object_namespace};
use k8s_openapi::api::core::v1::Pod;
use std::io;
use std::path::Path;

/// Returns the file a host container log link points at, e.g. `0.log`. Kubelet suffixes the file
/// with a restart generation, so the only way to learn it is to follow the host's own link.
pub fn physical_log_filename(host_container_logs: &Path, physical_entry: &str) -> io::Result<String> {
  let destination = std::fs::read_link(host_container_logs.join(physical_entry))?;
  destination
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .ok_or_else(|| {
      io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} has no file name", destination.display()),
      )
    })
}

/// Links `<virtual container logs>/<vpod>_<vns>_<container>-<id>.log` to
/// `<target_dir>/<container>/<file>` for every container status of the virtual pod. Containers
/// the host has not started yet are skipped and picked up on a later pass.
pub fn create_container_links(
  paths: &MapperPaths,
  virtual_pod: &Pod,
  physical_pod: &Pod,
  target_dir: &Path,
) -> Result<(), MapperError> {
  let virtual_name = object_name(&virtual_pod.metadata);
  let virtual_namespace = object_namespace(&virtual_pod.metadata);
  let physical_name = object_name(&physical_pod.metadata);
  let physical_namespace = object_namespace(&physical_pod.metadata);

  let statuses = virtual_pod
    .status
    .as_ref()
    .and_then(|status| status.container_statuses.as_deref())
    .unwrap_or_default();

  for status in statuses {
    let Some(container_id) = status.container_id.as_deref().map(strip_runtime_prefix) else {
      log::debug!(
        "container {} of {virtual_namespace}/{virtual_name} has no runtime id yet",
        status.name
      );
      continue;
    };

    let physical_entry =
      container_log_name(physical_name, physical_namespace, &status.name, container_id);
    let file_name = match physical_log_filename(&paths.host_container_logs, &physical_entry) {
      Ok(file_name) => file_name,
      Err(e) => {
        log::warn!(
          "error reading destination filename from physical container symlink {physical_entry}: {e}"
        );
        continue;
      },
    };

    let link = paths.virtual_container_logs.join(container_log_name(
      virtual_name,
      virtual_namespace,
      &status.name,
      container_id,
    ));
    let target = target_dir.join(&status.name).join(file_name);
    if symlink_if_absent(&target, &link)? {
      log::info!(
        "created container:{} -> pod:{} symlink",
        link.display(),
        target.display()
      );
    }
  }

  Ok(())
}
