// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./restart_test.rs"]
mod restart_test;

use crate::clusters::{HostCluster, pod_display_name};
use crate::config::{KUBELET_POD_HOST_PATH, LOG_HOST_PATH, POD_LOG_HOST_PATH};
use anyhow::Context;
use hostpath_common::k8s::{object_name, object_namespace};
use k8s_openapi::api::core::v1::Pod;

/// Host paths that pods mounted before the mapped layout existed.
pub const LEGACY_HOST_PATHS: [&str; 3] = [POD_LOG_HOST_PATH, LOG_HOST_PATH, KUBELET_POD_HOST_PATH];

#[must_use]
pub fn mounts_legacy_host_path(pod: &Pod) -> bool {
  pod
    .spec
    .as_ref()
    .and_then(|spec| spec.volumes.as_ref())
    .into_iter()
    .flatten()
    .filter_map(|volume| volume.host_path.as_ref())
    .any(|host_path| LEGACY_HOST_PATHS.contains(&host_path.path.as_str()))
}

/// Deletes the host pods on this node that still mount a legacy log path so they are recreated
/// with the mapped layout. Returns the number of pods deleted.
pub async fn restart_legacy_pods(
  host: &dyn HostCluster,
  own_pod_name: Option<&str>,
) -> anyhow::Result<usize> {
  let pods = host.list_node_pods().context("unable to list pods")?;

  let restart_list: Vec<&Pod> = pods
    .iter()
    .filter(|pod| {
      let name = object_name(&pod.metadata);
      if Some(name) == own_pod_name {
        log::info!("skipping self pod {name}");
        return false;
      }
      log::info!("processing pod {name}");
      mounts_legacy_host_path(pod)
    })
    .inspect(|pod| log::info!("adding pod {} to restart list", pod_display_name(pod)))
    .collect();

  log::info!("restart list {}", restart_list.len());

  let mut deleted = 0;
  for pod in restart_list {
    log::info!("deleting physical pod {}", pod_display_name(pod));
    match host
      .delete_pod(object_namespace(&pod.metadata), object_name(&pod.metadata))
      .await
    {
      Ok(()) => deleted += 1,
      Err(e) => log::error!("error deleting target pod {}: {e:#}", pod_display_name(pod)),
    }
  }

  Ok(deleted)
}
