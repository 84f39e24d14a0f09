// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./locator_test.rs"]
mod locator_test;

use crate::clusters::{HostCluster, pod_display_name};
use crate::config::MapperConfig;
use crate::mode::NamespaceMode;
use crate::names::pod_log_token;
use anyhow::Context;
use hostpath_common::k8s::{object_name, object_namespace, object_uid};
use k8s_openapi::api::core::v1::Pod;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Host pods on this node with materialized log directories, keyed by host pod name.
pub type PhysicalPodMap = HashMap<String, PodDetail>;

#[derive(Clone, Debug)]
pub struct PodDetail {
  /// `namespace_name_uid` of the host pod, the name of its log directory.
  pub target: String,
  /// The virtual pod log link created for this pod during the current pass. `None` after the pass
  /// means no virtual pod on this node maps to the host pod.
  pub symlink_name: Option<PathBuf>,
  pub physical_pod: Pod,
}

/// Keeps the pods whose namespace is in `namespaces`, preserving order.
#[must_use]
pub fn filter_by_namespace(pods: Vec<Pod>, namespaces: &HashSet<String>) -> Vec<Pod> {
  pods
    .into_iter()
    .filter(|pod| namespaces.contains(object_namespace(&pod.metadata)))
    .collect()
}

/// Builds this pass's view of the host pods backing virtual pods on this node.
pub fn physical_pod_map(
  config: &MapperConfig,
  host: &dyn HostCluster,
) -> anyhow::Result<PhysicalPodMap> {
  let pods = host.list_node_pods().context("unable to list pods")?;
  let pods = match config.mode {
    NamespaceMode::Single => pods,
    NamespaceMode::Multi => {
      let namespaces = host
        .list_vcluster_namespaces()
        .context("unable to list namespaces")?;
      filter_by_namespace(pods, &namespaces)
    },
  };

  let mut mappings = PhysicalPodMap::with_capacity(pods.len());
  for pod in pods {
    let target = pod_log_token(
      object_namespace(&pod.metadata),
      object_name(&pod.metadata),
      object_uid(&pod.metadata),
    );

    let log_dir = config.paths.host_pod_logs.join(&target);
    match log_dir.try_exists() {
      Ok(true) => {},
      Ok(false) => continue,
      Err(e) => {
        log::error!("error checking existence for path {}: {e}", log_dir.display());
        continue;
      },
    }

    // TODO: pods sharing a name across host namespaces collapse into the first one listed; key
    // by namespace as well once translation exposes the host namespace.
    let name = object_name(&pod.metadata).to_string();
    if let Some(existing) = mappings.get(&name) {
      log::warn!(
        "ignoring {}, host pod name already mapped to {}",
        pod_display_name(&pod),
        existing.target
      );
      continue;
    }
    mappings.insert(
      name,
      PodDetail {
        target,
        symlink_name: None,
        physical_pod: pod,
      },
    );
  }

  Ok(mappings)
}
