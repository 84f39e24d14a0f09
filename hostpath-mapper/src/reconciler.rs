// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./reconciler_test.rs"]
mod reconciler_test;

use crate::clusters::{HostCluster, VirtualCluster, pod_display_name};
use crate::config::MapperConfig;
use crate::containers::create_container_links;
use crate::locator::physical_pod_map;
use crate::names::{pod_identity, pod_log_token};
use crate::symlinks::{
  MapperError,
  cleanup_container_logs,
  cleanup_kubelet_pods,
  cleanup_unseen,
  create_kubelet_links,
  create_pod_log_link,
};
use bd_shutdown::ComponentShutdown;
use hostpath_common::k8s::{object_name, object_namespace, object_uid};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use time::ext::NumericalStdDuration;

/// Outcome of a pass that ran to completion.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
  pub virtual_pods: usize,
  /// Host pods linked to a virtual pod.
  pub mapped_pods: usize,
  pub removed_entries: usize,
}

//
// HostPathMapper
//

/// Keeps the virtual log and kubelet trees pointing at the host pods that back the virtual pods
/// on this node.
pub struct HostPathMapper {
  config: Arc<MapperConfig>,
  host: Arc<dyn HostCluster>,
  virtual_cluster: Arc<dyn VirtualCluster>,
}

impl HostPathMapper {
  #[must_use]
  pub fn new(
    config: Arc<MapperConfig>,
    host: Arc<dyn HostCluster>,
    virtual_cluster: Arc<dyn VirtualCluster>,
  ) -> Self {
    Self {
      config,
      host,
      virtual_cluster,
    }
  }

  /// Creates the virtual roots links are placed under.
  pub fn ensure_roots(&self) -> Result<(), MapperError> {
    let paths = &self.config.paths;
    for root in [
      &paths.virtual_pod_logs,
      &paths.virtual_container_logs,
      &paths.virtual_kubelet_pods,
    ] {
      std::fs::create_dir_all(root).map_err(|source| MapperError::CreateDir {
        path: root.clone(),
        source,
      })?;
    }
    Ok(())
  }

  /// Runs a single pass. Returns `Ok(None)` if a listing failed and the pass ended early. Errors
  /// are filesystem failures the process cannot recover from.
  pub fn reconcile(&self) -> Result<Option<PassSummary>, MapperError> {
    let mut mappings = match physical_pod_map(&self.config, self.host.as_ref()) {
      Ok(mappings) => mappings,
      Err(e) => {
        log::error!("unable to get physical pod mapping: {e:#}");
        return Ok(None);
      },
    };

    let virtual_pods = match self.virtual_cluster.list_node_pods() {
      Ok(pods) => pods,
      Err(e) => {
        log::error!("unable to list virtual pods: {e:#}");
        return Ok(None);
      },
    };

    let paths = &self.config.paths;
    let mut live_pods = HashSet::new();
    let mut seen_pod_logs: HashSet<PathBuf> = HashSet::new();
    let mut seen_kubelet_pods: HashSet<PathBuf> = HashSet::new();
    let mut summary = PassSummary {
      virtual_pods: virtual_pods.len(),
      ..Default::default()
    };

    for virtual_pod in &virtual_pods {
      let name = object_name(&virtual_pod.metadata);
      let namespace = object_namespace(&virtual_pod.metadata);
      let uid = object_uid(&virtual_pod.metadata);
      live_pods.insert(pod_identity(name, namespace));

      let host_name = self.config.translator.host_name(name, namespace);
      let Some(detail) = mappings.get_mut(&host_name) else {
        log::debug!("no host pod {host_name} for {namespace}/{name} yet");
        continue;
      };

      let token = pod_log_token(namespace, name, uid);
      let pod_log_link = paths.virtual_pod_logs.join(&token);
      seen_pod_logs.insert(pod_log_link.clone());
      create_pod_log_link(&pod_log_link, &paths.physical_pod_logs.join(&detail.target))?;
      detail.symlink_name = Some(pod_log_link);

      let kubelet_pod_dir = paths.virtual_kubelet_pods.join(uid);
      seen_kubelet_pods.insert(kubelet_pod_dir.clone());
      create_kubelet_links(
        &kubelet_pod_dir,
        &paths
          .physical_kubelet_pods
          .join(object_uid(&detail.physical_pod.metadata)),
      )?;

      create_container_links(
        paths,
        virtual_pod,
        &detail.physical_pod,
        &paths.host_pod_logs.join(&token),
      )?;
    }

    for detail in mappings.values() {
      if detail.symlink_name.is_some() {
        summary.mapped_pods += 1;
      } else {
        log::debug!(
          "host pod {} has no virtual pod on this node",
          pod_display_name(&detail.physical_pod)
        );
      }
    }

    for (kind, result) in [
      ("pod log", cleanup_unseen(&paths.virtual_pod_logs, &seen_pod_logs)),
      (
        "container log",
        cleanup_container_logs(&paths.virtual_container_logs, &live_pods),
      ),
      (
        "kubelet pod",
        cleanup_kubelet_pods(&paths.virtual_kubelet_pods, &seen_kubelet_pods),
      ),
    ] {
      match result {
        Ok(removed) => summary.removed_entries += removed,
        Err(e) => log::error!("error cleaning up old {kind} paths: {e:#}"),
      }
    }

    log::info!(
      "successfully reconciled mapper: {} virtual pods, {} mapped, {} stale entries removed",
      summary.virtual_pods,
      summary.mapped_pods,
      summary.removed_entries
    );
    Ok(Some(summary))
  }

  /// Reconciles every 5 seconds until `shutdown` fires or a pass fails fatally.
  pub async fn run(self, mut shutdown: ComponentShutdown) -> anyhow::Result<()> {
    log::info!("mapping hostpaths");
    loop {
      self.reconcile()?;

      tokio::select! {
        () = shutdown.cancelled() => {
          log::info!("shutting down hostpath mapper");
          return Ok(());
        },
        () = tokio::time::sleep(5.std_seconds()) => {},
      }
    }
  }
}
