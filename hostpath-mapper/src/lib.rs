// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

pub mod clusters;
pub mod config;
pub mod containers;
pub mod locator;
pub mod mode;
pub mod names;
pub mod reconciler;
pub mod restart;
pub mod symlinks;

use anyhow::Context;
use bd_shutdown::ComponentShutdown;
use clusters::{
  HostCluster,
  KubeHostCluster,
  KubeVirtualCluster,
  connect_host,
  wait_for_virtual_cluster,
};
use config::{MapperConfig, MapperPaths, StartOptions};
use hostpath_common::k8s::{current_namespace, node_name, own_pod_name};
use mode::{KubeModeSource, resolve_mode};
use reconciler::HostPathMapper;
use restart::restart_legacy_pods;
use std::sync::Arc;

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  hostpath_common::global_initialize();
}

/// Runs the `start` command until `shutdown` fires or a fatal error occurs. In init mode the
/// legacy pod restart is performed once and the function returns.
pub async fn run_start(options: StartOptions, shutdown: ComponentShutdown) -> anyhow::Result<()> {
  let target_namespace = match options.target_namespace.as_deref() {
    Some(namespace) if !namespace.is_empty() => namespace.to_string(),
    _ => current_namespace()?,
  };
  let node_name = node_name()?;
  let paths = MapperPaths::new(&target_namespace, &options.name);
  log::info!(
    "mapping vcluster {target_namespace}/{} on node {node_name}",
    options.name
  );

  let host_client = connect_host().await.context("create host kube client")?;
  let virtual_client = wait_for_virtual_cluster(&options, &shutdown).await?;

  let mode = resolve_mode(
    &KubeModeSource::new(host_client.clone()),
    &options.name,
    &target_namespace,
  )
  .await
  .context("find vcluster mode")?;
  let config = Arc::new(MapperConfig::new(
    &options.name,
    &target_namespace,
    &node_name,
    mode,
    paths,
  ));

  let host: Arc<dyn HostCluster> = Arc::new(
    KubeHostCluster::start(host_client, &config, &shutdown)
      .await
      .context("start host cluster watches")?,
  );

  if options.init {
    log::info!("is init container mode");
    let deleted = restart_legacy_pods(host.as_ref(), own_pod_name().as_deref()).await?;
    log::info!("deleted {deleted} pods mounting legacy host paths");
    return Ok(());
  }

  let virtual_cluster = Arc::new(
    KubeVirtualCluster::start(virtual_client, &node_name, &shutdown)
      .await
      .context("start virtual cluster watches")?,
  );
  let mapper = HostPathMapper::new(config, host, virtual_cluster);
  mapper.ensure_roots()?;
  mapper.run(shutdown).await
}
