// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./mode_test.rs"]
mod mode_test;

use crate::config::{VclusterConfig, config_secret_name};
use crate::names::Translator;
use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PodSpec, Secret};
use kube::Api;
use mockall::automock;

/// Syncer argument that turns on multi-namespace mode.
pub const MULTI_NAMESPACE_MODE_MARKER: &str = "multi-namespace-mode";
pub const SYNCER_CONTAINER: &str = "syncer";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceMode {
  Single,
  Multi,
}

impl NamespaceMode {
  #[must_use]
  pub fn translator(self, vcluster_name: &str) -> Translator {
    match self {
      Self::Single => Translator::SingleNamespace {
        vcluster_name: vcluster_name.to_string(),
      },
      Self::Multi => Translator::MultiNamespace,
    }
  }
}

//
// ModeSource
//

/// Host cluster reads needed to decide the namespace mode. Absent objects are `Ok(None)`.
#[automock]
#[async_trait]
pub trait ModeSource: Send + Sync {
  async fn config_secret(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Secret>>;

  /// The pod template of the syncer workload, looked up as a StatefulSet first and a Deployment
  /// second. `Ok(None)` means neither exists; a workload without a pod template is an error.
  async fn syncer_pod_spec(&self, namespace: &str, name: &str)
  -> anyhow::Result<Option<PodSpec>>;
}

pub struct KubeModeSource {
  client: kube::Client,
}

impl KubeModeSource {
  #[must_use]
  pub const fn new(client: kube::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl ModeSource for KubeModeSource {
  async fn config_secret(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Secret>> {
    let secret_api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
    Ok(secret_api.get_opt(name).await?)
  }

  async fn syncer_pod_spec(
    &self,
    namespace: &str,
    name: &str,
  ) -> anyhow::Result<Option<PodSpec>> {
    let sts_api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
    if let Some(sts) = sts_api.get_opt(name).await? {
      return workload_pod_spec(
        "statefulset",
        namespace,
        name,
        sts.spec.and_then(|spec| spec.template.spec),
      )
      .map(Some);
    }

    // Distros without an embedded datastore run the syncer as a deployment.
    let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
    let Some(deploy) = deploy_api
      .get_opt(name)
      .await
      .inspect_err(|e| log::error!("error looking for vcluster deployment: {e}"))?
    else {
      return Ok(None);
    };
    workload_pod_spec(
      "deployment",
      namespace,
      name,
      deploy.spec.and_then(|spec| spec.template.spec),
    )
    .map(Some)
  }
}

fn workload_pod_spec(
  kind: &str,
  namespace: &str,
  name: &str,
  spec: Option<PodSpec>,
) -> anyhow::Result<PodSpec> {
  spec.ok_or_else(|| anyhow!("{kind} {namespace}/{name} has no pod template"))
}

fn has_multi_namespace_marker(spec: &PodSpec) -> bool {
  spec
    .containers
    .iter()
    .filter(|container| container.name == SYNCER_CONTAINER)
    .flat_map(|container| container.args.iter().flatten())
    .any(|arg| arg.contains(MULTI_NAMESPACE_MODE_MARKER))
}

/// Decides whether the virtual cluster translates into one host namespace or many. The config
/// secret wins when it enables multi-namespace mode, otherwise the syncer's arguments decide.
pub async fn resolve_mode(
  source: &dyn ModeSource,
  vcluster_name: &str,
  target_namespace: &str,
) -> anyhow::Result<NamespaceMode> {
  let secret_name = config_secret_name(vcluster_name);
  if let Some(secret) = source
    .config_secret(target_namespace, &secret_name)
    .await
    .with_context(|| format!("reading secret {target_namespace}/{secret_name}"))?
  {
    let config = VclusterConfig::from_secret(&secret)?;
    if config.experimental.multi_namespace_mode.enabled {
      log::info!("multi-namespace mode enabled via {secret_name}");
      return Ok(NamespaceMode::Multi);
    }
  }

  let Some(spec) = source
    .syncer_pod_spec(target_namespace, vcluster_name)
    .await?
  else {
    bail!(
      "could not find vcluster {target_namespace}/{vcluster_name} either in statefulset or \
       deployment"
    );
  };

  if has_multi_namespace_marker(&spec) {
    log::info!("multi-namespace mode enabled via syncer arguments");
    return Ok(NamespaceMode::Multi);
  }

  log::info!("using single-namespace mode");
  Ok(NamespaceMode::Single)
}
