// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./clusters_test.rs"]
mod clusters_test;

use crate::config::{MapperConfig, StartOptions};
use crate::mode::NamespaceMode;
use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use bd_shutdown::ComponentShutdown;
use hostpath_common::k8s::object_store::ObjectStore;
use hostpath_common::k8s::{WatchSelectors, node_field_selector, object_name, object_namespace};
use k8s_openapi::api::core::v1::{Namespace, Pod, ServiceAccount};
use kube::Api;
use kube::api::DeleteParams;
use kube::config::{
  AuthInfo,
  Cluster,
  Context as KubeContext,
  KubeConfigOptions,
  Kubeconfig,
  NamedAuthInfo,
  NamedCluster,
  NamedContext,
};
use mockall::automock;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Label the syncer puts on host namespaces it owns in multi-namespace mode.
pub const VCLUSTER_NAMESPACE_LABEL: &str = "vcluster.loft.sh/vcluster-namespace";

const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const READINESS_TIMEOUT: Duration = Duration::from_secs(60 * 60);

//
// HostCluster
//

/// Read access to the host cluster objects relevant to this node, plus pod deletion.
#[automock]
#[async_trait]
pub trait HostCluster: Send + Sync {
  /// Host pods scheduled to this node. In single-namespace mode only the target namespace is
  /// visible.
  fn list_node_pods(&self) -> anyhow::Result<Vec<Pod>>;

  /// Host namespaces owned by this virtual cluster.
  fn list_vcluster_namespaces(&self) -> anyhow::Result<HashSet<String>>;

  async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()>;
}

//
// VirtualCluster
//

#[automock]
pub trait VirtualCluster: Send + Sync {
  /// Virtual pods scheduled to this node.
  fn list_node_pods(&self) -> anyhow::Result<Vec<Pod>>;
}

//
// KubeHostCluster
//

pub struct KubeHostCluster {
  client: kube::Client,
  pods: ObjectStore<Pod>,
  namespaces: Option<ObjectStore<Namespace>>,
}

impl KubeHostCluster {
  /// Starts the host side watches and returns once they have synced.
  pub async fn start(
    client: kube::Client,
    config: &MapperConfig,
    shutdown: &ComponentShutdown,
  ) -> anyhow::Result<Self> {
    let pod_api: Api<Pod> = match config.mode {
      NamespaceMode::Single => Api::namespaced(client.clone(), &config.target_namespace),
      NamespaceMode::Multi => Api::all(client.clone()),
    };
    let pods = ObjectStore::watch(
      "host pods",
      pod_api,
      WatchSelectors {
        field: Some(node_field_selector(&config.node_name)),
        label: None,
      },
      shutdown.clone(),
    )
    .await?;

    let namespaces = match config.mode {
      NamespaceMode::Single => None,
      NamespaceMode::Multi => Some(
        ObjectStore::watch(
          "host namespaces",
          Api::all(client.clone()),
          WatchSelectors {
            field: None,
            label: Some(format!(
              "{VCLUSTER_NAMESPACE_LABEL}={}",
              config.target_namespace
            )),
          },
          shutdown.clone(),
        )
        .await?,
      ),
    };

    Ok(Self {
      client,
      pods,
      namespaces,
    })
  }
}

#[async_trait]
impl HostCluster for KubeHostCluster {
  fn list_node_pods(&self) -> anyhow::Result<Vec<Pod>> {
    self.pods.list()
  }

  fn list_vcluster_namespaces(&self) -> anyhow::Result<HashSet<String>> {
    let namespaces = self
      .namespaces
      .as_ref()
      .ok_or_else(|| anyhow!("namespaces are only watched in multi-namespace mode"))?;
    Ok(
      namespaces
        .list()?
        .iter()
        .map(|namespace| object_name(&namespace.metadata).to_string())
        .collect(),
    )
  }

  async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
    let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
    pod_api.delete(name, &DeleteParams::default()).await?;
    Ok(())
  }
}

//
// KubeVirtualCluster
//

pub struct KubeVirtualCluster {
  pods: ObjectStore<Pod>,
}

impl KubeVirtualCluster {
  pub async fn start(
    client: kube::Client,
    node_name: &str,
    shutdown: &ComponentShutdown,
  ) -> anyhow::Result<Self> {
    let pods = ObjectStore::watch(
      "virtual pods",
      Api::all(client),
      WatchSelectors {
        field: Some(node_field_selector(node_name)),
        label: None,
      },
      shutdown.clone(),
    )
    .await?;
    Ok(Self { pods })
  }
}

impl VirtualCluster for KubeVirtualCluster {
  fn list_node_pods(&self) -> anyhow::Result<Vec<Pod>> {
    self.pods.list()
  }
}

//
// Virtual cluster connection
//

fn path_string(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

fn virtual_kubeconfig(options: &StartOptions) -> Kubeconfig {
  let name = &options.name;
  Kubeconfig {
    clusters: vec![NamedCluster {
      name: name.clone(),
      cluster: Some(Cluster {
        server: Some(format!("https://{name}")),
        tls_server_name: Some(name.clone()),
        certificate_authority: Some(path_string(&options.server_ca_cert)),
        ..Default::default()
      }),
    }],
    auth_infos: vec![NamedAuthInfo {
      name: name.clone(),
      auth_info: Some(AuthInfo {
        client_certificate: Some(path_string(&options.client_ca_cert)),
        client_key: Some(path_string(&options.server_ca_key)),
        ..Default::default()
      }),
    }],
    contexts: vec![NamedContext {
      name: name.clone(),
      context: Some(KubeContext {
        cluster: name.clone(),
        user: Some(name.clone()),
        ..Default::default()
      }),
    }],
    current_context: Some(name.clone()),
    ..Default::default()
  }
}

async fn try_connect_virtual(options: &StartOptions) -> anyhow::Result<kube::Client> {
  let config =
    kube::Config::from_custom_kubeconfig(virtual_kubeconfig(options), &KubeConfigOptions::default())
      .await?;
  let client = kube::Client::try_from(config)?;

  client
    .apiserver_version()
    .await
    .context("couldn't retrieve virtual cluster version")?;

  let service_account_api: Api<ServiceAccount> = Api::namespaced(client.clone(), "default");
  service_account_api
    .get("default")
    .await
    .context("default ServiceAccount is not available yet")?;

  Ok(client)
}

/// Polls until the virtual API server answers and has created its default service account.
pub async fn wait_for_virtual_cluster(
  options: &StartOptions,
  shutdown: &ComponentShutdown,
) -> anyhow::Result<kube::Client> {
  let mut shutdown = shutdown.clone();
  let poll = async {
    loop {
      match try_connect_virtual(options).await {
        Ok(client) => return client,
        Err(e) => {
          log::info!(
            "virtual cluster not ready ({e:#}), will retry in {} seconds",
            READINESS_POLL_INTERVAL.as_secs()
          );
        },
      }
      tokio::time::sleep(READINESS_POLL_INTERVAL).await;
    }
  };

  tokio::select! {
    () = shutdown.cancelled() => bail!("shutdown while waiting for the virtual cluster"),
    result = tokio::time::timeout(READINESS_TIMEOUT, poll) => {
      result.map_err(|_| {
        anyhow!(
          "virtual cluster not ready after {} minutes",
          READINESS_TIMEOUT.as_secs() / 60
        )
      })
    },
  }
}

/// Connects to the host cluster this pod runs in.
pub async fn connect_host() -> anyhow::Result<kube::Client> {
  Ok(kube::Client::try_default().await?)
}

/// Formats `namespace/name` for a pod in log messages.
#[must_use]
pub fn pod_display_name(pod: &Pod) -> String {
  format!(
    "{}/{}",
    object_namespace(&pod.metadata),
    object_name(&pod.metadata)
  )
}
