// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

use crate::mode::NamespaceMode;
use crate::names::Translator;
use k8s_openapi::api::core::v1::Secret;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILENAME: &str = "config.yaml";

/// Host log root. Mounting it directly into a pod is the legacy layout.
pub const LOG_HOST_PATH: &str = "/var/log";
pub const POD_LOG_HOST_PATH: &str = "/var/log/pods";
pub const CONTAINER_LOG_HOST_PATH: &str = "/var/log/containers";
pub const KUBELET_POD_HOST_PATH: &str = "/var/lib/kubelet/pods";

/// Where the host pod log and kubelet pod directories are visible to consumers of the virtual
/// tree.
pub const PHYSICAL_POD_LOG_MOUNT_PATH: &str = "/var/vcluster/physical/log/pods";
pub const PHYSICAL_KUBELET_POD_MOUNT_PATH: &str = "/var/vcluster/physical/kubelet/pods";

const VIRTUAL_PATH_ROOT: &str = "/tmp/vcluster";

#[must_use]
pub fn config_secret_name(vcluster_name: &str) -> String {
  format!("vc-config-{vcluster_name}")
}

//
// StartOptions
//

#[derive(clap::Args, Clone, Debug)]
pub struct StartOptions {
  /// The path to the client ca certificate
  #[arg(long = "client-ca-cert", default_value = "/data/server/tls/client-certificate")]
  pub client_ca_cert: PathBuf,

  /// The path to the server ca certificate
  #[arg(long = "server-ca-cert", default_value = "/data/server/tls/certificate-authority")]
  pub server_ca_cert: PathBuf,

  /// The path to the server ca key
  #[arg(long = "server-ca-key", default_value = "/data/server/tls/client-key")]
  pub server_ca_key: PathBuf,

  /// The namespace to run the virtual cluster in (defaults to current namespace)
  #[arg(long = "target-namespace")]
  pub target_namespace: Option<String>,

  /// The name of the virtual cluster
  #[arg(long = "name", default_value = "vcluster")]
  pub name: String,

  /// If this is the init container
  #[arg(long = "init")]
  pub init: bool,
}

//
// MapperPaths
//

/// Every filesystem root the mapper touches. Production uses `/` as the prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapperPaths {
  pub virtual_root: PathBuf,
  pub virtual_logs: PathBuf,
  pub virtual_pod_logs: PathBuf,
  pub virtual_container_logs: PathBuf,
  pub virtual_kubelet_pods: PathBuf,
  pub host_logs: PathBuf,
  pub host_pod_logs: PathBuf,
  pub host_container_logs: PathBuf,
  pub host_kubelet_pods: PathBuf,
  pub physical_pod_logs: PathBuf,
  pub physical_kubelet_pods: PathBuf,
}

fn under(prefix: &Path, absolute: &str) -> PathBuf {
  prefix.join(absolute.trim_start_matches('/'))
}

impl MapperPaths {
  #[must_use]
  pub fn new(target_namespace: &str, vcluster_name: &str) -> Self {
    Self::under(Path::new("/"), target_namespace, vcluster_name)
  }

  #[must_use]
  pub fn under(prefix: &Path, target_namespace: &str, vcluster_name: &str) -> Self {
    let virtual_root = under(prefix, VIRTUAL_PATH_ROOT)
      .join(target_namespace)
      .join(vcluster_name);
    let virtual_logs = virtual_root.join("log");
    Self {
      virtual_pod_logs: virtual_logs.join("pods"),
      virtual_container_logs: virtual_logs.join("containers"),
      virtual_kubelet_pods: virtual_root.join("kubelet").join("pods"),
      virtual_logs,
      virtual_root,
      host_logs: under(prefix, LOG_HOST_PATH),
      host_pod_logs: under(prefix, POD_LOG_HOST_PATH),
      host_container_logs: under(prefix, CONTAINER_LOG_HOST_PATH),
      host_kubelet_pods: under(prefix, KUBELET_POD_HOST_PATH),
      physical_pod_logs: under(prefix, PHYSICAL_POD_LOG_MOUNT_PATH),
      physical_kubelet_pods: under(prefix, PHYSICAL_KUBELET_POD_MOUNT_PATH),
    }
  }
}

//
// MapperConfig
//

/// Immutable process configuration, built once the namespace mode is known.
#[derive(Clone, Debug)]
pub struct MapperConfig {
  pub vcluster_name: String,
  pub target_namespace: String,
  pub node_name: String,
  pub mode: NamespaceMode,
  pub translator: Translator,
  pub paths: MapperPaths,
}

impl MapperConfig {
  #[must_use]
  pub fn new(
    vcluster_name: &str,
    target_namespace: &str,
    node_name: &str,
    mode: NamespaceMode,
    paths: MapperPaths,
  ) -> Self {
    Self {
      vcluster_name: vcluster_name.to_string(),
      target_namespace: target_namespace.to_string(),
      node_name: node_name.to_string(),
      translator: mode.translator(vcluster_name),
      mode,
      paths,
    }
  }
}

//
// VclusterConfig
//

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("key 'config.yaml' not found in secret")]
  MissingKey,
  #[error("unmarshal config.yaml: {0}")]
  Decode(#[from] serde_yaml::Error),
}

/// The part of the virtual cluster config the mapper consumes. Sections owned by other components
/// are accepted without validation.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VclusterConfig {
  #[serde(default)]
  pub experimental: Experimental,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Experimental {
  #[serde(default)]
  pub multi_namespace_mode: MultiNamespaceMode,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MultiNamespaceMode {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default)]
  pub namespace_labels: BTreeMap<String, String>,
}

impl VclusterConfig {
  pub fn from_yaml(yaml: &[u8]) -> Result<Self, ConfigError> {
    Ok(serde_yaml::from_slice(yaml)?)
  }

  pub fn from_secret(secret: &Secret) -> Result<Self, ConfigError> {
    let raw = secret
      .data
      .as_ref()
      .and_then(|data| data.get(CONFIG_FILENAME))
      .ok_or(ConfigError::MissingKey)?;
    Self::from_yaml(&raw.0).inspect_err(|e| log::error!("{e}"))
  }
}
