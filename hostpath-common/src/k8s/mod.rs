// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

pub mod object_store;
pub mod test;
mod watcher_base;

pub use watcher_base::WatchSelectors;

use anyhow::anyhow;
use kube::api::ObjectMeta;

/// Environment variable carrying the name of the node this agent governs.
pub const NODE_NAME_ENV: &str = "VCLUSTER_HOSTPATH_MAPPER_CURRENT_NODE_NAME";

/// Environment variable carrying the agent's own pod name.
pub const POD_NAME_ENV: &str = "POD_NAME";

const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
  "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

#[must_use]
pub fn missing_node_name_error() -> anyhow::Error {
  anyhow!("Kubernetes node name not specified via {NODE_NAME_ENV}")
}

/// Returns the node name this process is scoped to.
pub fn node_name() -> anyhow::Result<String> {
  std::env::var(NODE_NAME_ENV)
    .ok()
    .filter(|name| !name.is_empty())
    .ok_or_else(missing_node_name_error)
}

/// Returns the name of the pod this process runs in, if the environment provides it.
#[must_use]
pub fn own_pod_name() -> Option<String> {
  std::env::var(POD_NAME_ENV)
    .ok()
    .filter(|name| !name.is_empty())
}

/// Returns the namespace of the service account mounted into this pod.
pub fn current_namespace() -> anyhow::Result<String> {
  let namespace = std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE)
    .map_err(|e| anyhow!("unable to read {SERVICE_ACCOUNT_NAMESPACE_FILE}: {e}"))?;
  Ok(namespace.trim().to_string())
}

/// Returns the namespace for the provided object.
#[must_use]
pub fn object_namespace(meta: &ObjectMeta) -> &str {
  meta.namespace.as_deref().unwrap_or("default")
}

#[must_use]
pub fn object_name(meta: &ObjectMeta) -> &str {
  meta.name.as_deref().unwrap_or_default()
}

#[must_use]
pub fn object_uid(meta: &ObjectMeta) -> &str {
  meta.uid.as_deref().unwrap_or_default()
}

/// Field selector restricting pod listings to a single node.
#[must_use]
pub fn node_field_selector(node_name: &str) -> String {
  format!("spec.nodeName={node_name}")
}
