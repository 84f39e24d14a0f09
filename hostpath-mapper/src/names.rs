// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./names_test.rs"]
mod names_test;

use sha2::{Digest, Sha256};

const MAX_NAME_LENGTH: usize = 63;
const TRUNCATED_PREFIX_LENGTH: usize = 52;
const DIGEST_SUFFIX_LENGTH: usize = 10;

/// Directory name kubelet uses for a pod under the pod log root: `namespace_name_uid`.
#[must_use]
pub fn pod_log_token(namespace: &str, name: &str, uid: &str) -> String {
  format!("{namespace}_{name}_{uid}")
}

/// Key identifying a pod among container log entries: `name_namespace`.
#[must_use]
pub fn pod_identity(name: &str, namespace: &str) -> String {
  format!("{name}_{namespace}")
}

/// File name kubelet uses under the container log root:
/// `<pod_name>_<namespace>_<container_name>-<container_id>.log`.
#[must_use]
pub fn container_log_name(
  pod_name: &str,
  namespace: &str,
  container_name: &str,
  container_id: &str,
) -> String {
  format!("{pod_name}_{namespace}_{container_name}-{container_id}.log")
}

/// Strips the runtime scheme (`containerd://`, `docker://`, ...) from a container status id.
#[must_use]
pub fn strip_runtime_prefix(container_id: &str) -> &str {
  container_id
    .split_once("://")
    .map_or(container_id, |(_, id)| id)
}

/// Returns the `name_namespace` prefix of a container log entry, if it has one.
#[must_use]
pub fn container_entry_pod_identity(entry_name: &str) -> Option<String> {
  let mut parts = entry_name.split('_');
  let name = parts.next()?;
  let namespace = parts.next()?;
  Some(pod_identity(name, namespace))
}

/// Joins `parts` with `-`, hashing the tail when the result is longer than a DNS label allows.
#[must_use]
pub fn safe_concat_name(parts: &[&str]) -> String {
  let full = parts.join("-");
  if full.len() <= MAX_NAME_LENGTH {
    return full;
  }

  let digest = hex::encode(Sha256::digest(full.as_bytes()));
  format!(
    "{}-{}",
    &full[.. TRUNCATED_PREFIX_LENGTH],
    &digest[.. DIGEST_SUFFIX_LENGTH]
  )
  .replace(".-", "-")
}

//
// Translator
//

/// Maps a virtual pod name to the name of the pod backing it in the host cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Translator {
  /// All virtual namespaces are folded into one host namespace, so the name carries the virtual
  /// namespace and the cluster name.
  SingleNamespace { vcluster_name: String },
  /// Every virtual namespace gets its own host namespace, so names are kept as is.
  MultiNamespace,
}

impl Translator {
  #[must_use]
  pub fn host_name(&self, virtual_name: &str, virtual_namespace: &str) -> String {
    match self {
      Self::SingleNamespace { vcluster_name } => {
        safe_concat_name(&[virtual_name, "x", virtual_namespace, "x", vcluster_name])
      },
      Self::MultiNamespace => virtual_name.to_string(),
    }
  }
}
