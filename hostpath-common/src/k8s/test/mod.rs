// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use k8s_openapi::api::core::v1::{
  ContainerStatus,
  HostPathVolumeSource,
  Namespace,
  Pod,
  PodSpec,
  PodStatus,
  Volume,
};
use kube::api::ObjectMeta;

#[must_use]
pub fn make_object_meta(namespace: &str, name: &str, uid: &str) -> ObjectMeta {
  ObjectMeta {
    name: Some(name.to_string()),
    namespace: Some(namespace.to_string()),
    uid: Some(uid.to_string()),
    ..Default::default()
  }
}

#[must_use]
pub fn make_pod(namespace: &str, name: &str, uid: &str) -> Pod {
  Pod {
    metadata: make_object_meta(namespace, name, uid),
    spec: Some(PodSpec {
      node_name: Some("node_name".to_string()),
      ..Default::default()
    }),
    ..Default::default()
  }
}

#[must_use]
pub fn make_namespace(name: &str) -> Namespace {
  Namespace {
    metadata: ObjectMeta {
      name: Some(name.to_string()),
      ..Default::default()
    },
    ..Default::default()
  }
}

/// Adds a hostPath volume mounting `path` to the pod.
#[must_use]
pub fn with_host_path_volume(mut pod: Pod, volume_name: &str, path: &str) -> Pod {
  pod
    .spec
    .get_or_insert_with(PodSpec::default)
    .volumes
    .get_or_insert_with(Vec::new)
    .push(Volume {
      name: volume_name.to_string(),
      host_path: Some(HostPathVolumeSource {
        path: path.to_string(),
        type_: None,
      }),
      ..Default::default()
    });
  pod
}

/// Adds a container status with the given runtime id (e.g. `containerd://abc`).
#[must_use]
pub fn with_container_status(mut pod: Pod, container_name: &str, container_id: &str) -> Pod {
  pod
    .status
    .get_or_insert_with(PodStatus::default)
    .container_statuses
    .get_or_insert_with(Vec::new)
    .push(ContainerStatus {
      name: container_name.to_string(),
      container_id: Some(container_id.to_string()),
      ..Default::default()
    });
  pod
}
