// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{create_container_links, physical_log_filename};
use crate::config::MapperPaths;
use hostpath_common::k8s::test::{make_pod, with_container_status};
use k8s_openapi::api::core::v1::ContainerStatus;
use pretty_assertions::assert_eq;
use std::fs;
use std::os::unix::fs::symlink;
use tempfile::tempdir;

#[test]
fn log_filename_follows_host_link() {
  let temp_dir = tempdir().unwrap();
  symlink(
    "/var/log/pods/ns1_p1_u1/c1/3.log",
    temp_dir.path().join("p1_ns1_c1-abc.log"),
  )
  .unwrap();

  assert_eq!(
    physical_log_filename(temp_dir.path(), "p1_ns1_c1-abc.log").unwrap(),
    "3.log"
  );
  assert!(physical_log_filename(temp_dir.path(), "p1_ns1_c1-missing.log").is_err());
}

#[test]
fn container_links_point_at_rotated_file() {
  let temp_dir = tempdir().unwrap();
  let paths = MapperPaths::under(temp_dir.path(), "team-a", "vc1");
  fs::create_dir_all(&paths.host_container_logs).unwrap();
  fs::create_dir_all(&paths.virtual_container_logs).unwrap();

  symlink(
    "/var/log/pods/team-a_p1-x-ns1-x-vc1_pu1/c1/0.log",
    paths
      .host_container_logs
      .join("p1-x-ns1-x-vc1_team-a_c1-abc.log"),
  )
  .unwrap();

  let mut virtual_pod = with_container_status(make_pod("ns1", "p1", "u1"), "c1", "containerd://abc");
  // Not started on the host yet.
  virtual_pod = with_container_status(virtual_pod, "c2", "containerd://def");
  // No runtime id at all.
  virtual_pod
    .status
    .as_mut()
    .unwrap()
    .container_statuses
    .as_mut()
    .unwrap()
    .push(ContainerStatus {
      name: "c3".to_string(),
      ..Default::default()
    });
  let physical_pod = make_pod("team-a", "p1-x-ns1-x-vc1", "pu1");
  let target_dir = paths.host_pod_logs.join("ns1_p1_u1");

  create_container_links(&paths, &virtual_pod, &physical_pod, &target_dir).unwrap();

  let link = paths.virtual_container_logs.join("p1_ns1_c1-abc.log");
  assert_eq!(
    fs::read_link(&link).unwrap(),
    target_dir.join("c1").join("0.log")
  );
  assert_eq!(fs::read_dir(&paths.virtual_container_logs).unwrap().count(), 1);

  // Converged links are left alone.
  create_container_links(&paths, &virtual_pod, &physical_pod, &target_dir).unwrap();
  assert_eq!(fs::read_dir(&paths.virtual_container_logs).unwrap().count(), 1);
}
