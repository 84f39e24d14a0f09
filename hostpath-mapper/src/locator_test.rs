// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{filter_by_namespace, physical_pod_map};
use crate::clusters::MockHostCluster;
use crate::config::{MapperConfig, MapperPaths};
use crate::mode::NamespaceMode;
use hostpath_common::k8s::object_name;
use hostpath_common::k8s::test::make_pod;
use k8s_openapi::api::core::v1::Pod;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn names(pods: &[Pod]) -> Vec<&str> {
  pods.iter().map(|pod| object_name(&pod.metadata)).collect()
}

fn namespaces(names: &[&str]) -> HashSet<String> {
  names.iter().map(ToString::to_string).collect()
}

fn test_pods() -> Vec<Pod> {
  vec![
    make_pod("test-ns1", "test-pod1", "u1"),
    make_pod("test-ns2", "test-pod2", "u2"),
  ]
}

fn make_config(root: &Path, mode: NamespaceMode) -> MapperConfig {
  MapperConfig::new(
    "vc1",
    "team-a",
    "node_name",
    mode,
    MapperPaths::under(root, "team-a", "vc1"),
  )
}

#[test]
fn filter_none_owned() {
  assert!(filter_by_namespace(test_pods(), &namespaces(&["test-ns3", "test-ns4"])).is_empty());
}

#[test]
fn filter_some_owned() {
  assert_eq!(
    names(&filter_by_namespace(
      test_pods(),
      &namespaces(&["test-ns1", "test-ns4"])
    )),
    vec!["test-pod1"]
  );
}

#[test]
fn filter_all_owned() {
  assert_eq!(
    filter_by_namespace(test_pods(), &namespaces(&["test-ns1", "test-ns2"])),
    test_pods()
  );
}

#[test]
fn filter_empty_set() {
  assert!(filter_by_namespace(test_pods(), &HashSet::new()).is_empty());
}

#[test]
fn only_pods_with_log_dirs_are_mapped() {
  let temp_dir = tempdir().unwrap();
  let config = make_config(temp_dir.path(), NamespaceMode::Single);
  fs::create_dir_all(config.paths.host_pod_logs.join("team-a_p1-x-ns1-x-vc1_pu1")).unwrap();

  let mut host = MockHostCluster::new();
  host.expect_list_node_pods().returning(|| {
    Ok(vec![
      make_pod("team-a", "p1-x-ns1-x-vc1", "pu1"),
      make_pod("team-a", "p2-x-ns1-x-vc1", "pu2"),
    ])
  });
  host.expect_list_vcluster_namespaces().never();

  let mappings = physical_pod_map(&config, &host).unwrap();
  assert_eq!(mappings.len(), 1);
  let detail = &mappings["p1-x-ns1-x-vc1"];
  assert_eq!(detail.target, "team-a_p1-x-ns1-x-vc1_pu1");
  assert!(detail.symlink_name.is_none());
}

#[test]
fn multi_namespace_restricts_to_owned_namespaces() {
  let temp_dir = tempdir().unwrap();
  let config = make_config(temp_dir.path(), NamespaceMode::Multi);
  fs::create_dir_all(config.paths.host_pod_logs.join("test-ns1_test-pod1_u1")).unwrap();
  fs::create_dir_all(config.paths.host_pod_logs.join("test-ns2_test-pod2_u2")).unwrap();

  let mut host = MockHostCluster::new();
  host.expect_list_node_pods().returning(|| Ok(test_pods()));
  host
    .expect_list_vcluster_namespaces()
    .returning(|| Ok(namespaces(&["test-ns1", "test-ns4"])));

  let mappings = physical_pod_map(&config, &host).unwrap();
  assert_eq!(mappings.keys().collect::<Vec<_>>(), vec!["test-pod1"]);
}

#[test]
fn first_pod_with_a_name_wins() {
  let temp_dir = tempdir().unwrap();
  let config = make_config(temp_dir.path(), NamespaceMode::Multi);
  fs::create_dir_all(config.paths.host_pod_logs.join("test-ns1_web_u1")).unwrap();
  fs::create_dir_all(config.paths.host_pod_logs.join("test-ns2_web_u2")).unwrap();

  let mut host = MockHostCluster::new();
  host.expect_list_node_pods().returning(|| {
    Ok(vec![
      make_pod("test-ns1", "web", "u1"),
      make_pod("test-ns2", "web", "u2"),
    ])
  });
  host
    .expect_list_vcluster_namespaces()
    .returning(|| Ok(namespaces(&["test-ns1", "test-ns2"])));

  let mappings = physical_pod_map(&config, &host).unwrap();
  assert_eq!(mappings.len(), 1);
  assert_eq!(mappings["web"].target, "test-ns1_web_u1");
}

#[test]
fn listing_errors_are_returned() {
  let temp_dir = tempdir().unwrap();
  let config = make_config(temp_dir.path(), NamespaceMode::Multi);

  let mut host = MockHostCluster::new();
  host.expect_list_node_pods().returning(|| Ok(test_pods()));
  host
    .expect_list_vcluster_namespaces()
    .returning(|| Err(anyhow::anyhow!("not synced")));

  assert!(physical_pod_map(&config, &host).is_err());
}
