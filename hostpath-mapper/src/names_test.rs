// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{
  Translator,
  container_entry_pod_identity,
  container_log_name,
  pod_identity,
  pod_log_token,
  safe_concat_name,
  strip_runtime_prefix,
};
use pretty_assertions::assert_eq;

#[test]
fn path_tokens() {
  assert_eq!(pod_log_token("ns1", "p1", "u1"), "ns1_p1_u1");
  assert_eq!(pod_identity("p1", "ns1"), "p1_ns1");
  assert_eq!(
    container_log_name("p1", "ns1", "c1", "abc"),
    "p1_ns1_c1-abc.log"
  );
}

#[test]
fn runtime_prefix() {
  assert_eq!(strip_runtime_prefix("containerd://abc"), "abc");
  assert_eq!(strip_runtime_prefix("docker://def"), "def");
  assert_eq!(strip_runtime_prefix("abc"), "abc");
  assert_eq!(strip_runtime_prefix(""), "");
}

#[test]
fn container_entry_identity() {
  assert_eq!(
    container_entry_pod_identity("p1_ns1_c1-abc.log").as_deref(),
    Some("p1_ns1")
  );
  assert_eq!(container_entry_pod_identity("garbage.log"), None);
}

#[test]
fn short_names_are_joined() {
  assert_eq!(
    safe_concat_name(&["p1", "x", "ns1", "x", "vcluster"]),
    "p1-x-ns1-x-vcluster"
  );
}

#[test]
fn long_names_are_hashed() {
  let name = safe_concat_name(&[
    "a-very-long-pod-name-that-keeps-going-and-going",
    "x",
    "some-namespace",
    "x",
    "vcluster",
  ]);
  assert_eq!(
    name,
    "a-very-long-pod-name-that-keeps-going-and-going-x-so-8b23a29627"
  );
  assert_eq!(name.len(), 63);
}

#[test]
fn translation() {
  let single = Translator::SingleNamespace {
    vcluster_name: "vcluster".to_string(),
  };
  assert_eq!(single.host_name("p1", "ns1"), "p1-x-ns1-x-vcluster");
  assert_eq!(Translator::MultiNamespace.host_name("p1", "ns1"), "p1");
}
