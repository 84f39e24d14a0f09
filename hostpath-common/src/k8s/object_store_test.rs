// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{ObjectStore, StoreUpdater};
use crate::k8s::object_name;
use crate::k8s::test::{make_namespace, make_pod};
use crate::k8s::watcher_base::ResourceWatchCallbacks;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use pretty_assertions::assert_eq;

fn names<T: kube::Resource>(objects: &[T]) -> Vec<String> {
  objects
    .iter()
    .map(|object| object_name(object.meta()).to_string())
    .collect()
}

#[test]
fn unsynced_store_errors() {
  let store: ObjectStore<Pod> = ObjectStore::new("pods");
  assert!(store.list().is_err());
}

#[tokio::test]
async fn initial_sync_is_swapped_atomically() {
  let store: ObjectStore<Pod> = ObjectStore::new("pods");
  let mut updater = StoreUpdater::new(store.clone());

  updater.init_apply(make_pod("ns2", "b", "u2")).await;
  updater.init_apply(make_pod("ns1", "a", "u1")).await;
  assert!(store.list().is_err());

  updater.init_done().await;
  assert_eq!(names(&store.list().unwrap()), vec!["a", "b"]);
}

#[tokio::test]
async fn apply_and_delete() {
  let store: ObjectStore<Pod> = ObjectStore::new("pods");
  let mut updater = StoreUpdater::new(store.clone());
  updater.init_done().await;
  assert!(store.list().unwrap().is_empty());

  updater.apply(make_pod("ns1", "a", "u1")).await;
  updater.apply(make_pod("ns1", "c", "u3")).await;
  // Re-applying replaces the existing object.
  updater.apply(make_pod("ns1", "a", "u4")).await;
  let pods = store.list().unwrap();
  assert_eq!(names(&pods), vec!["a", "c"]);
  assert_eq!(pods[0].metadata.uid.as_deref(), Some("u4"));

  updater.delete(make_pod("ns1", "a", "u4")).await;
  assert_eq!(names(&store.list().unwrap()), vec!["c"]);
}

#[tokio::test]
async fn resync_replaces_previous_state() {
  let store: ObjectStore<Namespace> = ObjectStore::new("namespaces");
  let mut updater = StoreUpdater::new(store.clone());
  updater.init_apply(make_namespace("one")).await;
  updater.init_apply(make_namespace("two")).await;
  updater.init_done().await;

  // A resync in flight keeps serving the old state.
  updater.init_apply(make_namespace("three")).await;
  assert_eq!(names(&store.list().unwrap()), vec!["one", "two"]);

  updater.init_done().await;
  assert_eq!(names(&store.list().unwrap()), vec!["three"]);
}
