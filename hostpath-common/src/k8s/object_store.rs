// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./object_store_test.rs"]
mod object_store_test;

use super::watcher_base::{ResourceWatchCallbacks, WatchSelectors, WatcherBase};
use anyhow::bail;
use async_trait::async_trait;
use bd_shutdown::ComponentShutdown;
use kube::api::ObjectMeta;
use kube::{Api, Resource};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

fn store_key(meta: &ObjectMeta) -> String {
  format!(
    "{}/{}",
    meta.namespace.as_deref().unwrap_or_default(),
    meta.name.as_deref().unwrap_or_default()
  )
}

//
// ObjectStore
//

struct StoreState<T> {
  objects: BTreeMap<String, T>,
  synced: bool,
}

impl<T> Default for StoreState<T> {
  fn default() -> Self {
    Self {
      objects: BTreeMap::new(),
      synced: false,
    }
  }
}

/// A watch fed, read only view of a set of Kubernetes objects. Readers get a point in time
/// snapshot ordered by `namespace/name`.
pub struct ObjectStore<T> {
  name: Arc<str>,
  state: Arc<RwLock<StoreState<T>>>,
}

impl<T> Clone for ObjectStore<T> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      state: self.state.clone(),
    }
  }
}

impl<T: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static> ObjectStore<T> {
  /// Starts watching `api` and returns once the initial listing has been loaded.
  pub async fn watch(
    name: &str,
    api: Api<T>,
    selectors: WatchSelectors,
    shutdown: ComponentShutdown,
  ) -> anyhow::Result<Self> {
    let store = Self::new(name);
    WatcherBase::create(
      name.to_string(),
      api,
      selectors,
      StoreUpdater::new(store.clone()),
      shutdown,
    )
    .await?;
    Ok(store)
  }
}

impl<T: Resource + Clone> ObjectStore<T> {
  fn new(name: &str) -> Self {
    Self {
      name: name.into(),
      state: Arc::new(RwLock::new(StoreState::default())),
    }
  }

  /// Returns every object currently known to the store.
  pub fn list(&self) -> anyhow::Result<Vec<T>> {
    let state = self.state.read();
    if !state.synced {
      bail!("{}: initial sync has not completed", self.name);
    }
    Ok(state.objects.values().cloned().collect())
  }

  fn swap(&self, objects: BTreeMap<String, T>) {
    let mut state = self.state.write();
    state.objects = objects;
    state.synced = true;
    log::info!("{}: store holds {} objects", self.name, state.objects.len());
  }

  fn upsert(&self, resource: T) {
    let key = store_key(resource.meta());
    self.state.write().objects.insert(key, resource);
  }

  fn remove(&self, resource: &T) {
    let key = store_key(resource.meta());
    if self.state.write().objects.remove(&key).is_some() {
      log::debug!("{}: removed {key}", self.name);
    }
  }
}

//
// StoreUpdater
//

// Applies watch events to a store. A resync is staged in `pending` and swapped in as a whole so
// that readers never observe a partially listed state.
struct StoreUpdater<T> {
  store: ObjectStore<T>,
  pending: Option<BTreeMap<String, T>>,
}

impl<T> StoreUpdater<T> {
  const fn new(store: ObjectStore<T>) -> Self {
    Self {
      store,
      pending: None,
    }
  }
}

#[async_trait]
impl<T: Resource + Clone + Send + Sync + 'static> ResourceWatchCallbacks<T> for StoreUpdater<T> {
  async fn apply(&mut self, resource: T) {
    self.store.upsert(resource);
  }

  async fn delete(&mut self, resource: T) {
    self.store.remove(&resource);
  }

  async fn init_apply(&mut self, resource: T) {
    self
      .pending
      .get_or_insert_with(BTreeMap::new)
      .insert(store_key(resource.meta()), resource);
  }

  async fn init_done(&mut self) {
    self.store.swap(self.pending.take().unwrap_or_default());
  }
}
