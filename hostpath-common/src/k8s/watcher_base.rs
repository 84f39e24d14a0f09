// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./watcher_base_test.rs"]
mod watcher_base_test;

use anyhow::bail;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bd_shutdown::ComponentShutdown;
use futures_util::{TryStreamExt, pin_mut};
use kube::runtime::watcher::{self, ListSemantic};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;
use time::ext::NumericalStdDuration;
use tokio::sync::oneshot;

#[async_trait]
pub trait ResourceWatchCallbacks<T>: Send {
  async fn apply(&mut self, resource: T);
  async fn delete(&mut self, resource: T);
  async fn init_apply(&mut self, resource: T);
  async fn init_done(&mut self);
}

//
// WatchSelectors
//

/// Server side filtering applied to a watch.
#[derive(Clone, Debug, Default)]
pub struct WatchSelectors {
  pub field: Option<String>,
  pub label: Option<String>,
}

pub struct WatcherBase {}

impl WatcherBase {
  const MAX_BACKOFF: Duration = Duration::from_secs(30);
  const INITIAL_SYNC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

  /// Spawns a watch over `api` feeding `callbacks`. Returns once the first full listing has been
  /// delivered via `init_done`, or once `shutdown` fires. Fails if the listing does not arrive
  /// within `INITIAL_SYNC_TIMEOUT`, e.g. when the watch is forbidden.
  pub async fn create<T: Resource + Clone + DeserializeOwned + Debug + Send + 'static>(
    name: String,
    api: Api<T>,
    selectors: WatchSelectors,
    mut callbacks: impl ResourceWatchCallbacks<T> + 'static,
    mut shutdown: ComponentShutdown,
  ) -> anyhow::Result<()> {
    // Note that we unset page size because the Rust library won't set resourceVersion=0 when
    // page size is set because apparently K8s ignores it. See:
    // https://github.com/kubernetes/kubernetes/issues/118394
    let watcher = watcher::watcher(
      api,
      watcher::Config {
        field_selector: selectors.field,
        label_selector: selectors.label,
        list_semantic: ListSemantic::Any,
        page_size: None,
        ..Default::default()
      },
    );

    let (initial_sync_tx, initial_sync_rx) = oneshot::channel();
    let mut backoff = Self::make_k8s_backoff();
    let mut initial_sync_shutdown = shutdown.clone();

    let cloned_name = name.clone();
    tokio::spawn(async move {
      pin_mut!(watcher);
      let mut initial_sync_tx = Some(initial_sync_tx);
      loop {
        let update = tokio::select! {
          () = shutdown.cancelled() => {
            log::info!("{name}: shutting down resource watcher");
            break;
          },
          update = watcher.try_next() => update
        };

        let Some(update) = Self::process_resource_update(&name, update, &mut backoff).await else {
          continue;
        };

        match update {
          watcher::Event::Apply(resource) => {
            log::debug!("{name}: resource apply");
            callbacks.apply(resource).await;
          },
          watcher::Event::Delete(resource) => {
            log::debug!("{name}: resource delete");
            callbacks.delete(resource).await;
          },
          watcher::Event::Init => {
            log::info!("{name}: starting resource resync");
          },
          watcher::Event::InitApply(resource) => {
            log::debug!("{name}: resource init apply");
            callbacks.init_apply(resource).await;
          },
          watcher::Event::InitDone => {
            callbacks.init_done().await;
            log::info!("{name}: resource resync complete");
            if let Some(initial_sync_tx) = initial_sync_tx.take() {
              let _ignored = initial_sync_tx.send(());
            }
          },
        }
      }
    });

    Self::wait_for_initial_sync(
      &cloned_name,
      initial_sync_rx,
      &mut initial_sync_shutdown,
      Self::INITIAL_SYNC_TIMEOUT,
    )
    .await
  }

  async fn wait_for_initial_sync(
    name: &str,
    initial_sync_rx: oneshot::Receiver<()>,
    shutdown: &mut ComponentShutdown,
    timeout: Duration,
  ) -> anyhow::Result<()> {
    tokio::select! {
      () = shutdown.cancelled() => {
        log::info!("{name}: shutdown before initial resource sync");
        Ok(())
      },
      result = tokio::time::timeout(timeout, initial_sync_rx) => match result {
        Ok(Ok(())) => {
          log::info!("{name}: initial resource sync complete");
          Ok(())
        },
        Ok(Err(_)) => bail!("{name}: watcher exited before initial resource sync"),
        Err(_) => bail!(
          "{name}: initial resource sync did not complete within {} seconds",
          timeout.as_secs()
        ),
      },
    }
  }

  fn make_k8s_backoff() -> ExponentialBackoff {
    // This matches the k8s client which says that it matches the Go client. This is done manually
    // as there appears to be a bug in the k8s client where it keeps resetting if the failure is
    // during initial sync.
    ExponentialBackoffBuilder::new()
      .with_initial_interval(800.std_milliseconds())
      .with_max_interval(Self::MAX_BACKOFF)
      .with_max_elapsed_time(None)
      .with_multiplier(2.0)
      .build()
  }

  async fn process_resource_update<T>(
    name: &str,
    result: watcher::Result<Option<watcher::Event<T>>>,
    backoff: &mut ExponentialBackoff,
  ) -> Option<watcher::Event<T>> {
    match result {
      Ok(Some(update)) => {
        if !matches!(update, watcher::Event::Init) {
          // The library will emit the Event::Init message in the case of a failure and the start of
          // resync. We do not want to reset in this case, but reset in all other cases.
          backoff.reset();
        }

        Some(update)
      },
      Ok(None) => None,
      Err(e) => {
        log::warn!("{name}: error watching resource, backing off: {e}");
        tokio::time::sleep(backoff.next_backoff().unwrap_or(Self::MAX_BACKOFF)).await;
        None
      },
    }
  }
}
