// hostpath-mapper - virtual cluster log path mapper
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use anyhow::bail;
use bd_shutdown::ComponentShutdownTrigger;
use clap::{Parser, Subcommand};
use hostpath_common::global_initialize;
use hostpath_mapper::config::StartOptions;
use hostpath_mapper::run_start;
use log::info;
use tikv_jemallocator::Jemalloc;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[allow(clippy::needless_raw_string_hashes)]
pub mod built_info {
  include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser, Debug)]
struct Options {
  #[arg(long = "version")]
  pub version: bool,

  #[command(subcommand)]
  pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Map host to virtual pod logs
  Start(StartOptions),
}

async fn wait_for_signal() {
  // Trap ctrl+c and sigterm messages and perform a clean shutdown
  let mut sigint = signal(SignalKind::interrupt()).unwrap();
  let mut sigterm = signal(SignalKind::terminate()).unwrap();
  select! {
    _ = sigint.recv() => info!("received sigint"),
    _ = sigterm.recv() => info!("received sigterm"),
  }
}

fn main() -> anyhow::Result<()> {
  global_initialize();
  let opts = Options::parse();

  if opts.version {
    println!(
      "hostpath-mapper: {}",
      built_info::GIT_COMMIT_HASH.unwrap_or("unknown")
    );
    return Ok(());
  }
  info!(
    "hostpath-mapper loading: {}",
    built_info::GIT_COMMIT_HASH.unwrap_or("unknown")
  );

  let Some(Command::Start(start_options)) = opts.command else {
    bail!("no command given, expected 'start'");
  };

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()?;

  runtime.block_on(async {
    let shutdown_trigger = ComponentShutdownTrigger::default();
    let result = select! {
      result = run_start(start_options, shutdown_trigger.make_shutdown()) => result,
      () = wait_for_signal() => Ok(()),
    };
    shutdown_trigger.shutdown().await;
    info!("runtime terminated");
    result
  })
}
