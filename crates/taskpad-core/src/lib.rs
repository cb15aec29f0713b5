pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::TaskpadError;
pub use storage::{
  FileStorage,
  KeyValueStorage,
  MemoryStorage
};
pub use store::{
  TaskStore,
  ViewState,
  initialize
};
pub use task::{
  NewTask,
  Task,
  TaskId
};
pub use view::{
  StatusFilter,
  TaskCounts,
  counts,
  project
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskpad"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let storage = open_storage(
    &cfg,
    cli.data.as_deref()
  )?;
  let mut store =
    store::initialize(storage);

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &mut store,
    &cfg,
    &mut renderer,
    inv
  )?;

  info!("done");
  Ok(())
}

fn open_storage(
  cfg: &config::Config,
  data_override: Option<&Path>
) -> anyhow::Result<FileStorage> {
  let data_dir =
    config::resolve_data_dir(
      cfg,
      data_override
    )
    .context(
      "failed to resolve data \
       directory"
    )?;
  FileStorage::open(&data_dir)
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })
}
