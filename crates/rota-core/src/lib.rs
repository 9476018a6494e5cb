pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod editor;
pub mod error;
pub mod grouper;
pub mod model;
pub mod render;
pub mod resolver;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::editor::Planner;
pub use crate::error::{
  ValidationError,
  ValidationResult
};
pub use crate::grouper::{
  DisplayGroup,
  group
};
pub use crate::model::{
  Class,
  Scheduled,
  Slot,
  Timetable
};
pub use crate::resolver::{
  PlannedDay,
  ResolvedOccurrence,
  Resolver
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
    "starting rota CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rotarc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let tz = datetime::resolve_timezone(
    cfg.get("timezone").as_deref()
  );
  let now = Utc::now();
  let ctx = commands::RunContext {
    today:      datetime::today_in(
      &tz, now
    ),
    now:        now
      .with_timezone(&tz)
      .naive_local(),
    week_start: cfg.week_start()?,
    timetable:  cli.timetable,
    json:       cli.json
  };

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command =
    cli.command.unwrap_or(
      cli::Command::Day { date: None }
    );

  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    &ctx,
    command
  )?;

  info!("done");
  Ok(())
}
