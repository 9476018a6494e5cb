use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rota",
    version,
    about = "Rota: rotating class timetables, resolved per day",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rotarc", global = true)]
    pub rotarc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Timetable name or id; defaults to `default.timetable` or the only one.
    #[arg(short = 't', long = "timetable", global = true)]
    pub timetable: Option<String>,

    /// Print machine-readable JSON instead of tables.
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the rotation week active on a date.
    Week {
        #[arg(short = 'd', long = "date")]
        date: Option<String>,
    },
    /// List the classes scheduled on a date.
    Day {
        #[arg(short = 'd', long = "date")]
        date: Option<String>,
    },
    /// Show consecutive days around a date.
    Plan {
        #[arg(short = 'd', long = "date")]
        date: Option<String>,

        #[arg(long = "days")]
        days: Option<u32>,

        /// Days shown before the date.
        #[arg(long = "offset", allow_hyphen_values = true)]
        offset: Option<i64>,
    },
    /// Merge every slot of the timetable into time bands.
    Groups {
        /// Only slots of this rotation week.
        #[arg(long = "week")]
        week: Option<u32>,
    },
    /// Show the next class after now.
    Next {
        #[arg(long = "horizon", default_value_t = 14)]
        horizon: u32,
    },
    AddTimetable {
        name: String,
        start: String,
        end: String,

        #[arg(long = "rotation", default_value_t = 1)]
        rotation: u32,
    },
    AddClass {
        subject: String,

        #[arg(long = "room")]
        room: Option<String>,

        #[arg(long = "teacher")]
        teacher: Option<String>,

        #[arg(long = "from")]
        from: Option<String>,

        #[arg(long = "until")]
        until: Option<String>,
    },
    AddSlot {
        /// Class subject or id.
        class: String,
        day: String,
        start: String,
        end: String,

        #[arg(long = "week", default_value_t = 1)]
        week: u32,
    },
    /// Change the rotation length, deleting slots in weeks that disappear.
    SetRotation { length: u32 },
    /// Delete a class and all of its slots.
    DeleteClass {
        /// Class subject or id.
        class: String,
    },
    DeleteTimetable,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
