use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::category::{DEFAULT_COLOR, DEFAULT_ICON};
use crate::task::{Priority, Recurrence, StatusFilter};

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
    name = "momentum",
    version,
    about = "Momentum: personal tasks with due dates, priorities and categories"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "momentumrc")]
    pub momentumrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List tasks, newest first.
    List {
        #[arg(long, default_value = "all", value_parser = parse_status_filter)]
        status: StatusFilter,

        #[arg(long, default_value = "")]
        search: String,

        /// Only tasks in this category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Create a task. Without --due it is due tomorrow morning.
    Add {
        title: String,

        #[arg(long)]
        due: Option<String>,

        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,

        #[arg(long = "category")]
        categories: Vec<String>,

        #[arg(long, value_parser = parse_recurrence)]
        recur: Option<Recurrence>,

        #[arg(long)]
        description: Option<String>,
    },
    /// Show one task in full, with its subtasks.
    Info { id: String },
    /// Change a task's title or description. An empty description clears it.
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
    /// Mark a task done, or reopen a done task.
    Toggle { id: String },
    Delete { id: String },
    /// Print one month, e.g. `calendar 2025-03`.
    Calendar { month: Option<String> },
    /// Choose a new due date and time interactively.
    Pick { id: String },
    /// Add, check off or remove a task's subtasks.
    Subtask {
        #[command(subcommand)]
        action: SubtaskCommand,
    },
    /// List, create or remove categories.
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },
}

/// Subtasks are numbered from 1 in the order `info` shows them.
#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    Add { task: String, title: String },
    /// Check or uncheck subtask NUMBER.
    Toggle { task: String, number: usize },
    Delete { task: String, number: usize },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    /// Categories with how many tasks each holds.
    List,
    Add {
        name: String,

        #[arg(long, default_value = DEFAULT_COLOR)]
        color: String,

        #[arg(long, default_value = DEFAULT_ICON)]
        icon: String,
    },
    /// Remove a category and unlink it from its tasks.
    Delete { name: String },
}

fn parse_status_filter(s: &str) -> Result<StatusFilter, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn parse_recurrence(s: &str) -> Result<Recurrence, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
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
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
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
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
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
