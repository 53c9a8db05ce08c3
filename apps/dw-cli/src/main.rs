use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dw_core::{Priority, Status};
use dw_session::{ClientOrder, StatusFilter};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "dw", version, about = "Weekly demand tracker")]
pub(crate) struct Cli {
    /// Database file (overrides the configured state dir)
    #[arg(long, global = true, env = "DW_DB")]
    db: Option<PathBuf>,
    /// Config file (TOML); defaults to DW_CONFIG or configs/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Add a demand to the current (or given) week
    Add(AddArgs),
    /// Edit title, description, client or priority
    Edit(EditArgs),
    /// Delete a demand
    Rm(IdArg),
    /// Mark a demand complete
    Done(IdArg),
    /// Reopen a completed demand
    Undo(IdArg),
    /// Set status explicitly (open|done)
    Status(StatusArgs),
    /// Change a demand's client
    Client(ClientArgs),
    /// Change a demand's priority
    Priority(PriorityArgs),
    /// Move a demand to another week (key, `next` or `prev`)
    Move(MoveArgs),
    /// Show the current week board
    List(ListArgs),
    /// Show demands grouped by week
    History(HistoryArgs),
    /// Client registry and per-client summaries
    Clients {
        #[command(subcommand)]
        cmd: ClientsCmd,
    },
    /// Search titles, descriptions and clients
    Search(SearchArgs),
    /// Show or change the current week
    Week {
        #[command(subcommand)]
        cmd: WeekCmd,
    },
    /// Advance the week now if the current one has ended
    Advance(AdvanceArgs),
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
    /// Delete all data
    Reset(ResetArgs),
    /// Keep running and advance the week automatically
    Watch(WatchArgs),
    /// Print effective config and database paths (JSON)
    Paths,
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub(crate) struct IdArg {
    /// Demand id (a unique prefix is enough)
    pub id: String,
}

#[derive(Args)]
pub(crate) struct AddArgs {
    pub title: String,
    #[arg(long, short)]
    pub client: String,
    #[arg(long, short, default_value = "medium")]
    pub priority: Priority,
    #[arg(long, short)]
    pub description: Option<String>,
    /// Week key (`YYYY-MM-DD_YYYY-MM-DD`), `next` or `prev`; defaults to current
    #[arg(long, short)]
    pub week: Option<String>,
}

#[derive(Args)]
pub(crate) struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    #[arg(long)]
    pub client: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
}

#[derive(Args)]
pub(crate) struct StatusArgs {
    pub id: String,
    pub status: Status,
}

#[derive(Args)]
pub(crate) struct ClientArgs {
    pub id: String,
    pub client: String,
}

#[derive(Args)]
pub(crate) struct PriorityArgs {
    pub id: String,
    pub priority: Priority,
}

#[derive(Args)]
pub(crate) struct MoveArgs {
    pub id: String,
    pub week: String,
}

#[derive(Args)]
pub(crate) struct ListArgs {
    /// Narrow by text
    #[arg(long, short)]
    pub search: Option<String>,
}

#[derive(Args)]
pub(crate) struct HistoryArgs {
    #[arg(long)]
    pub client: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    /// any|open|urgent|done|not-done
    #[arg(long, default_value = "any")]
    pub status: StatusFilter,
    #[arg(long, short)]
    pub search: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum ClientsCmd {
    /// Per-client counts
    Summary {
        /// count|name|priority
        #[arg(long, default_value = "count")]
        order: ClientOrder,
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Registered client names
    List,
    Add { name: String },
    /// Rename a client everywhere
    Rename { from: String, to: String },
    Rm { name: String },
    /// Set (or clear with no name) the client filter used by `list`
    Filter { name: Option<String> },
}

#[derive(Args)]
pub(crate) struct SearchArgs {
    pub query: String,
}

#[derive(Subcommand)]
pub(crate) enum WeekCmd {
    /// Show the current week
    Show,
    /// List known weeks
    List,
    /// Make a week current (key, `next`, `prev` or a date inside it)
    Set { week: String },
}

#[derive(Args)]
pub(crate) struct AdvanceArgs {
    /// Evaluate as if it were this local time (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum SettingsCmd {
    Show,
    /// Set a setting (e.g. `autoAdvance false`)
    Set { key: String, value: String },
}

#[derive(Args)]
pub(crate) struct ResetArgs {
    /// Required confirmation
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub(crate) struct WatchArgs {
    /// Seconds between checks (defaults to the configured interval)
    #[arg(long)]
    pub interval: Option<u64>,
}

#[derive(Args)]
pub(crate) struct CompletionsArgs {
    /// Target shell (bash, zsh, fish, powershell, elvish)
    pub shell: clap_complete::Shell,
    /// Output directory (writes a file). If not set, prints to stdout.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = dw_core::load_effective_config(cli.config.as_deref())?;
    init_tracing(&cfg.log_level);
    commands::dispatch(cli, cfg).await
}
