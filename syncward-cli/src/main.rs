//! syncward: queue-driven synchronization scheduler.
//!
//! # Usage
//!
//! ```text
//! syncward [--base-dir <path>] init
//! syncward run [-p|--priority-project <code>]
//! syncward watch [-p|--priority-project <code>]
//! syncward enqueue <code> [--stage edit|synchronize]
//! syncward status [--project <code>] [--json]
//! syncward hold <code> --reason <text>
//! syncward release <code>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    enqueue::EnqueueArgs, hold::HoldArgs, hold::ReleaseArgs, init::InitArgs, run::RunArgs,
    status::StatusArgs, watch::WatchArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "syncward",
    version,
    about = "Drain project sync queues against the remote repository",
    long_about = None,
)]
struct Cli {
    /// Root of queues, state and clones (default: $SYNCWARD_BASE_DIR or ~/.syncward).
    #[arg(long, global = true, value_name = "PATH")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the directory layout and a default settings file.
    Init(InitArgs),

    /// Take the host lock, recover crashed projects and sweep every queue once.
    Run(RunArgs),

    /// Sweep whenever a queue changes, until interrupted.
    Watch(WatchArgs),

    /// Queue a project for a stage.
    Enqueue(EnqueueArgs),

    /// Show project states and pending queue entries.
    Status(StatusArgs),

    /// Put a project on hold so no action starts for it.
    Hold(HoldArgs),

    /// Take a project off hold.
    Release(ReleaseArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_dir = cli.base_dir;
    match cli.command {
        Commands::Init(args) => args.run(base_dir),
        Commands::Run(args) => args.run(base_dir),
        Commands::Watch(args) => args.run(base_dir),
        Commands::Enqueue(args) => args.run(base_dir),
        Commands::Status(args) => args.run(base_dir),
        Commands::Hold(args) => args.run(base_dir),
        Commands::Release(args) => args.run(base_dir),
    }
}
