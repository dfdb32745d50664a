mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    condo::CondoSubcommand, config::ConfigSubcommand, goal::GoalSubcommand,
    session::SessionSubcommand, task::TaskSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "condo",
    about = "Goal and task lifecycle for ClawCondos: kickoff, retries, cascades and kills",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .condo/ or .git/)
    #[arg(long, global = true, env = "CONDO_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .condo/ in the current project
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Manage condos
    Condo {
        #[command(subcommand)]
        subcommand: CondoSubcommand,
    },

    /// Manage goals: create, inspect, kick off, close
    Goal {
        #[command(subcommand)]
        subcommand: GoalSubcommand,
    },

    /// Manage tasks and report their progress
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Report session ends and kill running sessions
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Inspect and validate .condo/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the RPC server and cascade driver
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Condo { subcommand } => cmd::condo::run(&root, subcommand, cli.json),
        Commands::Goal { subcommand } => cmd::goal::run(&root, subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&root, subcommand, cli.json),
        Commands::Session { subcommand } => cmd::session::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
