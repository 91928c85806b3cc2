use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use time::{Date, OffsetDateTime};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;

pub mod commands;

use self::commands::{ResolveArgs, SmartLinkArgs, SnapshotArgs, StateArgs};

#[derive(Parser, Debug)]
#[command(
    name = "glview",
    version,
    about = "Compile, persist and resolve general-ledger line item filter states"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over GLVIEW_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over GLVIEW_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a filter state from flags and print the read it compiles to
    Compile(SnapshotArgs),
    /// Save, load or list stored app states
    State(StateArgs),
    /// Resolve an inbound navigation payload (file or stdin)
    Resolve(ResolveArgs),
    /// Compute the navigation target of a result row link
    Smartlink(SmartLinkArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("GLVIEW_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("GLVIEW_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let today = local_today();

    let output = match cli.command {
        Commands::Compile(args) => commands::run_compile(&config, &args, today)?,
        Commands::State(args) => commands::handle_state_command(&config, args, today)?,
        Commands::Resolve(args) => commands::resolve_payload(&config, &args, today)?,
        Commands::Smartlink(args) => commands::run_smartlink(&config, &args, today)?,
    };
    print!("{output}");
    Ok(())
}

fn local_today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
