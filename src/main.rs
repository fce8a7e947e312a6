mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rlinit::settings::{Settings, DEFAULT_CONFIG_DIR};

#[derive(Parser)]
#[command(name = "rlinit-tool")]
#[command(about = "Inspect and exercise an rlinit configuration")]
struct Args {
    /// Directory holding rlinit.conf and objects/
    #[arg(long, global = true, env = "RLINIT_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every object file and check the table
    Check,

    /// List objects
    List {
        /// Only objects in this runlevel
        #[arg(long, short = 'r')]
        runlevel: Option<String>,
    },

    /// Show an object's definition
    Show {
        /// Object id (file name without .object)
        id: String,
    },

    /// Start an object
    Start {
        /// Object id
        id: String,
    },

    /// Stop an object
    Stop {
        /// Object id
        id: String,
    },

    /// Reload an object
    Reload {
        /// Object id
        id: String,
    },

    /// Mark an object enabled in its file
    Enable {
        /// Object id
        id: String,
    },

    /// Mark an object disabled in its file
    Disable {
        /// Object id
        id: String,
    },

    /// Change an attribute already present in an object's file
    Set {
        /// Object id
        id: String,
        /// Attribute name, e.g. StartPriority
        key: String,
        value: String,
    },

    /// Start every object of a runlevel in priority order
    Boot {
        /// Runlevel to boot instead of the configured default
        #[arg(long, short = 'r')]
        runlevel: Option<String>,

        /// Show what would be started without actually starting
        #[arg(long, short = 'n')]
        dry_run: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(&args.config_dir)?;

    match args.command {
        Command::Check => commands::check(&settings)?,
        Command::List { runlevel } => commands::list(&settings, runlevel.as_deref())?,
        Command::Show { id } => commands::show(&settings, &id)?,
        Command::Start { id } => commands::start(&settings, &id)?,
        Command::Stop { id } => commands::stop(&settings, &id)?,
        Command::Reload { id } => commands::reload(&settings, &id)?,
        Command::Enable { id } => commands::enable(&settings, &id)?,
        Command::Disable { id } => commands::disable(&settings, &id)?,
        Command::Set { id, key, value } => commands::set(&settings, &id, &key, &value)?,
        Command::Boot { runlevel, dry_run } => {
            if let Some(rl) = runlevel {
                settings.default_runlevel = rl;
            }
            commands::boot(&settings, dry_run)?;
        }
    }

    Ok(())
}
