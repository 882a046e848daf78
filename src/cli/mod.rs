use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{NoteCommand, SettingsCommand, TimerArgs, TodoCommand};

#[derive(Parser, Debug)]
#[command(
    name = "notey",
    version,
    about = "Notes, todos and a pomodoro timer backed by a local state store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTEY_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTEY_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarise notes, todos and due reminders (default)
    Status,
    /// Create, edit, export and import notes
    #[command(subcommand)]
    Note(NoteCommand),
    /// Manage the todo list
    #[command(subcommand)]
    Todo(TodoCommand),
    /// Show or change appearance and notification settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Run a pomodoro countdown in the terminal
    Timer(TimerArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTEY_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("NOTEY_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&config.storage)?;

    let config = Arc::new(config);
    let mut app = App::new(config, Box::new(storage))?;
    let command = cli.command.unwrap_or(Commands::Status);
    let result = match command {
        Commands::Status => commands::status(&app).map(|out| print!("{out}")),
        Commands::Note(command) => {
            commands::handle_note_command(&mut app, &paths, command).map(|out| print!("{out}"))
        }
        Commands::Todo(command) => {
            commands::handle_todo_command(&mut app, command).map(|out| print!("{out}"))
        }
        Commands::Settings(command) => {
            commands::handle_settings_command(&mut app, command).map(|out| print!("{out}"))
        }
        Commands::Timer(args) => commands::run_timer(&mut app, args),
    };
    let closed = app.close().context("saving pending changes");
    result.and(closed)
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
