/// Configuration management for the room access server.
/// Handles command-line argument parsing and config structure.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "JamRoom Server")]
#[command(about = "Collaboration room access and membership server", long_about = None)]
pub struct Config {
    /// Server port (default: 4600)
    #[arg(long, default_value = "4600")]
    pub port: u16,

    /// SQLite database file path (default: jamroom.db)
    #[arg(long, default_value = "jamroom.db")]
    pub database: PathBuf,

    /// PID file path (optional) - write server PID to this file on startup
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Validity window for invite grants, in seconds (default: 600)
    #[arg(long, default_value = "600")]
    pub invite_ttl_seconds: i64,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }
}
