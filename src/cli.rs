//! Command-line arguments for bakrest.

use clap::Parser;
use std::path::PathBuf;

/// Upload and restore a SQL Server .bak to a remote server
#[derive(Parser, Debug, Clone)]
#[command(name = "bakrest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the upload server (e.g., http://127.0.0.1:5000)
    #[arg(value_name = "BASE_URL")]
    pub base_url: String,

    /// Path to the .bak file to upload
    #[arg(value_name = "FILE_PATH")]
    pub file_path: PathBuf,

    /// SQL Server instance to restore on (passed to sqlcmd -S)
    #[arg(value_name = "SQL_SERVER_NAME")]
    pub sql_server_name: String,

    /// Name of the database to restore into
    #[arg(value_name = "DATABASE_NAME")]
    pub database_name: String,

    /// SQL Server login password (can also use SA_PASSWORD env variable)
    #[arg(long, env = "SA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// SQL Server login name
    #[arg(short = 'U', long, default_value = "sa")]
    pub user: String,

    /// Seconds between progress polls
    #[arg(long, value_name = "SECS", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_secs: u64,

    /// Validate the SQL Server TLS certificate instead of trusting it
    #[arg(long)]
    pub verify_server_certificate: bool,

    /// Explicit path to the sqlcmd executable
    #[arg(long, value_name = "PATH")]
    pub sqlcmd_path: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
