//! SQL Server backup upload/restore tool
//!
//! Uploads a .bak file to a remote upload server, then restores it on a SQL
//! Server instance through sqlcmd, reporting progress for both phases.

// bakrest/src/main.rs
mod cli;
mod config;
mod errors;
mod logging;
mod restore;
mod tracker;
mod upload;
mod utils;

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cli::Cli;
use config::AppConfig;
use errors::AppError;
use restore::sqlcmd::{QueryExecutor, SqlCmdExecutor};
use upload::http_upload::UploadClient;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(app_err) = e.downcast_ref::<AppError>() {
                debug!("Failure category: {}", app_err.category());
            }
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    // Validated before any network call or process launch.
    let app_config = AppConfig::from_cli(&cli)?;
    debug!("Configuration: {:?}", app_config);

    let sqlcmd_path = utils::find_sqlcmd_executable(app_config.sql.sqlcmd_path.as_deref())?;
    let sqlcmd = SqlCmdExecutor::new(sqlcmd_path, app_config.sql.clone());
    debug!("Using sqlcmd at {}", sqlcmd.program().display());
    let executor: Arc<dyn QueryExecutor> = Arc::new(sqlcmd);

    let client = UploadClient::new(app_config.upload.clone())?;
    utils::setting::run_preflight_checks(&client, executor.as_ref(), &app_config.sql.server)
        .await
        .context("Pre-flight checks failed")?;

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    println!("🚀 Uploading {}...", app_config.backup_file.display());
    let uploaded = upload::run_upload_flow(&app_config, client, cancel.clone())
        .await
        .context("Upload process failed")?;

    restore::run_restore_flow(&app_config, executor, uploaded, cancel)
        .await
        .context("Restore process failed")?;
    Ok(())
}

/// First ctrl-c asks both phases to stop at their next safe point; a second
/// one exits immediately.
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nInterrupt received, stopping at the next safe point (press ctrl-c again to exit now)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nexit");
            std::process::exit(130);
        }
    });
}
