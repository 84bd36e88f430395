pub(crate) mod db_restore;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod move_plan;
pub(crate) mod sqlcmd;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::tracker::{OperationTracker, PollStop};
use crate::upload::http_upload::UploadResult;
use db_restore::{RestoreReport, RestoreRequest, RestoreStateMachine};
use sqlcmd::QueryExecutor;

/// Restores the uploaded backup into the configured database while polling
/// `sys.dm_exec_requests` for the RESTORE percentage.
///
/// Completion is decided by the state machine finishing, not by the
/// percentage: the server stops reporting the request once it is done.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    executor: Arc<dyn QueryExecutor>,
    upload: UploadResult,
    cancel: CancellationToken,
) -> Result<RestoreReport> {
    let database = app_config.database_name.clone();
    println!("🔄 Starting restore of database: {}", database);

    let plan = move_plan::plan(&database, &upload.suggested_restore_dir, &upload.logical_files);
    if plan.is_empty() {
        let err = AppError::Planning(format!(
            "No valid logical files to restore (server reported {})",
            upload.logical_files.len()
        ));
        return Err(anyhow::Error::new(err).context("Restore was not attempted"));
    }

    let request = RestoreRequest {
        database: database.clone(),
        backup_file_path: upload.remote_file_path,
        plan,
    };
    let machine = RestoreStateMachine::new(Arc::clone(&executor), cancel.clone());

    let tracker = OperationTracker::new("Restore", app_config.poll_interval, cancel);
    let tracked = tracker
        .track(machine.run(request), move || {
            let executor = Arc::clone(&executor);
            async move { executor.query_restore_percent().await }
        })
        .await;

    debug!("Restore progress polled {} times, stopped: {:?}", tracked.polls, tracked.stop);
    if let PollStop::ProbeFailed(reason) = &tracked.stop {
        println!("⚠️ Restore progress unavailable: {}", reason);
    }

    let report = tracked
        .result
        .with_context(|| format!("Failed to restore the database {}", database))?;
    debug!("Restore states for {}: {:?}", report.database, report.history);

    println!(
        "✅ {} ({} files relocated{})",
        report.outcome().unwrap_or("Restore finished."),
        report.files_moved,
        if report.existed { ", replaced existing database" } else { "" }
    );
    Ok(report)
}
