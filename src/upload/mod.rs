pub(crate) mod http_upload;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AppConfig;
use crate::tracker::{OperationTracker, PollStop};
use http_upload::{UploadClient, UploadResult};

/// Uploads the configured backup file while polling the server for progress.
///
/// The server's `/progress/{id}` endpoint is the only progress shown; bytes
/// counted locally are just checked against the file size at the end.
pub async fn run_upload_flow(
    app_config: &AppConfig,
    client: UploadClient,
    cancel: CancellationToken,
) -> Result<UploadResult> {
    let upload_id = client
        .request_upload_id()
        .await
        .context("Failed to obtain an upload ID")?;
    println!("Obtained upload ID: {}", upload_id);

    let operation = {
        let client = client.clone();
        let upload_id = upload_id.clone();
        let path = app_config.backup_file.clone();
        let cancel = cancel.clone();
        async move { client.upload(&upload_id, &path, cancel).await }
    };

    let probe_client = &client;
    let probe_id = upload_id.as_str();
    let tracker = OperationTracker::new("Upload", app_config.poll_interval, cancel);
    let tracked = tracker
        .track(operation, move || async move {
            probe_client.poll_progress(probe_id).await.map(Some)
        })
        .await;

    debug!("Upload progress polled {} times, stopped: {:?}", tracked.polls, tracked.stop);
    let result = tracked
        .result
        .with_context(|| format!("Upload of {} failed", app_config.backup_file.display()))?;

    if let PollStop::ProbeFailed(reason) = &tracked.stop {
        println!("⚠️ Upload finished but progress polling failed: {}", reason);
    }
    if tracked.last_progress.is_complete() {
        println!("Upload complete!");
    }

    println!("✅ Backup file uploaded successfully to: {}", result.remote_file_path);
    println!("Suggested restore directory: {}", result.suggested_restore_dir);
    Ok(result)
}
