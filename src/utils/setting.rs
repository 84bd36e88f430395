// Pre-flight connectivity checks
use crate::errors::{AppError, Result};
use crate::restore::sqlcmd::QueryExecutor;
use crate::upload::http_upload::UploadClient;

pub async fn check_upload_server(client: &UploadClient) -> bool {
    match client.test_connection().await {
        Ok(()) => {
            println!("✅ Upload server is listening");
            true
        }
        Err(e) => {
            eprintln!("❌ File uploader connection test failed: {}", e);
            false
        }
    }
}

pub async fn check_db_connection(executor: &dyn QueryExecutor, server: &str) -> bool {
    if executor.test_connection().await {
        println!("✅ Successfully connected to {}", server);
        true
    } else {
        eprintln!("❌ Database restorer connection test failed for {}", server);
        false
    }
}

/// Both ends must answer before anything is uploaded.
pub async fn run_preflight_checks(
    client: &UploadClient,
    executor: &dyn QueryExecutor,
    server: &str,
) -> Result<()> {
    if !check_upload_server(client).await {
        return Err(AppError::Connectivity("upload server is not ready".to_string()));
    }
    if !check_db_connection(executor, server).await {
        return Err(AppError::Connectivity(format!(
            "cannot run queries on SQL Server {}",
            server
        )));
    }
    Ok(())
}
