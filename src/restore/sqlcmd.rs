// bakrest/src/restore/sqlcmd.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::SqlServerConfig;
use crate::errors::{AppError, Result};
use crate::tracker::Progress;

const CONNECTION_TEST_QUERY: &str = "SET NOCOUNT ON; SELECT 1";

const RESTORE_PROGRESS_QUERY: &str = "SET NOCOUNT ON; \
    SELECT percent_complete FROM sys.dm_exec_requests \
    WHERE command IN ('RESTORE DATABASE');";

/// Runs T-SQL against the target server. Success is decided by the exit
/// status of the underlying command, never by the text it prints.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs a statement and returns whatever it printed.
    async fn execute(&self, query: &str) -> Result<String>;

    /// Runs a query with headers and column padding suppressed and returns
    /// the trimmed output, for single-value introspection queries.
    async fn query_value(&self, query: &str) -> Result<String>;

    /// Round-trips `SELECT 1`. Never fails; any problem is reported as `false`.
    async fn test_connection(&self) -> bool {
        match self.query_value(CONNECTION_TEST_QUERY).await {
            Ok(output) if output == "1" => true,
            Ok(output) => {
                warn!("Connection test returned unexpected output: {:?}", output);
                false
            }
            Err(e) => {
                warn!("Connection test failed: {}", e);
                false
            }
        }
    }

    /// Percentage of the RESTORE DATABASE request currently running on the
    /// server, or `None` when no such request is visible.
    async fn query_restore_percent(&self) -> Result<Option<Progress>> {
        let output = self.query_value(RESTORE_PROGRESS_QUERY).await?;
        Ok(parse_restore_percent(&output))
    }
}

/// Empty output means the server is not tracking a restore. Unparseable
/// output is logged and treated the same way.
pub fn parse_restore_percent(output: &str) -> Option<Progress> {
    let first = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    match first.parse::<f64>().ok().and_then(Progress::from_f64) {
        Some(progress) => Some(progress),
        None => {
            warn!("Failed to parse restore progress from {:?}", first);
            None
        }
    }
}

/// `QueryExecutor` backed by the `sqlcmd` command-line tool.
#[derive(Debug, Clone)]
pub struct SqlCmdExecutor {
    program: PathBuf,
    config: SqlServerConfig,
}

impl SqlCmdExecutor {
    pub fn new(program: impl Into<PathBuf>, config: SqlServerConfig) -> Self {
        Self {
            program: program.into(),
            config,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one invocation. The password travels in the
    /// `SQLCMDPASSWORD` environment variable, not on the command line.
    fn sqlcmd_args(&self, query: &str, headerless: bool) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.config.server.clone(),
            "-U".to_string(),
            self.config.user.clone(),
            // Abort and exit non-zero on the first SQL error.
            "-b".to_string(),
        ];
        if self.config.trust_server_certificate {
            args.push("-C".to_string());
        }
        if headerless {
            args.extend(["-W", "-h", "-1"].map(String::from));
        }
        args.push("-Q".to_string());
        args.push(query.to_string());
        args
    }

    async fn run(&self, query: &str, headerless: bool) -> Result<String> {
        debug!("Running sqlcmd against {}: {}", self.config.server, query.trim());

        let output = Command::new(&self.program)
            .args(self.sqlcmd_args(query, headerless))
            .env("SQLCMDPASSWORD", &self.config.password)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                AppError::execution(format!(
                    "Failed to launch {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::execution(format!(
                "sqlcmd exited with {}.\nStdout: {}\nStderr: {}",
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl QueryExecutor for SqlCmdExecutor {
    async fn execute(&self, query: &str) -> Result<String> {
        self.run(query, false).await
    }

    async fn query_value(&self, query: &str) -> Result<String> {
        self.run(query, true).await.map(|out| out.trim().to_string())
    }
}
