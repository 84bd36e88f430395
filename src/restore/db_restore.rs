// bakrest/src/restore/db_restore.rs
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::move_plan::RestorePlan;
use super::sqlcmd::QueryExecutor;
use crate::errors::{AppError, Result};
use crate::utils::{quote_identifier, quote_literal};

/// Where a restore currently stands.
///
/// `Checking -> {NotExists, ExistsOnline}`, `ExistsOnline -> Offline`,
/// then `Restoring -> {Done, Failed}`. `Done` carries the message shown to
/// the user; a failure's reason travels in the returned error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreState {
    Checking,
    NotExists,
    ExistsOnline,
    Offline,
    Restoring,
    Done(String),
    Failed,
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub database: String,
    /// Path of the .bak file as seen by the SQL Server host.
    pub backup_file_path: String,
    pub plan: RestorePlan,
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub database: String,
    pub existed: bool,
    pub files_moved: usize,
    pub history: Vec<RestoreState>,
}

impl RestoreReport {
    /// Message recorded by the final `Done` state.
    pub fn outcome(&self) -> Option<&str> {
        match self.history.last() {
            Some(RestoreState::Done(message)) => Some(message),
            _ => None,
        }
    }
}

pub fn existence_query(database: &str) -> String {
    format!(
        "SET NOCOUNT ON; SELECT COUNT(*) FROM sys.databases WHERE name = N{};",
        quote_literal(database)
    )
}

pub fn offline_query(database: &str) -> String {
    format!(
        "ALTER DATABASE {} SET OFFLINE WITH ROLLBACK IMMEDIATE;",
        quote_identifier(database)
    )
}

pub fn online_query(database: &str) -> String {
    format!("ALTER DATABASE {} SET ONLINE;", quote_identifier(database))
}

/// RESTORE with every relocation clause, REPLACE and per-percent stats.
pub fn restore_query(database: &str, backup_file_path: &str, plan: &RestorePlan) -> String {
    let mut clauses = plan.statements();
    clauses.push("REPLACE".to_string());
    clauses.push("STATS=1".to_string());
    format!(
        "RESTORE DATABASE {}\nFROM DISK = {}\nWITH\n     {};",
        quote_identifier(database),
        quote_literal(backup_file_path),
        clauses.join(",\n     ")
    )
}

/// Prefixes the step that failed onto an execution error.
fn step_failed(step: &str, err: AppError) -> AppError {
    match err {
        AppError::Execution { stderr } => AppError::execution(format!("{}: {}", step, stderr)),
        other => other,
    }
}

/// Sequences existence check, offline, restore and online against one database.
pub struct RestoreStateMachine {
    executor: Arc<dyn QueryExecutor>,
    cancel: CancellationToken,
    state: RestoreState,
    history: Vec<RestoreState>,
}

impl RestoreStateMachine {
    pub fn new(executor: Arc<dyn QueryExecutor>, cancel: CancellationToken) -> Self {
        Self {
            executor,
            cancel,
            state: RestoreState::Checking,
            history: vec![RestoreState::Checking],
        }
    }

    fn transition(&mut self, next: RestoreState) {
        info!("Restore state: {:?} -> {:?}", self.state, next);
        self.history.push(next.clone());
        self.state = next;
    }

    /// Drives the restore to a terminal state.
    pub async fn run(mut self, request: RestoreRequest) -> Result<RestoreReport> {
        match self.drive(&request).await {
            Ok(existed) => {
                self.transition(RestoreState::Done(format!(
                    "Database {} restored successfully.",
                    request.database
                )));
                Ok(RestoreReport {
                    database: request.database,
                    existed,
                    files_moved: request.plan.len(),
                    history: self.history,
                })
            }
            Err(e) => {
                self.transition(RestoreState::Failed);
                Err(e)
            }
        }
    }

    /// Returns whether the database existed before the restore.
    async fn drive(&mut self, request: &RestoreRequest) -> Result<bool> {
        let db = request.database.as_str();
        if request.plan.is_empty() {
            return Err(AppError::Planning(format!(
                "No valid logical files to restore for database {}",
                db
            )));
        }
        self.ensure_not_cancelled("before the restore started")?;

        println!("Starting restore process for database: {}", db);
        let exists = self.database_exists(db).await?;

        if exists {
            self.transition(RestoreState::ExistsOnline);
            self.ensure_not_cancelled("before the database was taken offline")?;

            println!("Setting database {} offline.", db);
            self.executor
                .execute(&offline_query(db))
                .await
                .map_err(|e| step_failed(&format!("Failed to set database {} offline", db), e))?;
            self.transition(RestoreState::Offline);

            if self.cancel.is_cancelled() {
                // Nothing has been restored yet; put the database back as it was.
                println!("Cancelled; setting database {} back online.", db);
                self.executor.execute(&online_query(db)).await.map_err(|e| {
                    step_failed(
                        &format!("Cancelled after taking {} offline and could not bring it back online", db),
                        e,
                    )
                })?;
                return Err(AppError::Cancelled(format!(
                    "restore of {} cancelled before RESTORE was issued",
                    db
                )));
            }
        } else {
            self.transition(RestoreState::NotExists);
            self.ensure_not_cancelled("before RESTORE was issued")?;
        }

        self.transition(RestoreState::Restoring);
        let query = restore_query(db, &request.backup_file_path, &request.plan);
        self.executor
            .execute(&query)
            .await
            .map_err(|e| step_failed(&format!("Failed to restore the database {}", db), e))?;

        if exists {
            println!("Setting database {} online.", db);
            self.bring_online(db).await?;
        }
        Ok(exists)
    }

    async fn database_exists(&self, db: &str) -> Result<bool> {
        let output = self
            .executor
            .query_value(&existence_query(db))
            .await
            .map_err(|e| step_failed(&format!("Failed to check whether database {} exists", db), e))?;
        output
            .trim()
            .parse::<u64>()
            .map(|count| count > 0)
            .map_err(|_| {
                AppError::execution(format!(
                    "Unexpected output from existence check for {}: {:?}",
                    db, output
                ))
            })
    }

    async fn bring_online(&self, db: &str) -> Result<()> {
        self.executor
            .execute(&online_query(db))
            .await
            .map(|_| ())
            .map_err(|e| AppError::RestoredOffline {
                database: db.to_string(),
                reason: e.to_string(),
            })
    }

    fn ensure_not_cancelled(&self, when: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!("restore cancelled {}", when)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::mock::MockExecutor;
    use crate::restore::move_plan::{plan, LogicalFile};
    use pretty_assertions::assert_eq;

    fn request() -> RestoreRequest {
        let files = vec![
            LogicalFile::new("db_data", "data"),
            LogicalFile::new("db_log", "log"),
        ];
        RestoreRequest {
            database: "Orders".to_string(),
            backup_file_path: "/srv/uploads/orders.bak".to_string(),
            plan: plan("Orders", "/var/restore", &files),
        }
    }

    async fn run_with(mock: Arc<MockExecutor>, cancel: CancellationToken) -> Result<RestoreReport> {
        RestoreStateMachine::new(mock, cancel).run(request()).await
    }

    #[test]
    fn test_restore_query_text() {
        let query = restore_query("Orders", "/srv/uploads/orders.bak", &request().plan);
        assert_eq!(
            query,
            "RESTORE DATABASE [Orders]\n\
             FROM DISK = '/srv/uploads/orders.bak'\n\
             WITH\n     \
             MOVE 'db_data' TO '/var/restore/Orders.mdf',\n     \
             MOVE 'db_log' TO '/var/restore/Orders_Log.ldf',\n     \
             REPLACE,\n     \
             STATS=1;"
        );
    }

    #[tokio::test]
    async fn test_new_database_skips_offline_and_online() -> anyhow::Result<()> {
        let mock = Arc::new(MockExecutor::new(false));
        let report = run_with(mock.clone(), CancellationToken::new()).await?;

        let commands = mock.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("RESTORE DATABASE [Orders]"));
        assert!(!report.existed);
        assert_eq!(report.files_moved, 2);
        assert_eq!(
            report.history,
            vec![
                RestoreState::Checking,
                RestoreState::NotExists,
                RestoreState::Restoring,
                RestoreState::Done("Database Orders restored successfully.".to_string()),
            ]
        );
        assert_eq!(report.outcome(), Some("Database Orders restored successfully."));
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_database_offline_restore_online_in_order() -> anyhow::Result<()> {
        let mock = Arc::new(MockExecutor::new(true));
        let report = run_with(mock.clone(), CancellationToken::new()).await?;

        let commands = mock.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], offline_query("Orders"));
        assert!(commands[1].starts_with("RESTORE DATABASE"));
        assert_eq!(commands[2], online_query("Orders"));
        assert!(report.existed);
        assert!(report.history.contains(&RestoreState::Offline));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_plan_issues_no_commands() {
        let mock = Arc::new(MockExecutor::new(true));
        let mut req = request();
        req.plan = plan("Orders", "/var/restore", &[LogicalFile::new("ft", "fulltext")]);

        let err = RestoreStateMachine::new(mock.clone(), CancellationToken::new())
            .run(req)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Planning(_)));
        assert!(mock.queries().is_empty());
    }

    #[tokio::test]
    async fn test_offline_failure_aborts_before_restore() {
        let mock = Arc::new(MockExecutor::new(true).failing_on("SET OFFLINE"));
        let err = run_with(mock.clone(), CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("Failed to set database Orders offline"));
        assert_eq!(mock.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_failure_is_execution_error() {
        let mock = Arc::new(MockExecutor::new(true).failing_on("RESTORE DATABASE"));
        let err = run_with(mock.clone(), CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, AppError::Execution { .. }));
        assert!(err.to_string().contains("Failed to restore the database Orders"));
        assert!(!mock.commands().iter().any(|c| c.contains("SET ONLINE")));
    }

    #[tokio::test]
    async fn test_online_failure_reports_restored_offline() {
        let mock = Arc::new(MockExecutor::new(true).failing_on("SET ONLINE"));
        let err = run_with(mock.clone(), CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, AppError::RestoredOffline { ref database, .. } if database == "Orders"));
        assert_eq!(mock.commands().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_existence_check_touches_nothing() {
        let mock = Arc::new(MockExecutor::new(true).with_failing_existence_check());
        let err = run_with(mock.clone(), CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("Failed to check whether database Orders exists"));
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let mock = Arc::new(MockExecutor::new(true));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_with(mock.clone(), cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(mock.queries().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_offline_brings_database_back_online() {
        let cancel = CancellationToken::new();
        let mock = Arc::new(MockExecutor::new(true).cancelling_after("SET OFFLINE", cancel.clone()));

        let err = run_with(mock.clone(), cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(
            mock.commands(),
            vec![offline_query("Orders"), online_query("Orders")]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_restore_still_brings_online() -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let mock = Arc::new(MockExecutor::new(true).cancelling_after("RESTORE DATABASE", cancel.clone()));

        let report = run_with(mock.clone(), cancel).await?;
        assert!(report.existed);
        assert_eq!(mock.commands().len(), 3);
        Ok(())
    }

    #[test]
    fn test_identifier_escaping_in_queries() {
        assert_eq!(
            offline_query("a]b"),
            "ALTER DATABASE [a]]b] SET OFFLINE WITH ROLLBACK IMMEDIATE;"
        );
        assert_eq!(
            existence_query("O'Neil"),
            "SET NOCOUNT ON; SELECT COUNT(*) FROM sys.databases WHERE name = N'O''Neil';"
        );
    }
}
