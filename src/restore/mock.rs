//! In-memory `QueryExecutor` that records every query it receives.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::sqlcmd::QueryExecutor;
use crate::errors::{AppError, Result};

#[derive(Default)]
pub struct MockExecutor {
    log: Mutex<Vec<String>>,
    database_exists: bool,
    existence_check_fails: bool,
    fail_on: Option<&'static str>,
    cancel_after: Option<(&'static str, CancellationToken)>,
    progress: Mutex<VecDeque<String>>,
}

impl MockExecutor {
    pub fn new(database_exists: bool) -> Self {
        Self {
            database_exists,
            ..Default::default()
        }
    }

    /// Any query containing `needle` exits non-zero.
    pub fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }

    pub fn with_failing_existence_check(mut self) -> Self {
        self.existence_check_fails = true;
        self
    }

    /// Cancels `token` right after a query containing `needle` succeeds.
    pub fn cancelling_after(mut self, needle: &'static str, token: CancellationToken) -> Self {
        self.cancel_after = Some((needle, token));
        self
    }

    pub fn with_progress(self, outputs: &[&str]) -> Self {
        self.progress
            .lock()
            .unwrap()
            .extend(outputs.iter().map(|s| s.to_string()));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Statements that change the database, in the order they were issued.
    pub fn commands(&self) -> Vec<String> {
        self.queries()
            .into_iter()
            .filter(|q| q.contains("ALTER DATABASE") || q.contains("RESTORE DATABASE"))
            .collect()
    }

    fn record(&self, query: &str) -> Result<()> {
        self.log.lock().unwrap().push(query.to_string());
        if let Some(needle) = self.fail_on {
            if query.contains(needle) {
                return Err(AppError::execution(format!("mock failure on {needle}")));
            }
        }
        Ok(())
    }

    fn after(&self, query: &str) {
        if let Some((needle, token)) = &self.cancel_after {
            if query.contains(needle) {
                token.cancel();
            }
        }
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(&self, query: &str) -> Result<String> {
        self.record(query)?;
        self.after(query);
        Ok(String::new())
    }

    async fn query_value(&self, query: &str) -> Result<String> {
        if query.contains("percent_complete") {
            // Progress probes are not part of the command log.
            return Ok(self.progress.lock().unwrap().pop_front().unwrap_or_default());
        }
        self.record(query)?;
        if query.contains("sys.databases") {
            if self.existence_check_fails {
                return Err(AppError::execution("Login failed for user 'sa'"));
            }
            return Ok(if self.database_exists { "1" } else { "0" }.to_string());
        }
        Ok("1".to_string())
    }
}
