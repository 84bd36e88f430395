use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pre-flight check against the upload server or the SQL Server host failed.
    #[error("Connectivity check failed: {0}")]
    Connectivity(String),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// The upload server answered with a body we could not interpret.
    #[error("Unexpected server response: {0}")]
    Protocol(String),

    #[error("Command execution failed: {stderr}")]
    Execution { stderr: String },

    #[error("Restore planning failed: {0}")]
    Planning(String),

    /// RESTORE finished but the database could not be brought back online.
    /// Retrying `ALTER DATABASE .. SET ONLINE` is enough to recover.
    #[error("Database {database} was restored but is still offline: {reason}")]
    RestoredOffline { database: String, reason: String },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn execution(stderr: impl Into<String>) -> Self {
        Self::Execution {
            stderr: stderr.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Short label used when a phase reports its failure.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Connectivity(_) => "connectivity",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Execution { .. } => "execution",
            Self::Planning(_) => "planning",
            Self::RestoredOffline { .. } => "restored-offline",
            Self::Cancelled(_) => "cancelled",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
