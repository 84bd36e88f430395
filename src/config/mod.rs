// bakrest/src/config/mod.rs
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::cli::Cli;
use crate::errors::{AppError, Result};

/// Timeout for the small JSON requests (readiness, upload id, progress).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Connect timeout for the streaming upload; the body itself has no total timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Clone)]
pub struct SqlServerConfig {
    pub server: String,
    pub user: String,
    pub password: String,
    pub trust_server_certificate: bool,
    pub sqlcmd_path: Option<PathBuf>,
}

// Keep the password out of `{:?}` output.
impl fmt::Debug for SqlServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerConfig")
            .field("server", &self.server)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("sqlcmd_path", &self.sqlcmd_path)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upload: UploadConfig,
    pub sql: SqlServerConfig,
    pub backup_file: PathBuf,
    pub database_name: String,
    pub poll_interval: Duration,
}

impl AppConfig {
    /// Resolves and validates the configuration. Nothing here touches the
    /// network or spawns a process, so a bad invocation fails before either.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let password = cli
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "SA password not provided. Use --password or set SA_PASSWORD environment variable."
                        .to_string(),
                )
            })?;

        let base_url = parse_base_url(&cli.base_url)?;

        if !cli.file_path.is_file() {
            return Err(AppError::Config(format!(
                "Backup file not found or not a regular file: {}",
                cli.file_path.display()
            )));
        }

        let database_name = cli.database_name.trim().to_string();
        if database_name.is_empty() {
            return Err(AppError::Config("Database name cannot be empty.".to_string()));
        }

        if cli.sql_server_name.trim().is_empty() {
            return Err(AppError::Config("SQL Server name cannot be empty.".to_string()));
        }

        Ok(AppConfig {
            upload: UploadConfig {
                base_url,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            },
            sql: SqlServerConfig {
                server: cli.sql_server_name.trim().to_string(),
                user: cli.user.clone(),
                password,
                trust_server_certificate: !cli.verify_server_certificate,
                sqlcmd_path: cli.sqlcmd_path.clone(),
            },
            backup_file: cli.file_path.clone(),
            database_name,
            poll_interval: Duration::from_secs(cli.poll_interval_secs.max(1)),
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::Config(format!("Invalid base URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Config(format!(
            "Base URL must use http or https, got '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli_for(file: &std::path::Path, password: Option<&str>) -> Cli {
        Cli {
            base_url: "http://127.0.0.1:5000".to_string(),
            file_path: file.to_path_buf(),
            sql_server_name: "sql01".to_string(),
            database_name: "Orders".to_string(),
            password: password.map(str::to_string),
            user: "sa".to_string(),
            poll_interval_secs: 1,
            verify_server_certificate: false,
            sqlcmd_path: None,
            verbose: false,
        }
    }

    #[test]
    fn test_missing_password_is_config_error() -> anyhow::Result<()> {
        let mut bak = tempfile::NamedTempFile::new()?;
        bak.write_all(b"TAPE")?;

        let err = AppConfig::from_cli(&cli_for(bak.path(), None)).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("SA password not provided"));

        let err = AppConfig::from_cli(&cli_for(bak.path(), Some(""))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        Ok(())
    }

    #[test]
    fn test_valid_configuration() -> anyhow::Result<()> {
        let bak = tempfile::NamedTempFile::new()?;
        let config = AppConfig::from_cli(&cli_for(bak.path(), Some("secret")))?;

        assert_eq!(config.upload.base_url.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(config.sql.password, "secret");
        assert!(config.sql.trust_server_certificate);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.database_name, "Orders");
        Ok(())
    }

    #[test]
    fn test_missing_backup_file_rejected() {
        let cli = cli_for(std::path::Path::new("/definitely/not/here.bak"), Some("secret"));
        let err = AppConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_base_url_scheme_validated() -> anyhow::Result<()> {
        let bak = tempfile::NamedTempFile::new()?;
        let mut cli = cli_for(bak.path(), Some("secret"));
        cli.base_url = "ftp://files.example.com".to_string();
        assert!(AppConfig::from_cli(&cli).is_err());

        cli.base_url = "not a url".to_string();
        assert!(AppConfig::from_cli(&cli).is_err());
        Ok(())
    }

    #[test]
    fn test_debug_output_redacts_password() -> anyhow::Result<()> {
        let bak = tempfile::NamedTempFile::new()?;
        let config = AppConfig::from_cli(&cli_for(bak.path(), Some("hunter2")))?;
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        Ok(())
    }
}
