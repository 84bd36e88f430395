//! Logging setup. Status lines go to stdout via `println!`; diagnostics go
//! through `tracing` to stderr so they never interleave with progress output.

use tracing_subscriber::EnvFilter;

/// Returns the filter used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "bakrest=debug,info" } else { "warn" }
}

/// Installs a stderr subscriber honouring `RUST_LOG`.
pub fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
