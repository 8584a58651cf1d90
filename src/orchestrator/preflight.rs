//! Checks and warmup performed before any measurement.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::protocol::messages::{initialize_request, INITIALIZE_ID};
use crate::session::SessionLauncher;
use crate::transport::write_json_line;
use crate::{AppError, Result};

/// Verify that the relay executable and the server command exist.
///
/// # Errors
///
/// Returns `AppError::MissingExecutable` naming the first one not found.
pub fn check_executables(config: &BenchConfig) -> Result<()> {
    if !config.relay_binary.is_file() {
        return Err(AppError::MissingExecutable(format!(
            "relay binary not found at {}",
            config.relay_binary.display()
        )));
    }

    let program = config
        .server_command
        .first()
        .ok_or_else(|| AppError::Config("server_command must not be empty".into()))?;
    let resolved = find_executable(program, std::env::var_os("PATH").as_deref())
        .ok_or_else(|| AppError::MissingExecutable(format!("{program} not found on PATH")))?;

    info!(
        relay = %config.relay_binary.display(),
        server = %resolved.display(),
        "executables found"
    );
    Ok(())
}

/// Resolve `program` the way a shell would: paths are taken as-is, bare
/// names are searched for in `path_var`.
#[must_use]
pub fn find_executable(program: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

/// Start one direct server, send `initialize`, read a single line, and
/// close it. Primes package caches so the first measured cold start is
/// not dominated by a download. Never fails; problems are logged.
pub async fn warmup(launcher: &SessionLauncher, timeout: Duration) {
    let mut session = match launcher.open_direct() {
        Ok(session) => session,
        Err(err) => {
            warn!(%err, "warmup server could not be started");
            return;
        }
    };

    let exchange = async {
        write_json_line(&mut session.stdin, &initialize_request(INITIALIZE_ID)).await?;
        session.reader.read_line_within(timeout).await
    };
    match exchange.await {
        Ok(_) => info!("warmup complete"),
        Err(err) => warn!(%err, "warmup did not complete"),
    }

    launcher.close(session).await;
}
