//! Asynchronous utilities for use with Tokio.

use regex::Regex;

use crate::prelude::*;

pub mod io;

/// Report any command failures, and include any error output.
///
/// Standard output is logged at `debug`. Standard error is logged at `warn`
/// if the command failed, and at `debug` otherwise. Standard error may be
/// optionally checked against a regex to determine if the command failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    error_regex: Option<&Regex>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );

    let regex_failure = output.status.success()
        && error_regex.is_some_and(|regex| regex.is_match(&stderr));
    if output.status.success() && !regex_failure {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
        return Ok(());
    }
    warn!(
        command_name = command_name,
        output = %stderr,
        "Standard error from failed command",
    );

    if regex_failure {
        Err(anyhow!(
            "{} printed error output:\n{}",
            command_name,
            stderr,
        ))
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that turns a panic in the
/// background task into an error.
pub async fn spawn_blocking_catching_panics<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("background task panicked")
}
