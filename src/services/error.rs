// ABOUTME: Error types for service collaborator operations with SNAFU pattern.
// ABOUTME: Distinguishes launch failures, non-zero exits, timeouts, and missing snapshot support.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("{service}: failed to launch `{command}`: {source}"))]
    Spawn {
        service: String,
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("{service}: `{command}` exited with {code:?}: {stderr}"))]
    CommandFailed {
        service: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("{service}: `{command}` timed out after {seconds}s"))]
    Timeout {
        service: String,
        command: String,
        seconds: u64,
    },

    #[snafu(display("{service} does not support snapshots"))]
    SnapshotUnsupported { service: String },

    #[snafu(display("{service}: {message}"))]
    Unavailable { service: String, message: String },
}
