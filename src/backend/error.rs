//! Backend error types

use thiserror::Error;

/// Error types for container backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend executable could not be started at all
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    /// A backend command ran but reported failure
    #[error("{command} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("backend command timed out after {0} seconds")]
    Timeout(u64),

    #[error("internal backend error: {0}")]
    Internal(String),
}
