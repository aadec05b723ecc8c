//! Host network errors

use thiserror::Error;

/// Errors raised while inspecting or changing host network state
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The command could not be spawned or its output not collected
    #[error("failed to run `{command}`: {source}")]
    Io {
        /// Command line
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish within the configured timeout
    #[error("`{command}` timed out after {secs}s")]
    Timeout {
        /// Command line
        command: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// The command exited non-zero
    #[error("`{command}` failed (exit {code:?}): {output}")]
    CommandFailed {
        /// Command line
        command: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Combined stdout and stderr
        output: String,
    },

    /// The command succeeded but its output could not be understood
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput {
        /// Command line
        command: String,
        /// Raw output
        output: String,
    },
}
