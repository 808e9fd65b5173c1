//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and command
//! handling. Errors raised while handling a single command are turned into
//! an error reply; only startup errors end the process.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: waymark_core::config::ConfigError,
    },

    /// A marker or image operation failed.
    #[error("{source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: waymark_store::StoreError,
    },

    /// The tracker rejected an input.
    #[error("{source}")]
    Tracker {
        /// The underlying tracker error.
        #[from]
        source: waymark_core::TrackerError,
    },

    /// A command line was not a valid command.
    #[error("malformed command: {source}")]
    Protocol {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// Reading stdin or writing stdout failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The tracker task is gone and can no longer take input.
    #[error("tracker stopped")]
    TrackerStopped,
}
