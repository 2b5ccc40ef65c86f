/// Error type used throughout the crate; failures are reported with context
/// and mostly end up in a log line followed by a restart.
pub type Error = anyhow::Error;

/// `Result` alias defaulting to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
