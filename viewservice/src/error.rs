use thiserror::Error;

/// Result type of view service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the view service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The backup had to be promoted but there was none. The service cannot
    /// produce a primary from nothing and halts.
    #[error("no backup to promote in view {viewnum} (primary {primary:?})")]
    NoBackup {
        /// View number at the time of the failed promotion.
        viewnum: u64,
        /// Primary being replaced.
        primary: Option<String>,
    },
    /// The service was killed or halted on a fatal error.
    #[error("view service is dead")]
    Dead,
    /// Unusable configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the error leaves the service unable to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NoBackup { .. })
    }
}
