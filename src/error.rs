/// Errors that can occur when configuring a map or one of its queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The shard count is invalid (must be a power of two; zero selects the default).
    InvalidShardCount(usize),
    /// A ring queue was requested with zero capacity.
    InvalidCapacity,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidShardCount(count) => {
                write!(f, "shard count must be a power of two, got {}", count)
            }
            Error::InvalidCapacity => write!(f, "queue capacity must be greater than 0"),
        }
    }
}

impl std::error::Error for Error {}
