//! Persistence error types

/// Errors from the durable store
#[derive(Debug)]
pub enum PersistenceError {
    /// IO error from the storage engine
    Io(std::io::Error),
    /// Storage engine error
    Storage(fjall::Error),
    /// Message serialization failed
    Encode(bincode::error::EncodeError),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "io error: {}", e),
            PersistenceError::Storage(e) => write!(f, "storage error: {}", e),
            PersistenceError::Encode(e) => write!(f, "encode error: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io(e)
    }
}

impl From<fjall::Error> for PersistenceError {
    fn from(e: fjall::Error) -> Self {
        PersistenceError::Storage(e)
    }
}

impl From<bincode::error::EncodeError> for PersistenceError {
    fn from(e: bincode::error::EncodeError) -> Self {
        PersistenceError::Encode(e)
    }
}
