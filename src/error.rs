//! Error types surfaced by the session store and coordinator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O or transaction failure inside the store.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("session {0} not found")]
    NotFound(i64),

    #[error("quality rating {0} is outside 0..=5")]
    InvalidQuality(i32),

    /// The coordinator was torn down before the command could run.
    #[error("session coordinator has shut down")]
    Cancelled,
}

impl Error {
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

// Repository closures run on the DB thread and return `anyhow::Result`; typed errors
// raised there travel inside the anyhow wrapper and are recovered here.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(typed) => typed,
            Err(other) => Error::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_survive_anyhow_round_trip() {
        let wrapped = anyhow::Error::new(Error::NotFound(7));
        match Error::from(wrapped) {
            Error::NotFound(id) => assert_eq!(id, 7),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn plain_anyhow_becomes_storage() {
        let err = Error::from(anyhow::anyhow!("disk full"));
        assert!(err.is_storage());
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
