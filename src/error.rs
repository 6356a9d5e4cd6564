use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parameter negotiation failed or was rejected. Fatal before any
    /// data connection opens.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// A connection could not be established within the retry policy.
    #[error("connection error: {0}")]
    Connection(String),

    /// Fewer than the configured number of data connections could be
    /// established. The session fails; no partial result is reported.
    #[error("only {established} of {required} data connections established")]
    PartialConnect { established: usize, required: usize },

    /// I/O failure on an established data connection. Local to one
    /// stream; the session continues and finishes as `Partial`.
    #[error("transfer error: {0}")]
    Transfer(#[source] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
