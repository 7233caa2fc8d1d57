//! Transport-level failures and their mapping into the unified `CacheError`.

use thiserror::Error;

use unicache_common::CacheError;

/// Result type for the transport layer (pool, RESP framing, routing).
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised below the command contract.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// Server returned an error reply.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },

    /// Response type did not match the expected command response.
    #[error("unexpected response to {command}")]
    UnexpectedResponse { command: String },

    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted for {addr}")]
    PoolExhausted { addr: String },

    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// No cluster node currently owns the slot.
    #[error("no cluster node serves slot {0}")]
    SlotUnassigned(u16),

    /// MOVED/ASK chain exceeded the configured limit.
    #[error("too many cluster redirects for slot {slot}")]
    TooManyRedirects { slot: u16 },
}

impl ClientError {
    pub(crate) fn unexpected(command: &[u8]) -> Self {
        ClientError::UnexpectedResponse {
            command: String::from_utf8_lossy(command).into_owned(),
        }
    }

    /// True when the server reports an unknown script digest.
    pub fn is_noscript(&self) -> bool {
        matches!(self, ClientError::Server { message } if message.starts_with(b"NOSCRIPT"))
    }

    /// True for failures that leave the connection in an unknown state.
    pub(crate) fn breaks_connection(&self) -> bool {
        matches!(self, ClientError::Io(_) | ClientError::Protocol(_))
    }
}

impl From<ClientError> for CacheError {
    fn from(err: ClientError) -> Self {
        CacheError::backend(err)
    }
}
