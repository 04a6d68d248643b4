use thiserror::Error;

pub type Result<T, E = RelayError> = core::result::Result<T, E>;

/// Status codes observable by the signaling plane, plus the internal I/O failures
/// that back them.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A `Call-ID` component exceeded `CALLID_NUM_MAX`/`CALLID_HOST_MAX`.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The relay table has no free slot.
    #[error("relay table full (rtp_table_size exhausted)")]
    PoolFull,

    /// `rtp_port_low..=rtp_port_high` has no free even port left.
    #[error("no free port in configured range")]
    NoFreePort,

    /// Socket bind or firewall upcall failed while starting a backend.
    #[error("backend error: {0}")]
    BackendError(#[from] std::io::Error),

    /// `stop_fwd` found no slot matching the given Call-ID.
    #[error("no active stream for call-id")]
    NotFound,

    /// Configuration failed to parse or validate.
    #[error("config: {0}")]
    Config(String),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Self::BadArgument(msg.into())
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(e: toml::de::Error) -> Self {
        RelayError::Config(e.to_string())
    }
}
