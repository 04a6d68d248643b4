//! Shared value types for the relay table and control surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Maximum accepted length of the `Call-ID` number component.
pub const CALLID_NUM_MAX: usize = 128;
/// Maximum accepted length of the `Call-ID` host component.
pub const CALLID_HOST_MAX: usize = 128;
/// Upper bound accepted by [`crate::security::security_check`].
pub const SIP_BUF_MAX: usize = 4096;

/// SIP `Call-ID` header, split into its `number@host`-style components.
///
/// Bounded to [`CALLID_NUM_MAX`] / [`CALLID_HOST_MAX`] bytes; construction through
/// [`CallId::new`] enforces the bound so a slot never has to re-check it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId {
    pub number: String,
    pub host: String,
}

impl CallId {
    pub fn new(number: impl Into<String>, host: impl Into<String>) -> crate::Result<Self> {
        let number = number.into();
        let host = host.into();
        if number.len() > CALLID_NUM_MAX {
            return Err(crate::RelayError::bad_argument(format!(
                "call-id number exceeds {CALLID_NUM_MAX} bytes"
            )));
        }
        if host.len() > CALLID_HOST_MAX {
            return Err(crate::RelayError::bad_argument(format!(
                "call-id host exceeds {CALLID_HOST_MAX} bytes"
            )));
        }
        Ok(Self { number, host })
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.number, self.host)
    }
}

/// Direction of a single relay slot. Each media stream occupies one slot per
/// direction; the two are paired by `(call_id, media_stream_no)` lookup, not by
/// pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// The slot a forwarded datagram should land in: the opposite direction of the
    /// slot it arrived on.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Inbound => Direction::Outbound,
            Direction::Outbound => Direction::Inbound,
        }
    }
}

/// Relay backend selected at process startup (`rtp_proxy_enable` in configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// No relaying; the backend's `start`/`stop` are silent no-ops that
    /// succeed rather than failing.
    Disabled,
    /// Proxy receives and re-sends every datagram in userspace.
    Userspace,
    /// Proxy installs a kernel NAT/firewall rule and never touches datagrams.
    Masquerade,
}

/// The two endpoints a `start_fwd` call needs to wire up.
#[derive(Debug, Clone, Copy)]
pub struct EndpointPair {
    pub outbound_ip: IpAddr,
    pub inside: SocketAddr,
}

/// `(call_id, media_stream_no, direction)` — at most one active slot matches any
/// given triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub call_id: CallId,
    pub media_stream_no: u32,
    pub direction: Direction,
}
