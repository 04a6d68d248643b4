//! Relay backend abstraction: the interchangeable strategies behind one trait.
//! Selected once at process startup from [`crate::types::RelayMode`] and
//! stored behind a trait object — no per-call branching on the configuration value.

pub mod disabled;
pub mod masquerade;
pub mod userspace;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::UdpSocket;

pub use disabled::DisabledBackend;
pub use masquerade::{FirewallController, LoggingFirewallController, MasqueradeBackend};
pub use userspace::UserspaceBackend;

/// What a successful `on_ready` found on a socket.
#[derive(Debug)]
pub struct Datagram {
    pub from: SocketAddr,
    pub payload: Vec<u8>,
}

/// Owned per-slot resource. A userspace slot owns a real socket; a masquerade slot
/// owns an opaque non-zero marker so the active-iff-handle-present invariant
/// holds without a socket to point at; a disabled-mode slot owns nothing at all.
#[derive(Clone)]
pub enum BackendHandle {
    Userspace(Arc<UdpSocket>),
    Masquerade(u64),
    Disabled,
}

impl BackendHandle {
    /// The socket the readiness set should watch, if any.
    pub fn socket(&self) -> Option<&Arc<UdpSocket>> {
        match self {
            BackendHandle::Userspace(socket) => Some(socket),
            BackendHandle::Masquerade(_) | BackendHandle::Disabled => None,
        }
    }
}

/// `start` / `stop` / `on_ready` — the small interface shared by both relay modes.
/// `on_ready` is a no-op for masquerade (traffic bypasses the process entirely).
#[async_trait]
pub trait RelayBackend: Send + Sync {
    async fn start(
        &self,
        outbound_ip: IpAddr,
        outbound_port: u16,
        inside: SocketAddr,
    ) -> crate::Result<BackendHandle>;

    /// Release the resources behind `handle`. `outbound_ip`/`outbound_port` are
    /// passed through from the slot being torn down because the masquerade backend
    /// needs them to remove its NAT mapping — the handle itself only carries an
    /// opaque marker.
    async fn stop(&self, handle: &BackendHandle, outbound_ip: IpAddr, outbound_port: u16) -> crate::Result<()>;

    /// Read exactly one datagram from `handle`. Only meaningful for userspace
    /// handles; masquerade handles never appear in the readiness set so this is
    /// never called for them, but the default returns `Ok(None)` for safety.
    async fn on_ready(&self, handle: &BackendHandle, now: Instant) -> crate::Result<Option<Datagram>> {
        let _ = (handle, now);
        Ok(None)
    }
}
