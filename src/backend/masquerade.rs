//! Kernel masquerade relay backend. `start`/`stop` install and remove a
//! bidirectional NAT mapping through a pluggable [`FirewallController`]; no socket
//! is owned, so datagrams never transit this process and `on_ready` is never
//! called for these handles. The source's open question — no liveness signal for
//! masqueraded traffic — is accepted as-is; slots expire by wall-clock only.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use super::{BackendHandle, RelayBackend};

/// The per-packet kernel firewall/NAT primitive is out of scope for this crate;
/// this trait is the seam a real integration plugs into.
#[async_trait]
pub trait FirewallController: Send + Sync {
    async fn install(
        &self,
        outbound_ip: IpAddr,
        outbound_port: u16,
        inside: SocketAddr,
    ) -> crate::Result<()>;

    async fn remove(&self, outbound_ip: IpAddr, outbound_port: u16) -> crate::Result<()>;
}

/// Test-double / development stand-in: logs the mapping it would install instead
/// of touching the kernel.
#[derive(Debug, Default)]
pub struct LoggingFirewallController;

#[async_trait]
impl FirewallController for LoggingFirewallController {
    async fn install(
        &self,
        outbound_ip: IpAddr,
        outbound_port: u16,
        inside: SocketAddr,
    ) -> crate::Result<()> {
        info!(%outbound_ip, outbound_port, %inside, "would install NAT mapping");
        Ok(())
    }

    async fn remove(&self, outbound_ip: IpAddr, outbound_port: u16) -> crate::Result<()> {
        info!(%outbound_ip, outbound_port, "would remove NAT mapping");
        Ok(())
    }
}

pub struct MasqueradeBackend {
    firewall: Box<dyn FirewallController>,
    next_marker: AtomicU64,
}

impl MasqueradeBackend {
    pub fn new(firewall: Box<dyn FirewallController>) -> Self {
        Self {
            firewall,
            next_marker: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RelayBackend for MasqueradeBackend {
    async fn start(
        &self,
        outbound_ip: IpAddr,
        outbound_port: u16,
        inside: SocketAddr,
    ) -> crate::Result<BackendHandle> {
        self.firewall.install(outbound_ip, outbound_port, inside).await?;
        // Marker only needs to be non-zero and unique enough for debugging; it is
        // never dereferenced.
        let marker = self.next_marker.fetch_add(1, Ordering::Relaxed);
        Ok(BackendHandle::Masquerade(marker))
    }

    async fn stop(&self, handle: &BackendHandle, outbound_ip: IpAddr, outbound_port: u16) -> crate::Result<()> {
        let BackendHandle::Masquerade(marker) = handle else {
            warn!("masquerade backend asked to stop a non-masquerade handle");
            return Ok(());
        };
        let _ = marker;
        self.firewall.remove(outbound_ip, outbound_port).await
    }
}
