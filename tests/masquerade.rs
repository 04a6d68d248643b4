//! Masquerade mode: `start_fwd`/`stop_fwd` drive the firewall collaborator
//! instead of owning a socket, and torn-down/aged slots never appear in the
//! readiness set (they have no socket to watch).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rtprelay::backend::{FirewallController, MasqueradeBackend};
use rtprelay::config::RelayConfig;
use rtprelay::types::{CallId, Direction};
use rtprelay::RelayService;

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

#[derive(Default)]
struct CountingFirewall {
    installs: AtomicUsize,
    removes: AtomicUsize,
}

#[async_trait]
impl FirewallController for CountingFirewall {
    async fn install(&self, _outbound_ip: IpAddr, _outbound_port: u16, _inside: SocketAddr) -> rtprelay::Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, _outbound_ip: IpAddr, _outbound_port: u16) -> rtprelay::Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn start_and_stop_drive_the_firewall_collaborator() {
    let firewall = Arc::new(CountingFirewall::default());
    let backend = Arc::new(MasqueradeBackend::new(Box::new(SharedFirewall(firewall.clone()))));

    let mut config = RelayConfig::default();
    config.rtp_table_size = 4;
    config.outbound_bind_ip = localhost();
    let service = RelayService::new(config, backend);

    let call_id = CallId::new("masq", "h.example").unwrap();
    let inside = SocketAddr::new(localhost(), 40000);
    service
        .start_fwd(&call_id, 0, Direction::Outbound, localhost(), inside)
        .await
        .unwrap();
    assert_eq!(firewall.installs.load(Ordering::SeqCst), 1);
    assert_eq!(service.active_slot_count().await, 1);

    service.stop_fwd(&call_id).await.unwrap();
    assert_eq!(service.active_slot_count().await, 0);
    assert_eq!(firewall.removes.load(Ordering::SeqCst), 1);
}

/// `FirewallController` needs an owned `Box<dyn FirewallController>`, but the
/// test wants to keep observing the same counters afterward.
struct SharedFirewall(Arc<CountingFirewall>);

#[async_trait]
impl FirewallController for SharedFirewall {
    async fn install(&self, outbound_ip: IpAddr, outbound_port: u16, inside: SocketAddr) -> rtprelay::Result<()> {
        self.0.install(outbound_ip, outbound_port, inside).await
    }

    async fn remove(&self, outbound_ip: IpAddr, outbound_port: u16) -> rtprelay::Result<()> {
        self.0.remove(outbound_ip, outbound_port).await
    }
}
