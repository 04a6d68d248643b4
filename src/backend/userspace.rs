//! Userspace relay backend: owns a UDP socket per slot and forwards datagrams in
//! process. Grounded on the socket2-based bind-with-reuse dance `nyx-transport`
//! uses for its outbound socket, and on the non-blocking `recv_from` poll pattern
//! its STUN server uses to read one datagram per wakeup.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use super::{BackendHandle, Datagram, RelayBackend};

/// Binds plain, non-pooled UDP sockets. One instance is shared by every userspace
/// slot in the table.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserspaceBackend;

impl UserspaceBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RelayBackend for UserspaceBackend {
    async fn start(
        &self,
        outbound_ip: IpAddr,
        outbound_port: u16,
        inside: SocketAddr,
    ) -> crate::Result<BackendHandle> {
        let addr = SocketAddr::new(outbound_ip, outbound_port);
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let std_socket: std::net::UdpSocket = socket.into();
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket)?;
        debug!(%addr, %inside, "userspace relay socket bound");
        Ok(BackendHandle::Userspace(Arc::new(socket)))
    }

    async fn stop(&self, handle: &BackendHandle, _outbound_ip: IpAddr, _outbound_port: u16) -> crate::Result<()> {
        // Dropping the last `Arc<UdpSocket>` closes the descriptor; nothing else
        // to release here.
        if let BackendHandle::Userspace(socket) = handle {
            debug!(local = ?socket.local_addr().ok(), "userspace relay socket released");
        }
        Ok(())
    }

    async fn on_ready(
        &self,
        handle: &BackendHandle,
        _now: Instant,
    ) -> crate::Result<Option<Datagram>> {
        let BackendHandle::Userspace(socket) = handle else {
            return Ok(None);
        };
        let mut buf = [0u8; 2048];
        match socket.try_recv_from(&mut buf) {
            Ok((len, from)) => Ok(Some(Datagram {
                from,
                payload: buf[..len].to_vec(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn binds_and_releases_a_socket() {
        let backend = UserspaceBackend::new();
        let handle = backend
            .start(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                0,
                "127.0.0.1:4000".parse().unwrap(),
            )
            .await
            .unwrap();
        assert!(handle.socket().is_some());
        backend
            .stop(&handle, IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn on_ready_forwards_the_datagram_payload() {
        let backend = UserspaceBackend::new();
        let handle = backend
            .start(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                0,
                "127.0.0.1:4000".parse().unwrap(),
            )
            .await
            .unwrap();
        let addr = handle.socket().unwrap().local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"hello", addr).await.unwrap();

        // Give the datagram time to land in the kernel socket buffer before polling.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let datagram = backend
            .on_ready(&handle, Instant::now())
            .await
            .unwrap()
            .expect("datagram should be ready");
        assert_eq!(datagram.payload, b"hello");
    }
}
