//! Backend for `RelayMode::Disabled`: a silent no-op, not a hard failure —
//! `start`/`stop` both succeed without allocating any resource, mirroring a
//! relay that has been administratively turned off rather than one that is
//! misconfigured.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use super::{BackendHandle, RelayBackend};

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBackend;

impl DisabledBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RelayBackend for DisabledBackend {
    async fn start(
        &self,
        _outbound_ip: IpAddr,
        _outbound_port: u16,
        _inside: SocketAddr,
    ) -> crate::Result<BackendHandle> {
        Ok(BackendHandle::Disabled)
    }

    async fn stop(&self, _handle: &BackendHandle, _outbound_ip: IpAddr, _outbound_port: u16) -> crate::Result<()> {
        Ok(())
    }
}
