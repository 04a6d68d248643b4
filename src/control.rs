//! Control surface: the synchronous-semantics `start_fwd` / `stop_fwd`
//! operations the signaling plane calls on call setup and teardown. Both mutate
//! the table under the service's mutex and wake the relay loop; `stop_fwd_locked`
//! is the only legal caller-already-holds-the-lock variant, used solely by the
//! aging sweep, expressed as a second method over the shared implementation
//! instead of a boolean flag.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use tokio::sync::MutexGuard;
use tracing::{debug, error, warn};

use crate::error::RelayError;
use crate::pool;
use crate::readiness::ReadinessSet;
use crate::service::{Inner, RelayService};
use crate::table::RelaySlot;
use crate::types::{CallId, Direction};

impl RelayService {
    /// Start forwarding one media-stream direction. Idempotent on a retransmitted
    /// INVITE: an identical `(call_id, stream_no, direction)` triple returns the
    /// already-bound port without consuming a second slot.
    pub async fn start_fwd(
        &self,
        call_id: &CallId,
        media_stream_no: u32,
        direction: Direction,
        outbound_ip: IpAddr,
        inside: SocketAddr,
    ) -> crate::Result<u16> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.table.find_duplicate(call_id, media_stream_no, direction) {
            let port = inner
                .table
                .get(existing)
                .expect("index from find_duplicate is valid")
                .outbound_port;
            debug!(%call_id, media_stream_no, ?direction, port, "start_fwd: idempotent retransmit");
            return Ok(port);
        }

        let index = inner.table.find_free().ok_or_else(|| {
            warn!(%call_id, "start_fwd: relay table full");
            RelayError::PoolFull
        })?;

        let port = pool::next_free_port(
            &inner.table,
            outbound_ip,
            self.config.rtp_port_low,
            self.config.rtp_port_high,
        )
        .inspect_err(|_| error!(%call_id, "start_fwd: port range exhausted"))?;

        let handle = match self.backend.start(outbound_ip, port, inside).await {
            Ok(handle) => handle,
            Err(err) => {
                // The slot was never inserted, so there is nothing to roll back
                // beyond propagating the error — failure here aborts only this
                // call's setup.
                return Err(err);
            }
        };

        inner.table.insert(
            index,
            RelaySlot {
                call_id: call_id.clone(),
                media_stream_no,
                direction,
                outbound_ip,
                outbound_port: port,
                peer: None,
                local_client: inside,
                handle,
                timestamp: Instant::now(),
            },
        );
        refresh_readiness_and_wake(self, &mut inner);

        debug!(%call_id, media_stream_no, ?direction, port, "start_fwd: slot created");
        Ok(port)
    }

    /// Tear down every slot for `call_id` (all media streams, both directions).
    /// `NotFound` if none matched.
    pub async fn stop_fwd(&self, call_id: &CallId) -> crate::Result<()> {
        let mut inner = self.inner.lock().await;
        self.stop_fwd_locked(&mut inner, call_id).await
    }

    /// As [`RelayService::stop_fwd`], but presumes the caller already holds
    /// `self.inner`. The only legal caller is the aging sweep in
    /// [`crate::relay_loop`], which already owns the lock for the duration of its
    /// pass.
    pub(crate) async fn stop_fwd_locked(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        call_id: &CallId,
    ) -> crate::Result<()> {
        let indices = inner.table.lookup_by_call_id(call_id);
        if indices.is_empty() {
            debug!(%call_id, "stop_fwd: no active stream (likely a retransmitted BYE)");
            return Err(RelayError::NotFound);
        }

        // Wakeup-before-close: signal the relay loop
        // before any socket is dropped, so it never blocks on a descriptor this
        // call is about to close.
        self.wakeup.signal();

        for index in indices {
            if let Some(slot) = inner.table.remove(index) {
                if let Err(err) = self
                    .backend
                    .stop(&slot.handle, slot.outbound_ip, slot.outbound_port)
                    .await
                {
                    warn!(%call_id, index, error = %err, "stop_fwd: backend stop failed, slot freed anyway");
                }
            }
        }

        refresh_readiness(inner);
        debug!(%call_id, "stop_fwd: all streams released");
        Ok(())
    }
}

fn refresh_readiness(inner: &mut Inner) {
    inner.readiness = ReadinessSet::rebuild(&inner.table);
}

fn refresh_readiness_and_wake(service: &RelayService, inner: &mut Inner) {
    refresh_readiness(inner);
    // Wakeup-after-insert: the relay loop must observe
    // the new socket before `start_fwd` returns.
    service.wakeup.signal();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::userspace::UserspaceBackend;
    use crate::config::RelayConfig;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn service() -> Arc<RelayService> {
        let mut config = RelayConfig::default();
        config.rtp_table_size = 4;
        config.outbound_bind_ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        RelayService::new(config, Arc::new(UserspaceBackend::new()))
    }

    fn inside() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn retransmit_is_idempotent() {
        let service = service();
        let call_id = CallId::new("abc", "h.example").unwrap();
        let p1 = service
            .start_fwd(&call_id, 0, Direction::Outbound, service.config().outbound_bind_ip, inside())
            .await
            .unwrap();
        let p2 = service
            .start_fwd(&call_id, 0, Direction::Outbound, service.config().outbound_bind_ip, inside())
            .await
            .unwrap();
        assert_eq!(p1, p2);
        assert_eq!(service.inner.lock().await.table.active_count(), 1);
    }

    #[tokio::test]
    async fn two_streams_get_distinct_ports_and_stop_releases_both() {
        let service = service();
        let call_id = CallId::new("abc", "h.example").unwrap();
        let p0 = service
            .start_fwd(&call_id, 0, Direction::Outbound, service.config().outbound_bind_ip, inside())
            .await
            .unwrap();
        let p1 = service
            .start_fwd(&call_id, 1, Direction::Outbound, service.config().outbound_bind_ip, inside())
            .await
            .unwrap();
        assert_ne!(p0, p1);
        assert_eq!(service.inner.lock().await.table.active_count(), 2);

        service.stop_fwd(&call_id).await.unwrap();
        assert_eq!(service.inner.lock().await.table.active_count(), 0);
    }

    #[tokio::test]
    async fn pool_exhaustion_returns_pool_full() {
        let mut config = RelayConfig::default();
        config.rtp_table_size = 1;
        config.outbound_bind_ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let service = RelayService::new(config, Arc::new(UserspaceBackend::new()));

        service
            .start_fwd(
                &CallId::new("a", "h").unwrap(),
                0,
                Direction::Outbound,
                service.config().outbound_bind_ip,
                inside(),
            )
            .await
            .unwrap();

        let err = service
            .start_fwd(
                &CallId::new("b", "h").unwrap(),
                0,
                Direction::Outbound,
                service.config().outbound_bind_ip,
                inside(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PoolFull));
    }

    #[tokio::test]
    async fn stop_fwd_on_unknown_call_id_is_not_found() {
        let service = service();
        let err = service
            .stop_fwd(&CallId::new("ghost", "h").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound));
    }
}
