//! The relay loop: the single dedicated task that waits on the readiness
//! set with a bounded timeout, forwards ready datagrams, ages the table on a
//! coarse timer, and refreshes its local readiness snapshot every iteration.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::select_all;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::readiness::ReadinessSet;
use crate::service::RelayService;

/// Bounds aging latency even under zero traffic.
const T_WAIT: Duration = Duration::from_secs(5);
/// Bounds mutex contention from aging.
const T_SWEEP: Duration = Duration::from_secs(10);

pub(crate) async fn run(service: Arc<RelayService>) {
    service.wakeup.register_relay_task();
    info!("relay loop starting");

    let mut local_readiness = {
        let inner = service.inner.lock().await;
        inner.readiness.clone()
    };
    let mut last_sweep = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = service.shutdown.notified() => {
                info!("relay loop shutting down");
                break;
            }
            _ = service.wakeup.wait() => {
                debug!("relay loop: woken by control surface");
            }
            index = next_ready(&local_readiness), if !local_readiness.is_empty() => {
                handle_ready(&service, index).await;
            }
            _ = tokio::time::sleep(T_WAIT) => {}
        }

        let now = Instant::now();
        if now.saturating_duration_since(last_sweep) >= T_SWEEP {
            run_aging_sweep(&service, now).await;
            last_sweep = now;
        }

        // Refresh the local snapshot from the master copy. This is the only
        // place the relay task touches the mutex, and it never does so while
        // suspended in the wait above.
        let inner = service.inner.lock().await;
        local_readiness = inner.readiness.clone();
    }
}

/// Race `socket.readable()` across every watched socket, resolving to the
/// winning slot's index. A spurious wakeup just costs one extra loop: the
/// backend's non-blocking read returns "no datagram" and nothing happens.
async fn next_ready(readiness: &ReadinessSet) -> usize {
    let waits: Vec<Pin<Box<dyn Future<Output = usize> + Send + '_>>> = readiness
        .iter()
        .map(|(index, socket)| {
            let index = *index;
            Box::pin(async move {
                let _ = socket.readable().await;
                index
            }) as Pin<Box<dyn Future<Output = usize> + Send>>
        })
        .collect();
    let (index, _, _) = select_all(waits).await;
    index
}

async fn handle_ready(service: &RelayService, index: usize) {
    let handle = {
        let inner = service.inner.lock().await;
        match inner.table.get(index) {
            Some(slot) => slot.handle.clone(),
            None => return, // slot was torn down between the snapshot and now
        }
    };

    let now = Instant::now();
    let datagram = match service.backend.on_ready(&handle, now).await {
        Ok(Some(datagram)) => datagram,
        Ok(None) => return,
        Err(err) => {
            debug!(index, error = %err, "relay loop: read failed, datagram dropped");
            return;
        }
    };

    let forward = {
        let mut inner = service.inner.lock().await;
        inner.table.record_datagram(index, datagram.from, now)
    };

    let Some((socket, destination)) = forward else {
        // No paired direction (yet, or ever) — datagram dropped, but the
        // timestamp was still refreshed by `record_datagram`.
        return;
    };

    if let Err(err) = socket.send_to(&datagram.payload, destination).await {
        debug!(index, %destination, error = %err, "relay loop: forward send failed, datagram dropped");
    }
}

/// For every slot whose `timestamp + rtp_timeout < now`, release its whole call
/// (all media streams, both directions) via the lock-already-held `stop_fwd`
/// variant.
async fn run_aging_sweep(service: &RelayService, now: Instant) {
    let ttl = Duration::from_secs(service.config().rtp_timeout);
    let mut inner = service.inner.lock().await;
    let expired = inner.table.scan_expired(now, ttl);

    let mut swept = HashSet::new();
    for index in expired {
        let call_id = match inner.table.get(index) {
            Some(slot) => slot.call_id.clone(),
            None => continue, // already released by an earlier iteration below
        };
        if !swept.insert(call_id.clone()) {
            continue;
        }
        match service.stop_fwd_locked(&mut inner, &call_id).await {
            Ok(()) => debug!(%call_id, "aging: call expired and released"),
            Err(RelayError::NotFound) => {
                // A sibling direction's pass already released this call.
            }
            Err(err) => warn!(%call_id, error = %err, "aging: failed to release expired call"),
        }
    }
}
