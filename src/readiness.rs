//! Readiness set: a rebuildable snapshot of the sockets the relay loop
//! should watch. Rebuilt from the table whenever a slot is added or removed; the
//! relay loop keeps a local copy it refreshes each iteration from the master copy
//! under the table mutex, so it never holds the mutex while blocked in its wait.

use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::table::RelayTable;

/// `(slot_index, socket)` pairs for every active userspace slot.
#[derive(Clone, Default)]
pub struct ReadinessSet {
    sockets: Vec<(usize, Arc<UdpSocket>)>,
}

impl ReadinessSet {
    pub fn empty() -> Self {
        Self { sockets: Vec::new() }
    }

    /// O(N) rebuild from the table. Only userspace-mode sockets are included —
    /// masquerade slots never appear here since traffic bypasses the process.
    pub fn rebuild(table: &RelayTable) -> Self {
        Self {
            sockets: table.userspace_sockets(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, Arc<UdpSocket>)> {
        self.sockets.iter()
    }
}
