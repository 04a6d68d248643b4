//! The relay table: a fixed-capacity array of slots, each either free or
//! holding one active one-directional RTP forwarding endpoint. Every operation here
//! assumes the caller already holds the table mutex (see [`crate::service`]) —
//! this type has no locking of its own, matching the single-owner-mutex discipline
//! the control surface enforces.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::backend::BackendHandle;
use crate::types::{CallId, Direction};

/// One entry: one direction of one media stream of one call.
pub struct RelaySlot {
    pub call_id: CallId,
    pub media_stream_no: u32,
    pub direction: Direction,
    pub outbound_ip: IpAddr,
    pub outbound_port: u16,
    /// Last-known remote peer. `None` until the first datagram arrives in
    /// userspace mode (learning mode); always `None` for masquerade slots.
    pub peer: Option<SocketAddr>,
    pub local_client: SocketAddr,
    pub handle: BackendHandle,
    pub timestamp: Instant,
}

impl RelaySlot {
    fn matches(&self, call_id: &CallId, stream_no: u32, direction: Direction) -> bool {
        self.call_id == *call_id && self.media_stream_no == stream_no && self.direction == direction
    }
}

/// Fixed-capacity slot array. `rtp_table_size` slots, indices stable for the
/// lifetime of a slot.
pub struct RelayTable {
    slots: Vec<Option<RelaySlot>>,
}

impl RelayTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Option<&RelaySlot> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RelaySlot> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// At most one slot matches `(call_id, stream_no, direction)`. Used by
    /// `start_fwd` to idempotently return the existing port on a retransmitted
    /// INVITE.
    pub fn find_duplicate(&self, call_id: &CallId, stream_no: u32, direction: Direction) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|slot| slot.matches(call_id, stream_no, direction))
        })
    }

    /// Lowest-indexed free slot.
    pub fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_none())
    }

    /// Slots whose `timestamp + ttl < now` — candidates for the aging sweep.
    pub fn scan_expired(&self, now: Instant, ttl: Duration) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let slot = slot.as_ref()?;
                (now.saturating_duration_since(slot.timestamp) >= ttl).then_some(index)
            })
            .collect()
    }

    /// Every active slot for a Call-ID, across all media streams and both
    /// directions — the set `stop_fwd` tears down together.
    pub fn lookup_by_call_id(&self, call_id: &CallId) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref()
                    .is_some_and(|slot| slot.call_id == *call_id)
                    .then_some(index)
            })
            .collect()
    }

    /// The slot relaying the other direction of the same media stream, if any.
    /// Resolved by table lookup, not by pointer (there is no cyclic ownership).
    pub fn find_pair(&self, call_id: &CallId, stream_no: u32, direction: Direction) -> Option<usize> {
        self.find_duplicate(call_id, stream_no, direction.opposite())
    }

    /// `outbound_port` must be unique across active slots sharing
    /// `outbound_ip`. Checked by [`crate::pool::next_free_port`] before a port is
    /// handed to a backend.
    pub fn port_in_use(&self, outbound_ip: IpAddr, port: u16) -> bool {
        self.slots.iter().any(|slot| {
            slot.as_ref()
                .is_some_and(|slot| slot.outbound_ip == outbound_ip && slot.outbound_port == port)
        })
    }

    /// Occupy slot `index`. Panics if the index is out of bounds or already
    /// occupied — both are caller bugs, since `index` always comes from
    /// `find_free` under the same lock.
    pub fn insert(&mut self, index: usize, slot: RelaySlot) {
        let dest = self.slots.get_mut(index).expect("slot index in bounds");
        assert!(dest.is_none(), "insert into an occupied slot");
        debug!(
            call_id = %slot.call_id,
            media_stream_no = slot.media_stream_no,
            direction = ?slot.direction,
            index,
            port = slot.outbound_port,
            "table: slot occupied"
        );
        *dest = Some(slot);
    }

    /// Free slot `index`, returning the slot that was there (if any) so the
    /// caller can release its backend resources.
    pub fn remove(&mut self, index: usize) -> Option<RelaySlot> {
        let slot = self.slots.get_mut(index).and_then(|slot| slot.take());
        if let Some(slot) = &slot {
            debug!(
                call_id = %slot.call_id,
                media_stream_no = slot.media_stream_no,
                ?slot.direction,
                index,
                "table: slot freed"
            );
        }
        slot
    }

    /// Record an incoming datagram on `index` (learning mode: fixes the peer on
    /// first/changed sender, refreshes the timestamp) and resolve where to
    /// forward it.
    ///
    /// Two relay shapes share this table, matching the two scenarios the design
    /// spec describes:
    ///
    /// - If a paired direction slot exists (`(call_id, media_stream_no)`, opposite
    ///   direction — the two-socket, per-interface relay shape), forward via
    ///   *that* slot's own socket to *its* `local_client`.
    /// - Otherwise this slot relays bidirectionally by itself: a datagram from
    ///   `local_client` goes out to the learned `peer`; a datagram from anywhere
    ///   else (the peer, by definition) goes to `local_client`. This is the
    ///   single-slot case exercised by the round-trip property.
    ///
    /// Returns `None` if the slot vanished, or if the bidirectional fallback has
    /// no learned peer yet to relay a client-originated datagram to — in both
    /// cases the caller drops the datagram but the timestamp was still
    /// refreshed.
    pub fn record_datagram(
        &mut self,
        index: usize,
        from: SocketAddr,
        now: Instant,
    ) -> Option<(std::sync::Arc<tokio::net::UdpSocket>, SocketAddr)> {
        let (call_id, stream_no, direction, local_client) = {
            let slot = self.get_mut(index)?;
            slot.timestamp = now;
            if from != slot.local_client && slot.peer != Some(from) {
                slot.peer = Some(from);
            }
            (slot.call_id.clone(), slot.media_stream_no, slot.direction, slot.local_client)
        };

        if let Some(pair_index) = self.find_pair(&call_id, stream_no, direction) {
            let pair = self.get(pair_index)?;
            let socket = pair.handle.socket()?.clone();
            trace!(%call_id, media_stream_no = stream_no, index, pair_index, "table: resolved via paired slot");
            return Some((socket, pair.local_client));
        }

        let slot = self.get(index)?;
        let socket = slot.handle.socket()?.clone();
        let destination = if from == local_client { slot.peer? } else { local_client };
        trace!(%call_id, media_stream_no = stream_no, index, %destination, "table: resolved via bidirectional fallback");
        Some((socket, destination))
    }

    /// Every `(index, socket)` pair backing a userspace slot — the raw material
    /// for rebuilding the readiness set.
    pub fn userspace_sockets(&self) -> Vec<(usize, std::sync::Arc<tokio::net::UdpSocket>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let socket = slot.as_ref()?.handle.socket()?;
                Some((index, socket.clone()))
            })
            .collect()
    }

    /// Number of occupied slots. Exposed for tests and basic observability, not
    /// used by any relay-loop or control-surface logic.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendHandle;
    use std::net::Ipv4Addr;

    fn test_slot(call_id: &str, stream_no: u32, direction: Direction, port: u16) -> RelaySlot {
        RelaySlot {
            call_id: CallId::new(call_id, "h.example").unwrap(),
            media_stream_no: stream_no,
            direction,
            outbound_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            outbound_port: port,
            peer: None,
            local_client: "192.168.1.5:40000".parse().unwrap(),
            handle: BackendHandle::Masquerade(1),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn find_free_returns_lowest_index() {
        let mut table = RelayTable::new(4);
        table.insert(1, test_slot("a", 0, Direction::Outbound, 100));
        assert_eq!(table.find_free(), Some(0));
    }

    #[test]
    fn find_duplicate_matches_full_triple() {
        let mut table = RelayTable::new(4);
        table.insert(0, test_slot("a", 0, Direction::Outbound, 100));
        assert_eq!(
            table.find_duplicate(&CallId::new("a", "h.example").unwrap(), 0, Direction::Outbound),
            Some(0)
        );
        assert_eq!(
            table.find_duplicate(&CallId::new("a", "h.example").unwrap(), 1, Direction::Outbound),
            None
        );
    }

    #[test]
    fn lookup_by_call_id_finds_all_streams() {
        let mut table = RelayTable::new(4);
        table.insert(0, test_slot("a", 0, Direction::Outbound, 100));
        table.insert(1, test_slot("a", 0, Direction::Inbound, 101));
        table.insert(2, test_slot("a", 1, Direction::Outbound, 102));
        table.insert(3, test_slot("b", 0, Direction::Outbound, 103));
        let mut found = table.lookup_by_call_id(&CallId::new("a", "h.example").unwrap());
        found.sort();
        assert_eq!(found, vec![0, 1, 2]);
    }

    #[test]
    fn scan_expired_honors_ttl() {
        let mut table = RelayTable::new(2);
        table.insert(0, test_slot("a", 0, Direction::Outbound, 100));
        let ttl = Duration::from_secs(5);
        assert!(table.scan_expired(Instant::now(), ttl).is_empty());
        let future = Instant::now() + Duration::from_secs(10);
        assert_eq!(table.scan_expired(future, ttl), vec![0]);
    }

    #[tokio::test]
    async fn record_datagram_learns_peer_and_resolves_pair() {
        let mut table = RelayTable::new(2);
        let out_socket = std::sync::Arc::new(tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let in_socket = std::sync::Arc::new(tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap());

        table.insert(
            0,
            RelaySlot {
                handle: BackendHandle::Userspace(out_socket),
                ..test_slot("a", 0, Direction::Outbound, 100)
            },
        );
        table.insert(
            1,
            RelaySlot {
                handle: BackendHandle::Userspace(in_socket),
                local_client: "192.168.1.5:40000".parse().unwrap(),
                ..test_slot("a", 0, Direction::Inbound, 101)
            },
        );

        let from: SocketAddr = "203.0.113.5:5000".parse().unwrap();
        let (socket, destination) = table
            .record_datagram(0, from, Instant::now())
            .expect("pair should resolve");
        assert_eq!(destination, "192.168.1.5:40000".parse::<SocketAddr>().unwrap());
        assert_eq!(socket.local_addr().unwrap().ip(), "127.0.0.1".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(table.get(0).unwrap().peer, Some(from));
    }

    #[test]
    fn remove_frees_the_slot() {
        let mut table = RelayTable::new(2);
        table.insert(0, test_slot("a", 0, Direction::Outbound, 100));
        assert!(table.remove(0).is_some());
        assert_eq!(table.active_count(), 0);
        assert_eq!(table.find_free(), Some(0));
    }
}
