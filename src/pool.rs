//! Port pool: a derived view over the relay table, not a stored structure.
//! Recomputed from the table on every call; O(N·R) but acceptable at the table
//! sizes and port-range widths this crate targets.

use std::net::IpAddr;

use crate::error::RelayError;
use crate::table::RelayTable;

/// The smallest unused even port in `[low, high]` for `outbound_ip`, per the RTP
/// convention of allocating on even ports (RTCP follows on `port + 1`).
pub fn next_free_port(table: &RelayTable, outbound_ip: IpAddr, low: u16, high: u16) -> crate::Result<u16> {
    let mut port = if low % 2 == 0 { low } else { low.saturating_add(1) };
    while port <= high {
        if !table.port_in_use(outbound_ip, port) {
            return Ok(port);
        }
        match port.checked_add(2) {
            Some(next) => port = next,
            None => break,
        }
    }
    Err(RelayError::NoFreePort)
}
