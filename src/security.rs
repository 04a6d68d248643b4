//! Bounds-check hook invoked before a SIP message is parsed.
//!
//! This collaborator is effectively a no-op beyond a size ceiling; it gives a
//! caller a single place to extend validation without touching the relay core.

use crate::error::RelayError;
use crate::types::SIP_BUF_MAX;

/// Reject buffers larger than [`SIP_BUF_MAX`]. Otherwise always succeeds.
pub fn security_check(buffer: &[u8]) -> crate::Result<()> {
    if buffer.len() > SIP_BUF_MAX {
        return Err(RelayError::bad_argument(format!(
            "sip buffer of {} bytes exceeds SIP_BUF_MAX ({SIP_BUF_MAX})",
            buffer.len()
        )));
    }
    Ok(())
}
