//! Wakeup channel: lets the control surface interrupt the relay loop's
//! readiness wait without losing pending work. The source signals the relay
//! thread with `SIGALRM`; this rewrite uses `tokio::sync::Notify`, the idiomatic
//! async equivalent — it is race-free by construction (a `notify_one` sent before
//! anyone is waiting is stored and delivered to the next `notified().await`) and
//! needs no signal-safety reasoning.

use once_cell::sync::OnceCell;
use tokio::sync::Notify;

/// Single-waiter wakeup signal. Exactly one relay task ever calls
/// [`Wakeup::wait`]; any number of control-surface callers call
/// [`Wakeup::signal`].
pub struct Wakeup {
    notify: Notify,
    relay_task: OnceCell<tokio::task::Id>,
}

impl Wakeup {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            relay_task: OnceCell::new(),
        }
    }

    /// Record the identity of the relay task. Called once, at the top of the
    /// relay loop, before its first wait.
    pub fn register_relay_task(&self) {
        if let Some(id) = tokio::task::try_id() {
            // Best-effort: if already set (shouldn't happen — one relay loop per
            // service), keep the first registration.
            let _ = self.relay_task.set(id);
        }
    }

    /// Wake the relay loop. A no-op if called from the relay task itself (e.g.
    /// from within the aging sweep, which runs on that task) — self-signaling
    /// would just be a redundant notify, so it is detected and skipped by
    /// comparing task identities.
    pub fn signal(&self) {
        if let (Some(registered), Some(current)) = (self.relay_task.get(), tokio::task::try_id()) {
            if *registered == current {
                return;
            }
        }
        self.notify.notify_one();
    }

    /// Wait for the next signal. Cancel-safe: usable as one branch of a
    /// `tokio::select!`.
    pub async fn wait(&self) {
        self.notify.notified().await
    }
}

impl Default for Wakeup {
    fn default() -> Self {
        Self::new()
    }
}
