//! Opaque process-like handles (spec §3 `channel_pid`/`transport_pid`).
//!
//! The teacher models connections and workers as plain `tokio` tasks
//! talking over `mpsc` mailboxes (`host_client.rs`'s `wire_worker`); this
//! crate follows the same idiom for both the per-channel worker and the
//! per-connection multiplexer, generalized from one task per connection to
//! one task per connection plus one task per joined channel.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use crate::{multiplexer::MultiplexerEvent, worker::WorkerCommand};

/// Monotonic identity for a spawned channel worker. Doubles as the
/// death-watch correlation token (`DESIGN.md` Open Question 2): a death or
/// graceful-exit notification is only acted on if its `ChannelId` still
/// matches the live entry for that topic, so a notification about a worker
/// the multiplexer already forgot (deliberate `phx_leave`, duplicate-join
/// replacement, forced close) is silently ignored rather than mis-applied
/// to whatever now occupies that topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ChannelId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a running channel worker: its identity plus the mailbox the
/// multiplexer and the pub/sub bus use to reach it.
#[derive(Clone)]
pub struct ChannelPid {
    pub id: ChannelId,
    pub(crate) tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl std::fmt::Debug for ChannelPid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPid").field("id", &self.id).finish()
    }
}

impl ChannelPid {
    pub(crate) fn send(&self, cmd: WorkerCommand) {
        // An unbounded send only fails once the worker's receiver has been
        // dropped, which only happens after the worker has already exited
        // (and therefore already reported its own death); a late command
        // landing here is a harmless no-op, not an error to propagate.
        let _ = self.tx.send(cmd);
    }
}

impl PartialEq for ChannelPid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ChannelPid {}

/// Handle to the connection-owner worker (the multiplexer), stored on
/// `Socket::transport_pid` (spec §3) and reached by channel workers to
/// report death/graceful-exit, and by the fan-out dispatcher's fastlane
/// path to push an already-encoded frame straight to a subscriber's
/// connection.
#[derive(Clone)]
pub struct TransportPid {
    pub(crate) events: mpsc::UnboundedSender<MultiplexerEvent>,
}

impl std::fmt::Debug for TransportPid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPid").finish_non_exhaustive()
    }
}

impl TransportPid {
    pub(crate) fn notify(&self, event: MultiplexerEvent) {
        let _ = self.events.send(event);
    }
}

impl PartialEq for TransportPid {
    fn eq(&self, other: &Self) -> bool {
        self.events.same_channel(&other.events)
    }
}
impl Eq for TransportPid {}

/// Opaque identifier for a connection, used as the pub/sub "id-topic" a
/// connection subscribes to for forced-disconnect broadcasts (spec §4.2
/// `init`).
pub fn id_topic(id: &str) -> Arc<str> {
    Arc::from(id)
}
