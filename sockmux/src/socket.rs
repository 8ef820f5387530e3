//! The `Socket` value (spec §3). Copy-on-modify: handler callbacks receive
//! an owned `Socket`, mutate it, and hand it back — there is never a
//! `Socket` shared across tasks.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::handles::{ChannelPid, TransportPid};

/// Arbitrary scratch-space value. User code and the crate's own bookkeeping
/// both stash JSON-ish values here rather than a `dyn Any`, matching the
/// serializer-facing JSON flavor the rest of the wire model uses.
pub type Scratch = HashMap<String, Value>;

/// Opaque tag identifying the transport kind, carried only for logging
/// (spec §3 `transport`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportKind(pub Arc<str>);

impl TransportKind {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        TransportKind(name.into())
    }
}

/// The per-connection / per-channel state value threaded through every
/// handler callback (spec §3). `handler`/`endpoint` (the user's socket
/// module and owning endpoint) and `serializer` live above this crate's
/// boundary in the embedding application; this crate only needs the fields
/// it reads or mutates directly.
#[derive(Clone)]
pub struct Socket {
    pub id: Option<String>,
    pub assigns: Scratch,
    pub private: Scratch,
    pub pubsub_server: Arc<str>,
    pub transport: TransportKind,
    pub transport_pid: Option<TransportPid>,
    pub channel_pid: Option<ChannelPid>,
    pub topic: Option<String>,
    pub joined: bool,
    pub join_ref: Option<String>,
    #[doc(alias = "ref")]
    pub ref_: Option<String>,
}

impl Socket {
    pub fn new(pubsub_server: impl Into<Arc<str>>, transport: TransportKind) -> Self {
        Socket {
            id: None,
            assigns: Scratch::new(),
            private: Scratch::new(),
            pubsub_server: pubsub_server.into(),
            transport,
            transport_pid: None,
            channel_pid: None,
            topic: None,
            joined: false,
            join_ref: None,
            ref_: None,
        }
    }

    /// Applies join options (spec §4.3 step 1): merges `assigns`, sets
    /// `topic`/`join_ref`/`channel_pid`, replaces `private` with the
    /// channel module's compile-time metadata.
    pub fn apply_join_options(
        &mut self,
        topic: impl Into<String>,
        join_ref: impl Into<String>,
        channel_pid: ChannelPid,
        extra_assigns: Scratch,
        initial_private: Scratch,
    ) {
        self.assigns.extend(extra_assigns);
        self.topic = Some(topic.into());
        self.join_ref = Some(join_ref.into());
        self.channel_pid = Some(channel_pid);
        self.private = initial_private;
    }

    /// Clears `ref` after a reply is emitted (spec §4.3, invariant in §8).
    pub fn clear_ref(&mut self) {
        self.ref_ = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fake_channel_pid() -> ChannelPid {
        let (tx, _rx) = mpsc::unbounded_channel();
        ChannelPid { id: crate::handles::ChannelId::next(), tx }
    }

    #[test]
    fn apply_join_options_merges_assigns_without_clobbering_existing() {
        let mut s = Socket::new("pubsub", TransportKind::new("ws"));
        s.assigns.insert("pre_existing".into(), Value::Bool(true));
        let mut extra = Scratch::new();
        extra.insert("role".into(), Value::String("admin".into()));
        s.apply_join_options("room:42", "7", fake_channel_pid(), extra, Scratch::new());
        assert_eq!(s.assigns.get("pre_existing"), Some(&Value::Bool(true)));
        assert_eq!(s.assigns.get("role"), Some(&Value::String("admin".into())));
        assert_eq!(s.topic.as_deref(), Some("room:42"));
        assert_eq!(s.join_ref.as_deref(), Some("7"));
    }

    #[test]
    fn clear_ref_sets_ref_to_none() {
        let mut s = Socket::new("pubsub", TransportKind::new("ws"));
        s.ref_ = Some("8".into());
        s.clear_ref();
        assert_eq!(s.ref_, None);
    }
}
