//! The pub/sub bus boundary (spec §2.2). External collaborator: assumed to
//! provide topic-based subscribe/publish with a per-subscriber "fastlane
//! hint" (spec §4.4). [`LocalPubSub`] is an in-memory reference
//! implementation for tests and single-process deployments, enriched from
//! the pack's `dashmap`-backed concurrent registry idiom (the teacher has
//! no cross-connection broadcast concept of its own to draw on here) and
//! wired directly to [`fanout::dispatch`] since a real pub/sub bus is what
//! drives the fan-out dispatcher per spec §2's data-flow diagram.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    fanout::{self, Delivery},
    handles::{ChannelPid, TransportPid},
    message::Broadcast,
    multiplexer::MultiplexerEvent,
    serializer::Serializer,
};

/// What a subscribing channel hands the bus so the fan-out dispatcher can
/// bypass its mailbox for non-intercepted events (spec §4.4): the
/// subscribing connection's own transport handle, its serializer, and the
/// set of events that channel module opted to intercept.
pub struct FastlaneHint<S> {
    pub fastlane_pid: TransportPid,
    pub serializer: Arc<S>,
    pub intercepted_events: &'static [&'static str],
}

impl<S> Clone for FastlaneHint<S> {
    fn clone(&self) -> Self {
        FastlaneHint {
            fastlane_pid: self.fastlane_pid.clone(),
            serializer: self.serializer.clone(),
            intercepted_events: self.intercepted_events,
        }
    }
}

/// One registered channel subscriber: its own handle (used for the
/// skip-if-publisher check and as the non-fastlane delivery target), plus
/// an optional fastlane hint.
pub struct Subscriber<S> {
    pub recipient: ChannelPid,
    pub fastlane: Option<FastlaneHint<S>>,
}

impl<S> Clone for Subscriber<S> {
    fn clone(&self) -> Self {
        Subscriber { recipient: self.recipient.clone(), fastlane: self.fastlane.clone() }
    }
}

/// Topic-based subscribe/publish bus. `S` is the serializer type carried in
/// the fastlane hint.
pub trait PubSub<S>: Send + Sync {
    fn subscribe(&self, topic: &str, subscriber: Subscriber<S>);
    fn unsubscribe(&self, topic: &str, recipient: &ChannelPid);
    fn subscribers(&self, topic: &str) -> Vec<Subscriber<S>>;

    /// A connection subscribes to its own id-topic for forced-disconnect
    /// broadcasts (spec §4.2 `init`), not as a channel.
    fn subscribe_connection(&self, topic: &str, pid: TransportPid);
    fn unsubscribe_connection(&self, topic: &str, pid: &TransportPid);

    /// Publishes a broadcast, delivering it to every channel subscriber of
    /// `broadcast.topic` (via the fan-out dispatcher, skipping `from`) and
    /// to every connection subscribed to that topic as an id-topic.
    fn publish(&self, broadcast: Broadcast, from: Option<ChannelPid>);
}

/// In-memory reference `PubSub`, keyed by topic in `DashMap`s the way
/// nautilus-style concurrent registries in the wider example pack shard
/// reads/writes without a connection-wide lock.
pub struct LocalPubSub<S> {
    channel_subs: DashMap<String, Vec<Subscriber<S>>>,
    connection_subs: DashMap<String, Vec<TransportPid>>,
}

impl<S> Default for LocalPubSub<S> {
    fn default() -> Self {
        LocalPubSub { channel_subs: DashMap::new(), connection_subs: DashMap::new() }
    }
}

impl<S> LocalPubSub<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> PubSub<S> for LocalPubSub<S>
where
    S: Serializer,
{
    fn subscribe(&self, topic: &str, subscriber: Subscriber<S>) {
        self.channel_subs.entry(topic.to_string()).or_default().push(subscriber);
    }

    fn unsubscribe(&self, topic: &str, recipient: &ChannelPid) {
        if let Some(mut list) = self.channel_subs.get_mut(topic) {
            list.retain(|s| &s.recipient != recipient);
        }
    }

    fn subscribers(&self, topic: &str) -> Vec<Subscriber<S>> {
        self.channel_subs.get(topic).map(|l| l.clone()).unwrap_or_default()
    }

    fn subscribe_connection(&self, topic: &str, pid: TransportPid) {
        self.connection_subs.entry(topic.to_string()).or_default().push(pid);
    }

    fn unsubscribe_connection(&self, topic: &str, pid: &TransportPid) {
        if let Some(mut list) = self.connection_subs.get_mut(topic) {
            list.retain(|p| p != pid);
        }
    }

    fn publish(&self, broadcast: Broadcast, from: Option<ChannelPid>) {
        let subs = self.channel_subs.get(&broadcast.topic).map(|l| l.clone()).unwrap_or_default();
        for delivery in fanout::dispatch(subs, from.as_ref(), &broadcast) {
            match delivery {
                Delivery::ToChannelWorker(pid, cmd) => pid.send(cmd),
                Delivery::Fastlane(tp, frame) => tp.notify(MultiplexerEvent::SocketPush(frame)),
            }
        }

        if let Some(conns) = self.connection_subs.get(&broadcast.topic) {
            for tp in conns.iter() {
                tp.notify(MultiplexerEvent::ConnectionBroadcast(broadcast.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use tokio::sync::mpsc;

    fn fake_pid() -> ChannelPid {
        let (tx, _rx) = mpsc::unbounded_channel();
        ChannelPid { id: crate::handles::ChannelId::next(), tx }
    }

    #[test]
    fn subscribe_then_subscribers_returns_registered_entry() {
        let bus: LocalPubSub<JsonSerializer> = LocalPubSub::new();
        let pid = fake_pid();
        bus.subscribe("room:42", Subscriber { recipient: pid.clone(), fastlane: None });
        let subs = bus.subscribers("room:42");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].recipient, pid);
    }

    #[test]
    fn unsubscribe_removes_only_the_matching_recipient() {
        let bus: LocalPubSub<JsonSerializer> = LocalPubSub::new();
        let (p1, p2) = (fake_pid(), fake_pid());
        bus.subscribe("room:42", Subscriber { recipient: p1.clone(), fastlane: None });
        bus.subscribe("room:42", Subscriber { recipient: p2.clone(), fastlane: None });
        bus.unsubscribe("room:42", &p1);
        let subs = bus.subscribers("room:42");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].recipient, p2);
    }

    #[test]
    fn unknown_topic_has_no_subscribers() {
        let bus: LocalPubSub<JsonSerializer> = LocalPubSub::new();
        assert!(bus.subscribers("nope:1").is_empty());
    }
}
