//! The socket multiplexer (spec §4.2): the per-connection state machine
//! that owns the channels-by-topic map and its inverse, dispatches inbound
//! frames, observes channel deaths, and emits outbound frames.
//!
//! Grounded on the teacher's `server::mod::Server` dispatch loop
//! (`server/mod.rs`) — a struct that owns the receive machinery and a
//! dispatch table, driving one connection's lifecycle — generalized from
//! single-endpoint request/response dispatch to topic-pattern channel
//! routing with multiple live child workers.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde_json::json;
use tokio::sync::{mpsc, watch};

use crate::{
    channel::Reason,
    handler::SocketHandler,
    handles::{ChannelId, ChannelPid, TransportPid},
    message::{Broadcast, Message, Outbound, Reply, EVENT_HEARTBEAT, EVENT_PHX_JOIN, TOPIC_PHOENIX},
    pubsub::{FastlaneHint, PubSub, Subscriber},
    registry::ChannelRegistry,
    serializer::Serializer,
    socket::{Socket, TransportKind},
    transport::Transport,
    worker::{self, SpawnParams, WorkerCommand},
};

/// Forced-close timeout and other construction knobs (spec §2.3 / §5),
/// mirroring the teacher's `server::impls::test_channels::Settings`
/// constructor-bundle shape.
#[derive(Debug, Clone)]
pub struct Config {
    pub forced_close_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config { forced_close_timeout: Duration::from_secs(5) }
    }
}

/// Asynchronous events the multiplexer's `info` handles (spec §4.2 "Async
/// events handled in `info`").
pub enum MultiplexerEvent {
    /// A channel worker died other than by a normal shutdown.
    ChannelDied { id: ChannelId, reason: Reason },
    /// A channel worker exited normally and may carry a final frame to
    /// deliver to the client (e.g. the `phx_leave` reply).
    ChannelGracefulExit { id: ChannelId, final_message: Option<Outbound> },
    /// A broadcast arrived on this connection's id-topic subscription.
    ConnectionBroadcast(Broadcast),
    /// An already-encoded frame to emit verbatim (fastlane delivery, or a
    /// channel worker's own mid-session reply).
    SocketPush(crate::serializer::EncodedFrame),
    /// Best-effort memory-compaction hint; no output.
    GarbageCollect,
}

struct ChannelEntry {
    id: ChannelId,
    pid: ChannelPid,
    abort: tokio::task::AbortHandle,
}

/// Per-connection coordinator. Generic over the user's [`SocketHandler`]
/// (`H`), the pluggable [`Serializer`] (`S`), [`PubSub`] bus (`P`), and
/// [`Transport`] (`T`) — the crate's four external-collaborator seams
/// (spec §1).
pub struct Multiplexer<H: SocketHandler, S: Serializer, P: PubSub<S>, T: Transport> {
    handler: Arc<H>,
    serializer: Arc<S>,
    pubsub: Arc<P>,
    transport: T,
    config: Config,
    socket: Socket,
    channels: HashMap<String, ChannelEntry>,
    channels_inverse: HashMap<ChannelId, (String, String)>,
    events_tx: mpsc::UnboundedSender<MultiplexerEvent>,
    events_rx: mpsc::UnboundedReceiver<MultiplexerEvent>,
    transport_alive_tx: watch::Sender<bool>,
}

impl<H, S, P, T> Multiplexer<H, S, P, T>
where
    H: SocketHandler,
    S: Serializer,
    P: PubSub<S>,
    T: Transport,
{
    /// `connect(params, metadata) -> (state, socket) | fail` (spec §4.2).
    pub async fn connect(
        handler: Arc<H>,
        serializer: Arc<S>,
        pubsub: Arc<P>,
        transport: T,
        config: Config,
        pubsub_server: impl Into<Arc<str>>,
        transport_kind: impl Into<Arc<str>>,
        params: serde_json::Value,
    ) -> Result<Self, crate::error::MultiplexerError> {
        let socket = Socket::new(pubsub_server, TransportKind::new(transport_kind.into()));
        let socket = handler
            .connect(params, socket)
            .await
            .ok_or(crate::error::MultiplexerError::ConnectRefused)?;
        let id = handler.id(&socket);
        let mut socket = socket;
        socket.id = id;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transport_alive_tx, _) = watch::channel(true);

        Ok(Multiplexer {
            handler,
            serializer,
            pubsub,
            transport,
            config,
            socket,
            channels: HashMap::new(),
            channels_inverse: HashMap::new(),
            events_tx,
            events_rx,
            transport_alive_tx,
        })
    }

    /// `init(state, socket) -> (state, socket)` (spec §4.2): subscribes to
    /// the id-topic and records the transport handle on the socket.
    pub fn init(&mut self) {
        self.socket.transport_pid = Some(self.transport_pid());
        if let Some(id) = self.socket.id.clone() {
            self.pubsub.subscribe_connection(&id, self.transport_pid());
        }
    }

    fn transport_pid(&self) -> TransportPid {
        TransportPid { events: self.events_tx.clone() }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        self.handler.registry()
    }

    /// `in(payload, opts) -> {reply frames to emit}` (spec §4.2): decodes
    /// `payload`, then dispatches by topic and event.
    pub async fn in_(&mut self, payload: &[u8]) {
        let msg = match self.serializer.decode(payload) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode inbound payload");
                return;
            }
        };

        if msg.topic == TOPIC_PHOENIX && msg.event == EVENT_HEARTBEAT {
            let reply = Reply::ok(None, msg.ref_.clone(), TOPIC_PHOENIX, json!({}));
            self.send(Outbound::Reply(reply)).await;
            return;
        }

        let has_worker = self.channels.contains_key(&msg.topic);

        if msg.event == EVENT_PHX_JOIN {
            if has_worker {
                tracing::debug!(topic = %msg.topic, "duplicate join, closing existing worker");
                self.force_close_one(&msg.topic).await;
            }
            self.handle_join(msg).await;
            return;
        }

        if !has_worker {
            tracing::warn!(topic = %msg.topic, event = %msg.event, "unmatched topic");
            let reply = Reply::unmatched_topic(msg.ref_.clone(), msg.topic.clone());
            self.send(Outbound::Reply(reply)).await;
            return;
        }

        if let Some(entry) = self.channels.get(&msg.topic) {
            entry.pid.send(WorkerCommand::Inbound(msg));
        }
    }

    async fn handle_join(&mut self, msg: Message) {
        let Some(matched) = self.registry().lookup(&msg.topic) else {
            let reply = Reply::unmatched_topic(msg.ref_.clone(), msg.topic.clone());
            self.send(Outbound::Reply(reply)).await;
            return;
        };

        let handler = matched.factory.build();
        let initial_private = matched.factory.initial_private();
        let extra_assigns = matched.options.assigns.clone();
        let intercepts = matched.factory.intercepts();
        let module_name = matched.factory.module_name();
        let join_ref = msg.ref_.clone().unwrap_or_default();

        let mut socket = self.socket.clone();
        socket.apply_join_options(
            msg.topic.clone(),
            join_ref.clone(),
            // placeholder pid replaced by worker::spawn before join runs
            ChannelPid { id: ChannelId::next(), tx: mpsc::unbounded_channel().0 },
            extra_assigns,
            initial_private,
        );

        let params = SpawnParams {
            handler,
            socket,
            topic: msg.topic.clone(),
            join_ref: join_ref.clone(),
            join_payload: msg.payload.clone(),
            serializer: self.serializer.clone(),
            transport_alive: self.transport_alive_tx.subscribe(),
            module_name,
        };
        let (id, outcome_rx, join_handle) = worker::spawn(params);
        let events_tx = self.events_tx.clone();
        let abort = join_handle.abort_handle();
        tokio::spawn(async move {
            match join_handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    let msg = if e.is_panic() { "channel worker panicked".to_string() } else { e.to_string() };
                    let _ = events_tx.send(MultiplexerEvent::ChannelDied { id, reason: Reason::Crash(msg) });
                }
            }
        });

        match outcome_rx.await {
            Ok(outcome) => {
                self.send(Outbound::Reply(outcome.reply)).await;
                if let Some(pid) = outcome.pid {
                    self.channels.insert(msg.topic.clone(), ChannelEntry { id, pid: pid.clone(), abort });
                    self.channels_inverse.insert(id, (msg.topic.clone(), join_ref));
                    self.pubsub.subscribe(
                        &msg.topic,
                        Subscriber {
                            recipient: pid,
                            fastlane: Some(FastlaneHint {
                                fastlane_pid: self.transport_pid(),
                                serializer: self.serializer.clone(),
                                intercepted_events: intercepts,
                            }),
                        },
                    );
                }
            }
            Err(_recv_error) => {
                let err = crate::error::ChannelError::JoinPanicked(format!(
                    "channel join task for topic {:?} exited before reporting an outcome",
                    msg.topic
                ));
                tracing::error!(topic = %msg.topic, error = %err, "channel join crashed");
                let reply = Reply::join_crashed(msg.ref_.clone(), msg.topic.clone());
                self.send(Outbound::Reply(reply)).await;
            }
        }
    }

    async fn force_close_one(&mut self, topic: &str) {
        let Some(entry) = self.channels.remove(topic) else { return };
        self.channels_inverse.remove(&entry.id);
        self.pubsub.unsubscribe(topic, &entry.pid);
        entry.pid.send(WorkerCommand::Close);
        let timeout = self.config.forced_close_timeout;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    entry.abort.abort();
                    return;
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(MultiplexerEvent::ChannelGracefulExit { id, .. }) if id == entry.id => return,
                        Some(MultiplexerEvent::ChannelDied { id, .. }) if id == entry.id => return,
                        Some(other) => self.apply_async_event(other).await,
                        None => return,
                    }
                }
            }
        }
    }

    /// `info(event) -> {reply frames} | stop` (spec §4.2): pulls and
    /// processes exactly one pending async event. Returns `false` when the
    /// connection should stop.
    pub async fn info(&mut self) -> bool {
        let Some(event) = self.events_rx.recv().await else { return false };
        self.apply_async_event(event).await
    }

    async fn apply_async_event(&mut self, event: MultiplexerEvent) -> bool {
        match event {
            MultiplexerEvent::ChannelDied { id, .. } => {
                if let Some((topic, join_ref)) = self.channels_inverse.remove(&id) {
                    self.channels.remove(&topic);
                    let frame = Message::phx_error(Some(join_ref), topic);
                    self.send(Outbound::Message(frame)).await;
                }
                true
            }
            MultiplexerEvent::ChannelGracefulExit { id, final_message } => {
                if let Some((topic, _join_ref)) = self.channels_inverse.remove(&id) {
                    self.channels.remove(&topic);
                }
                if let Some(msg) = final_message {
                    self.send(msg).await;
                }
                true
            }
            MultiplexerEvent::ConnectionBroadcast(b) => {
                if b.event == "disconnect" {
                    return false;
                }
                true
            }
            MultiplexerEvent::SocketPush(frame) => {
                if let Err(err) = self.transport.send(frame).await {
                    tracing::warn!(error = %err, "failed to push frame to transport");
                }
                true
            }
            MultiplexerEvent::GarbageCollect => true,
        }
    }

    async fn send(&self, msg: Outbound) {
        match self.serializer.encode(&msg) {
            Ok(frame) => {
                if let Err(err) = self.transport.send(frame).await {
                    tracing::warn!(error = %err, "failed to send frame to transport");
                }
            }
            Err(err) => tracing::error!(error = %err, "failed to encode outbound frame"),
        }
    }

    /// `terminate(reason)` (spec §4.2): forces synchronous close of all
    /// channel workers.
    pub async fn terminate(&mut self) {
        let topics: Vec<String> = self.channels.keys().cloned().collect();
        for topic in topics {
            self.force_close_one(&topic).await;
        }
        // Only poison the transport-alive watch once every channel has gone
        // through its own deliberate Close handshake above; flipping it
        // first would race `handler.terminate()` out of every worker's
        // select loop (transport death takes priority over Close there).
        let _ = self.transport_alive_tx.send(false);
        if let Some(id) = self.socket.id.clone() {
            self.pubsub.unsubscribe_connection(&id, &self.transport_pid());
        }
    }

    /// Convenience driver loop: pumps inbound payloads from `incoming`
    /// alongside this connection's own async events until the transport
    /// closes or a forced disconnect arrives, then tears every channel
    /// down. Mirrors the teacher's `Server::run` combined dispatch loop
    /// (`server/mod.rs`), generalized to select over two sources instead of
    /// one.
    pub async fn run(&mut self, mut incoming: mpsc::UnboundedReceiver<Vec<u8>>) {
        self.init();
        loop {
            tokio::select! {
                payload = incoming.recv() => {
                    match payload {
                        Some(bytes) => self.in_(&bytes).await,
                        None => break,
                    }
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            if !self.apply_async_event(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        self.terminate().await;
    }

    #[cfg(test)]
    pub(crate) fn channel_count(&self) -> usize {
        debug_assert_eq!(self.channels.len(), self.channels_inverse.len());
        self.channels.len()
    }
}
