//! In-memory test doubles for the transport and socket-handler seams.
//!
//! Grounded on the teacher's `test_utils.rs` (`LocalTx`/`LocalRx`/
//! `local_setup`): a channel-backed fake wired up without any real I/O,
//! generalized here from the teacher's request/response wire pair to this
//! crate's single outbound `Transport::send` seam, plus a minimal
//! `SocketHandler` that always accepts and exposes one fixed registry.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    error::{AsTransportErrorKind, TransportErrorKind},
    handler::SocketHandler,
    registry::ChannelRegistry,
    serializer::EncodedFrame,
    socket::Socket,
    transport::Transport,
};

/// Transport backed by an unbounded channel; every sent frame lands on the
/// paired [`mpsc::UnboundedReceiver`] for the test to assert against.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<EncodedFrame>,
}

#[derive(Debug, thiserror::Error)]
#[error("channel transport receiver dropped")]
pub struct ChannelTransportError;

impl AsTransportErrorKind for ChannelTransportError {
    fn as_kind(&self) -> TransportErrorKind {
        TransportErrorKind::ConnectionClosed
    }
}

impl Transport for ChannelTransport {
    type Error = ChannelTransportError;

    async fn send(&self, frame: EncodedFrame) -> Result<(), Self::Error> {
        self.tx.send(frame).map_err(|_| ChannelTransportError)
    }
}

/// Builds a [`ChannelTransport`] and the receiver the test drains to observe
/// every frame the multiplexer under test emits.
pub fn channel_transport() -> (ChannelTransport, mpsc::UnboundedReceiver<EncodedFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelTransport { tx }, rx)
}

/// `SocketHandler` that always accepts the connection and serves one fixed,
/// already-built registry. Good enough for any test that doesn't need to
/// exercise `connect` refusal or a derived connection id.
pub struct FixedSocketHandler {
    pub id: Option<String>,
    pub registry: ChannelRegistry,
}

impl FixedSocketHandler {
    pub fn new(registry: ChannelRegistry) -> Self {
        FixedSocketHandler { id: None, registry }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl SocketHandler for FixedSocketHandler {
    async fn connect(&self, _params: Value, socket: Socket) -> Option<Socket> {
        Some(socket)
    }

    fn id(&self, _socket: &Socket) -> Option<String> {
        self.id.clone()
    }

    fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }
}
