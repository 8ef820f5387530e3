//! Local harness and a tiny reference channel module, shared by the
//! integration tests in `tests/`.
//!
//! Grounded on the teacher's `local_setup`/`LocalServer` pattern above
//! (now superseded): a single constructor wires up in-memory fakes on both
//! ends so tests drive the real dispatch machinery without any actual I/O.
//! Generalized here from one request/reply/topic client to a full
//! `Multiplexer` wired to [`sockmux::testing::ChannelTransport`] and
//! [`sockmux::testing::FixedSocketHandler`].

use std::sync::Arc;

use serde_json::{json, Value};
use sockmux::{
    channel::{BoxFuture, ChannelHandler, ChannelMeta, HandlerResult, JoinResult, Reason, Response},
    message::Status,
    multiplexer::{Config, Multiplexer},
    pubsub::LocalPubSub,
    registry::ChannelRegistry,
    serializer::{EncodedFrame, JsonSerializer},
    socket::Socket,
    testing::{channel_transport, ChannelTransport, FixedSocketHandler},
};
use tokio::sync::mpsc;

/// A minimal room channel: joins unconditionally, echoes `msg` events back
/// under an `echo` key, and panics on `boom` to exercise crash isolation.
#[derive(Default)]
pub struct RoomChannel;

impl ChannelMeta for RoomChannel {
    const INTERCEPTS: &'static [&'static str] = &[];
}

impl ChannelHandler for RoomChannel {
    fn join<'a>(&'a mut self, _topic: &'a str, _payload: Value, socket: Socket) -> BoxFuture<'a, JoinResult> {
        Box::pin(async move { JoinResult::Ok(socket) })
    }

    fn handle_in<'a>(&'a mut self, event: &'a str, payload: Value, socket: Socket) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match event {
                "msg" => {
                    let echo = payload.get("body").cloned().unwrap_or(Value::Null);
                    HandlerResult::Reply(Response::StatusPayload(Status::Ok, json!({"echo": echo})), socket)
                }
                "boom" => panic!("boom: simulated handler crash"),
                _ => HandlerResult::NoReply(socket),
            }
        })
    }

    fn handle_out<'a>(&'a mut self, _event: &'a str, _payload: Value, socket: Socket) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move { HandlerResult::NoReply(socket) })
    }

    fn handle_info<'a>(&'a mut self, _msg: Value, socket: Socket) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move { HandlerResult::NoReply(socket) })
    }

    fn terminate<'a>(&'a mut self, _reason: Reason, _socket: Socket) -> BoxFuture<'a, ()> {
        Box::pin(async move {})
    }
}

/// Builds a registry with `"room:*" => RoomChannel` registered, the fixture
/// every lifecycle test in this crate joins against.
pub fn room_registry() -> ChannelRegistry {
    let mut reg = ChannelRegistry::new();
    sockmux::channel_routes! {
        registry: reg,
        routes: {
            "room:*" => RoomChannel,
        },
    };
    reg
}

/// One connection under test: a real [`Multiplexer`] wired to an in-memory
/// transport, with convenience `send`/`recv` helpers so tests can speak in
/// plain JSON values instead of hand-encoding frames.
pub struct LocalHarness {
    pub mux: Multiplexer<FixedSocketHandler, JsonSerializer, LocalPubSub<JsonSerializer>, ChannelTransport>,
    pub pubsub: Arc<LocalPubSub<JsonSerializer>>,
    rx: mpsc::UnboundedReceiver<EncodedFrame>,
}

impl LocalHarness {
    pub async fn connect(registry: ChannelRegistry) -> Self {
        Self::connect_with_id(registry, None).await
    }

    pub async fn connect_with_id(registry: ChannelRegistry, id: Option<&str>) -> Self {
        let (transport, rx) = channel_transport();
        let mut handler = FixedSocketHandler::new(registry);
        if let Some(id) = id {
            handler = handler.with_id(id);
        }
        let handler = Arc::new(handler);
        let serializer = Arc::new(JsonSerializer);
        let pubsub = Arc::new(LocalPubSub::new());

        let mut mux = Multiplexer::connect(
            handler,
            serializer,
            pubsub.clone(),
            transport,
            Config::default(),
            "pubsub",
            "local-test",
            json!({}),
        )
        .await
        .expect("connect should not be refused");
        mux.init();

        LocalHarness { mux, pubsub, rx }
    }

    /// Encodes `msg` as a JSON frame and feeds it to the multiplexer, as if
    /// it had just arrived from the wire.
    pub async fn send(&mut self, msg: Value) {
        let bytes = serde_json::to_vec(&msg).expect("test fixture payload must serialize");
        self.mux.in_(&bytes).await;
    }

    /// Waits for the next frame the multiplexer pushed to the transport and
    /// decodes it back into a JSON value for assertions.
    pub async fn recv(&mut self) -> Value {
        let frame = self.rx.recv().await.expect("transport closed unexpectedly");
        serde_json::from_slice(&frame.bytes).expect("emitted frame must be valid JSON")
    }

    /// Processes exactly one pending async event (crash notice, fastlane
    /// push, forced-disconnect broadcast, ...). Returns `false` once the
    /// connection should stop.
    pub async fn info(&mut self) -> bool {
        self.mux.info().await
    }

    pub async fn terminate(&mut self) {
        self.mux.terminate().await;
    }
}
