//! Transport boundary (spec §1 "Out of scope: the transport framing
//! layer"). The multiplexer only needs to hand an already-encoded frame to
//! something that writes it to the wire; everything about how bytes
//! actually reach the client (WebSocket, long-poll, ...) lives outside this
//! crate, the same separation the teacher draws with `WireTx`/`WireRx`
//! (`server/mod.rs`).

#![allow(async_fn_in_trait)]

use crate::{error::AsTransportErrorKind, serializer::EncodedFrame};

/// Sends encoded frames to the client. Implementations wrap a WebSocket
/// writer, a long-poll response queue, or (for tests) an in-memory channel.
pub trait Transport: Clone + Send + Sync + 'static {
    type Error: AsTransportErrorKind + std::error::Error + Send + Sync + 'static;

    async fn send(&self, frame: EncodedFrame) -> Result<(), Self::Error>;
}
