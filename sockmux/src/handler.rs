//! The socket handler callback contract (spec §6 "Socket handler callback
//! set"), plus the registry DSL entry points (§6 "Registry DSL") a handler
//! module assembles at load time.

#![allow(async_fn_in_trait)]

use serde_json::Value;

use crate::{registry::ChannelRegistry, socket::Socket};

/// User-implemented top-level connection handler: accepts or refuses a
/// connection and derives its stable id.
pub trait SocketHandler: Send + Sync + 'static {
    /// `connect(params, socket) -> ok(socket) | error`. Returning `None`
    /// refuses the connection.
    async fn connect(&self, params: Value, socket: Socket) -> Option<Socket>;

    /// `id(socket) -> string | none`. Rust's type system already enforces
    /// the "must be a string or absent" constraint spec §4.2 calls out as
    /// a runtime protocol error in a dynamically typed host.
    fn id(&self, socket: &Socket) -> Option<String>;

    /// Builds this handler's channel registry. Called once at handler
    /// construction; the registry is immutable afterward (spec §3
    /// "Lifecycle").
    fn registry(&self) -> &ChannelRegistry;
}
