//! The channel handler callback contract (spec §6 "Channel handler callback
//! set"). User code implements [`ChannelHandler`]; the worker in
//! `src/worker.rs` drives it.
//!
//! Channel workers are stored behind `Box<dyn ChannelHandler>` in the
//! registry (`src/registry.rs`), so the trait must be dyn-compatible.
//! `async fn` in traits isn't object-safe yet, so methods return a boxed
//! future explicitly here; the non-dyn traits in `transport.rs`/`handler.rs`
//! use plain `async fn` instead (`#![allow(async_fn_in_trait)]`), since only
//! this trait needs to live behind `dyn`.

use std::{future::Future, pin::Pin};

use serde_json::Value;

use crate::{message::Status, socket::Scratch, socket::Socket};

/// A callback's reason for stopping the channel worker, or the reason a
/// worker observed on termination. Mirrors the handful of shutdown reasons
/// spec §4.3/§7 name explicitly; anything else is an opaque crash reason.
#[derive(Debug, Clone)]
pub enum Reason {
    Normal,
    Shutdown,
    ShutdownLeft,
    ShutdownClosed,
    Crash(String),
}

impl Reason {
    /// True for the shutdown reasons spec §4.3 "Termination" calls *normal*
    /// (`normal`, `shutdown`, or `shutdown{_}`) — these trigger a graceful
    /// exit notification instead of a death-watch `phx_error`.
    pub fn is_normal(&self) -> bool {
        matches!(self, Reason::Normal | Reason::Shutdown | Reason::ShutdownLeft | Reason::ShutdownClosed)
    }
}

/// Result of `channel.join` (spec §4.3 step 2 / §6).
pub enum JoinResult {
    Ok(Socket),
    OkWithReply(Value, Socket),
    Error(Value),
}

/// Either just a status, or a status with a payload — the `response` shape
/// `reply(response, socket)` accepts (spec §4.3 callback result protocol).
#[derive(Debug, Clone)]
pub enum Response {
    Status(Status),
    StatusPayload(Status, Value),
}

impl Response {
    pub fn into_parts(self) -> (Status, Value) {
        match self {
            Response::Status(s) => (s, serde_json::json!({})),
            Response::StatusPayload(s, payload) => (s, payload),
        }
    }
}

/// Shared result shape for `handle_in`/`handle_out`/`handle_info`. `Reply`
/// variants are only valid from `handle_in`; the worker enforces that (spec
/// §4.3: "A reply outside `handle_in` is a programmer error").
pub enum HandlerResult {
    NoReply(Socket),
    NoReplyHibernate(Socket),
    Reply(Response, Socket),
    Stop(Reason, Socket),
    StopWithReply(Reason, Response, Socket),
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-channel-module metadata fixed at compile time (spec §6): the set of
/// broadcast events this module wants routed through `handle_out` instead
/// of the fastlane, and the initial `socket.private` map.
pub trait ChannelMeta {
    const INTERCEPTS: &'static [&'static str];
    fn initial_private() -> Scratch {
        Scratch::new()
    }
}

/// The user-implemented channel handler contract.
pub trait ChannelHandler: Send {
    fn join<'a>(&'a mut self, topic: &'a str, payload: Value, socket: Socket) -> BoxFuture<'a, JoinResult>;

    fn handle_in<'a>(&'a mut self, event: &'a str, payload: Value, socket: Socket) -> BoxFuture<'a, HandlerResult>;

    fn handle_out<'a>(&'a mut self, event: &'a str, payload: Value, socket: Socket) -> BoxFuture<'a, HandlerResult>;

    fn handle_info<'a>(&'a mut self, msg: Value, socket: Socket) -> BoxFuture<'a, HandlerResult>;

    fn terminate<'a>(&'a mut self, reason: Reason, socket: Socket) -> BoxFuture<'a, ()>;

    /// Live upgrade hook; most handlers leave this a no-op.
    fn code_change(&mut self, _old: &str, socket: Socket, _extra: Value) -> Socket {
        socket
    }
}
