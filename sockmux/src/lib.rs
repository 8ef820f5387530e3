//! A crash-isolated, topic-routed channel multiplexer for a single
//! bidirectional connection, modeled on Phoenix Channels: one long-lived
//! transport is multiplexed into many logical, independently-supervised
//! "channel" workers addressed by topic.
//!
//! The crate is organized around four external-collaborator seams a host
//! application plugs in (spec §1): a [`transport::Transport`] that writes
//! encoded frames to the wire, a [`serializer::Serializer`] that encodes and
//! decodes them, a [`pubsub::PubSub`] bus for cross-connection broadcast, and
//! a [`handler::SocketHandler`] that accepts connections and exposes the
//! application's [`registry::ChannelRegistry`]. [`multiplexer::Multiplexer`]
//! ties the four together for one connection; [`worker`] runs each joined
//! channel in its own isolated `tokio` task.

pub mod channel;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod handles;
pub mod message;
pub mod multiplexer;
pub mod pubsub;
pub mod registry;
pub mod serializer;
pub mod socket;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod transport;
pub mod worker;

pub use channel::{ChannelHandler, ChannelMeta, HandlerResult, JoinResult, Reason, Response};
pub use error::{ChannelError, MultiplexerError, RegistryError};
pub use handler::SocketHandler;
pub use handles::{ChannelId, ChannelPid, TransportPid};
pub use message::{Broadcast, Message, Outbound, Reply, Status};
pub use multiplexer::{Config, Multiplexer, MultiplexerEvent};
pub use pubsub::{LocalPubSub, PubSub};
pub use registry::{ChannelFactory, ChannelOptions, ChannelRegistry};
pub use serializer::{EncodedFrame, Opcode, Serializer};
pub use socket::Socket;
pub use transport::Transport;
