//! Error types for the multiplexer core.
//!
//! Follows the teacher's split between a small `Copy` "kind" enum that
//! external collaborators (transports, serializers) report, and a richer
//! crate error that wraps it with the context the multiplexer has on hand.

use std::fmt;

use thiserror::Error;

use crate::registry::Pattern;

/// Errors raised while building a [`ChannelRegistry`](crate::registry::ChannelRegistry)
/// or a transport binding. These surface at handler-module load time, per
/// spec §7.7, so the caller fails fast instead of at runtime.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("topic pattern {0:?} has a `*` outside the terminal position")]
    SplatNotTerminal(String),
    #[error("duplicate transport name {0:?}")]
    DuplicateTransport(String),
    #[error("unsupported serializer version requirement for transport {0:?}: {1}")]
    BadSerializerRequirement(String, String),
}

impl RegistryError {
    pub(crate) fn splat_not_terminal(pattern: &str) -> Self {
        RegistryError::SplatNotTerminal(pattern.to_string())
    }
}

/// A "kind" enum a [`Serializer`](crate::serializer::Serializer) implementation
/// reports on failure. Mirrors `WireTxErrorKind`/`WireRxErrorKind` in spirit:
/// callers match on the kind, the crate wraps it with more context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SerializerErrorKind {
    Encode,
    Decode,
    Fastlane,
}

impl fmt::Display for SerializerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SerializerErrorKind::Encode => "encode",
            SerializerErrorKind::Decode => "decode",
            SerializerErrorKind::Fastlane => "fastlane",
        };
        f.write_str(s)
    }
}

pub trait AsSerializerErrorKind {
    fn as_kind(&self) -> SerializerErrorKind;
}

/// A "kind" enum a [`Transport`](crate::transport::Transport) implementation
/// reports on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportErrorKind {
    ConnectionClosed,
    Other,
}

pub trait AsTransportErrorKind {
    fn as_kind(&self) -> TransportErrorKind;
}

/// Errors a [`ChannelHandler`](crate::channel::ChannelHandler) callback can
/// signal back to its owning worker. A bad callback return is a programmer
/// error (spec §7.5) and is reported as [`ChannelError::BadReturn`]; the
/// worker crashes in isolation, the connection survives.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(
        "channel module {module} returned an unrecognized result from {callback}; accepted shapes: {accepted}"
    )]
    BadReturn {
        module: &'static str,
        callback: &'static str,
        accepted: &'static str,
    },
    #[error("channel join panicked: {0}")]
    JoinPanicked(String),
    #[error("serializer failed to encode outbound frame: {0}")]
    EncodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Top-level multiplexer error. Only returned from `connect`/`init`-style
/// entry points; once a connection is running, per-topic failures are
/// contained and reported as `phx_error` frames rather than as a `Result`.
#[derive(Debug, Error)]
pub enum MultiplexerError {
    #[error("socket handler connect callback failed")]
    ConnectRefused,
    #[error("socket handler id() returned something other than a string or none")]
    BadSocketId,
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(s) => write!(f, "{s}"),
            Pattern::Prefix(p) => write!(f, "{p}:*"),
        }
    }
}
