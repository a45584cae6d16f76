//! Layered error types for the connection core.
//!
//! Four kinds, kept deliberately disjoint (see the protocol spec's error
//! handling design): a transport failure, the `ConnectionClosed` control-flow
//! sentinel, a framing/protocol failure, and an application exception carried
//! back from a remote method.

use std::io;

use thiserror::Error;

/// Errors raised by [`crate::connection::Connection`].
#[derive(Debug, Error)]
pub enum ConnError {
    /// The underlying socket failed. The connection is no longer usable.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection, or a send/recv was attempted on a
    /// connection that was already closed. This is control flow, not a
    /// transport failure.
    #[error("connection closed")]
    Closed,

    /// A frame could not be decoded as a [`crate::message::Message`].
    #[error("framing error: {0}")]
    Framing(#[from] serde_json::Error),
}

/// An exception raised by a remote method, marshalled across the wire as an
/// `EXC` frame and carrying the qualified class name the server tagged it
/// with.
#[derive(Debug, Clone, Error)]
#[error("{class}: {message}")]
pub struct RemoteException {
    /// `"<module_path>:<class_name>"`, as sent by the peer.
    pub class: String,
    pub message: String,
}

impl RemoteException {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    /// The synthesized class name used for CALLs naming an unregistered or
    /// absent method.
    pub const ATTRIBUTE_ERROR_CLASS: &'static str = "exceptions:AttributeError";

    pub fn no_such_attribute(type_name: &str, attr: &str) -> Self {
        Self::new(
            Self::ATTRIBUTE_ERROR_CLASS,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }
}

/// Errors surfaced by [`crate::endpoint::Endpoint`] operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The endpoint attempted an operation forbidden by its current mode
    /// (e.g. `listen()` on a client-mode endpoint).
    #[error("endpoint is in the wrong mode for this operation")]
    WrongMode,

    /// A `CALL` to a name absent from the registry, issued while the
    /// endpoint is serving locally (no network peer to marshal an `EXC` to).
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// The peer replied with a command the caller was not prepared to
    /// receive (e.g. anything other than `PONG` in reply to `PING`).
    #[error("unexpected command from peer")]
    UnexpectedCommand,

    /// The server sent `ERR`, signalling the session is no longer usable.
    #[error("Catastrophic error from server: {0}")]
    Catastrophic(String),

    /// A resolved application exception (see [`crate::exceptions::ExceptionResolver`]).
    #[error(transparent)]
    Remote(Box<dyn std::error::Error + Send + Sync>),

    /// Connection-level failure.
    #[error(transparent)]
    Conn(#[from] ConnError),
}
