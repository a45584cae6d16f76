//! Framer/connection: turns a [`TcpStream`] into a stream of [`Message`]s
//! delimited by newlines, buffering partial reads the cancel-safe way so a
//! dropped `recv()` future never loses bytes already pulled off the wire.
//!
//! Grounded on `mcp-proxy`'s `ProcessMcpTransport`/`NamedPipeMcpTransport`
//! read loops: a persistent `Vec<u8>` scratch buffer is scanned for the
//! delimiter before another `read` is issued, so a partially read line
//! survives across suspension points.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ConnError;
use crate::message::Message;

const READ_CHUNK: usize = 8 * 1024;

/// One end of a framed TCP connection.
///
/// Holds an optional socket (absent once closed) plus two buffers: a queue
/// of already-split, possibly-malformed frames awaiting delivery, and a
/// partial-line scratch buffer for bytes read but not yet newline-terminated.
pub struct Connection {
    socket: Option<TcpStream>,
    peer: Option<SocketAddr>,
    partial: Vec<u8>,
    queued: VecDeque<Result<Message, serde_json::Error>>,
}

impl Connection {
    /// Wrap an already-connected stream.
    pub fn new(socket: TcpStream) -> Self {
        let peer = socket.peer_addr().ok();
        Self {
            socket: Some(socket),
            peer,
            partial: Vec::new(),
            queued: VecDeque::new(),
        }
    }

    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, ConnError> {
        let socket = TcpStream::connect(addr).await?;
        Ok(Self::new(socket))
    }

    /// The peer address captured at construction time, if available.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Encode and write one message in a single `write_all`. Leaves the
    /// connection closed if the write fails.
    pub async fn send(&mut self, msg: &Message) -> Result<(), ConnError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(ConnError::Closed);
        };
        let bytes = msg.encode()?;
        match socket.write_all(&bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.drop_socket();
                Err(ConnError::Io(e))
            }
        }
    }

    /// Receive the next frame, draining any already-parsed backlog first.
    ///
    /// A decode error earlier in the stream is replayed at the position it
    /// occurred, ahead of any good frames that followed it in the same
    /// read, and the framing error surfaces as [`ConnError::Framing`].
    pub async fn recv(&mut self) -> Result<Message, ConnError> {
        loop {
            if let Some(item) = self.queued.pop_front() {
                return item.map_err(ConnError::Framing);
            }

            let Some(socket) = self.socket.as_mut() else {
                return Err(ConnError::Closed);
            };

            let mut chunk = [0u8; READ_CHUNK];
            let n = match socket.read(&mut chunk).await {
                Ok(0) => {
                    self.drop_socket();
                    return Err(ConnError::Closed);
                }
                Ok(n) => n,
                Err(e) => {
                    self.drop_socket();
                    return Err(ConnError::Io(e));
                }
            };

            self.partial.extend_from_slice(&chunk[..n]);
            self.split_complete_lines();
        }
    }

    /// Split any complete (`\n`-terminated) lines out of `partial` into
    /// `queued`, attempting to decode each as a [`Message`].
    fn split_complete_lines(&mut self) {
        loop {
            let Some(pos) = self.partial.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            self.queued.push_back(serde_json::from_slice::<Message>(line));
        }
    }

    fn drop_socket(&mut self) {
        self.socket = None;
    }

    /// Idempotent. Shuts the socket down (ignoring shutdown-time errors) and
    /// clears both buffers.
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.shutdown().await;
        }
        self.partial.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Connection::new(client), Connection::new(server))
    }

    #[tokio::test]
    async fn round_trips_a_message() {
        let (mut a, mut b) = pair().await;
        a.send(&Message::ping(1.0)).await.unwrap();
        let got = b.recv().await.unwrap();
        assert_eq!(got.cmd, crate::message::Command::Ping);
    }

    #[tokio::test]
    async fn splits_many_frames_from_one_read() {
        let (mut a, mut b) = pair().await;
        a.send(&Message::ping(1.0)).await.unwrap();
        a.send(&Message::quit()).await.unwrap();
        // give both writes a chance to land in one read on b's side
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let first = b.recv().await.unwrap();
        let second = b.recv().await.unwrap();
        assert_eq!(first.cmd, crate::message::Command::Ping);
        assert_eq!(second.cmd, crate::message::Command::Quit);
    }

    #[tokio::test]
    async fn recv_after_peer_close_is_closed_error() {
        let (mut a, b) = pair().await;
        drop(b);
        let err = a.recv().await.unwrap_err();
        assert!(matches!(err, ConnError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut a, _b) = pair().await;
        a.close().await;
        a.close().await;
        assert!(a.is_closed());
        let err = a.send(&Message::quit()).await.unwrap_err();
        assert!(matches!(err, ConnError::Closed));
    }
}
