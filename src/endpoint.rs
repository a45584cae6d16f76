//! Service endpoint: the user-facing object that is either a connected
//! client or a listening server, never both (see the protocol spec's
//! component design, §4.3).
//!
//! The accept loop's spawn-per-connection pattern and its consecutive-error
//! tolerance are grounded on `jetsocat/src/listener.rs`'s `tcp_listener_task`.

use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;

use crate::connection::Connection;
use crate::dispatcher;
use crate::error::{ConnError, EndpointError};
use crate::exceptions::{DefaultExceptionResolver, ExceptionResolver};
use crate::logger::{Logger, TracingLogger};
use crate::message::{Command, Message};
use crate::registry::MethodRegistry;

/// Number of consecutive `accept()` failures the listen loop tolerates
/// before giving up. The spec's original numeric choice; see `DESIGN.md`
/// for why this supersedes the original test suite's stricter mock.
pub const ACCEPT_ERROR_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unset,
    Client,
    Server,
}

/// A symmetric client/server RPC endpoint bound to one `(host, port)` pair
/// and one shared authkey, generic over the user's service type `S`.
pub struct Endpoint<S> {
    host: String,
    port: u16,
    authkey: Arc<str>,
    mode: Mode,
    conn: Option<Connection>,
    service: Arc<S>,
    registry: Arc<MethodRegistry<S>>,
    logger: Arc<dyn Logger>,
    exceptions: Arc<dyn ExceptionResolver>,
}

impl<S: Send + Sync + 'static> Endpoint<S> {
    pub fn new(host: impl Into<String>, port: u16, authkey: impl Into<String>, service: S, registry: MethodRegistry<S>) -> Self {
        Self {
            host: host.into(),
            port,
            authkey: Arc::from(authkey.into()),
            mode: Mode::Unset,
            conn: None,
            service: Arc::new(service),
            registry: Arc::new(registry),
            logger: Arc::new(TracingLogger),
            exceptions: Arc::new(DefaultExceptionResolver),
        }
    }

    /// Replace the injected logger (defaults to [`TracingLogger`]). Tests
    /// typically install a [`crate::logger::RecordingLogger`] here.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the injected exception resolver (defaults to
    /// [`DefaultExceptionResolver`]).
    pub fn with_exception_resolver(mut self, resolver: Arc<dyn ExceptionResolver>) -> Self {
        self.exceptions = resolver;
        self
    }

    /// Idempotent. Drops any held connection; leaves `mode` unchanged.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }

    /// Transition to client mode (first call) and establish/reuse the
    /// connection. Fails with [`EndpointError::WrongMode`] if this endpoint
    /// is already serving.
    pub async fn connect(&mut self) -> Result<(), EndpointError> {
        match self.mode {
            Mode::Server => return Err(EndpointError::WrongMode),
            Mode::Unset => self.mode = Mode::Client,
            Mode::Client => {}
        }

        if self.conn.is_some() {
            return Ok(());
        }

        let mut conn = match Connection::connect((self.host.as_str(), self.port)).await {
            Ok(conn) => conn,
            Err(e) => {
                self.logger.warn(&format!(
                    "Failed to authenticate to server: {e}"
                ));
                return Err(e.into());
            }
        };

        if let Err(e) = conn.send(&Message::auth(self.authkey.to_string())).await {
            self.logger.warn(&format!("Failed to authenticate to server: {e}"));
            return Err(e.into());
        }

        match conn.recv().await {
            Ok(Message { cmd: Command::Ok, .. }) => {
                self.conn = Some(conn);
                Ok(())
            }
            Ok(Message { cmd: Command::Err, payload }) => {
                let reason = payload.first().and_then(Value::as_str).unwrap_or("").to_owned();
                self.logger.warn(&format!(
                    "Failed to authenticate to {} port {}: {reason}",
                    self.host, self.port
                ));
                conn.close().await;
                Ok(())
            }
            Ok(_) => {
                self.logger.warn("Received bogus response from server: unexpected command");
                conn.close().await;
                Err(EndpointError::UnexpectedCommand)
            }
            Err(ConnError::Closed) => {
                self.logger.warn("Connection closed while authenticating to server");
                conn.close().await;
                Err(ConnError::Closed.into())
            }
            Err(ConnError::Framing(e)) => {
                self.logger.warn(&format!("Received bogus response from server: {e}"));
                conn.close().await;
                Err(ConnError::Framing(e).into())
            }
            Err(e) => {
                self.logger.warn(&format!("Failed to authenticate to server: {e}"));
                conn.close().await;
                Err(e.into())
            }
        }
    }

    /// Send a `PING` and return the time elapsed since the client stamped
    /// the request, as measured against the server's echoed timestamp.
    pub async fn ping(&mut self) -> Result<std::time::Duration, EndpointError> {
        self.connect().await?;
        let now = now_secs();
        self.send_recv(Message::ping(now)).await.and_then(|reply| match reply.cmd {
            Command::Pong => {
                let echoed = reply.payload.first().and_then(Value::as_f64).unwrap_or(now);
                Ok(std::time::Duration::from_secs_f64((now - echoed).max(0.0)))
            }
            _ => Err(EndpointError::UnexpectedCommand),
        })
    }

    /// The remote method proxy entry point. In server mode this invokes the
    /// registry handler directly against the local service; otherwise it
    /// performs a `CALL` round trip (connecting first if necessary).
    pub async fn call(&mut self, name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, EndpointError> {
        if self.mode == Mode::Server {
            return match self.registry.invoke(name, Arc::clone(&self.service), args, kwargs).await {
                Some(Ok(value)) => Ok(value),
                Some(Err(exc)) => Err(EndpointError::Remote(self.exceptions.resolve(&exc.class, &exc.message))),
                None => Err(EndpointError::NoSuchMethod(name.to_owned())),
            };
        }

        self.connect().await?;
        let reply = self.send_recv(Message::call(name, args, kwargs)).await?;
        match reply.cmd {
            Command::Res => Ok(reply.payload.into_iter().next().unwrap_or(Value::Null)),
            Command::Exc => {
                let class = reply.payload.first().and_then(Value::as_str).unwrap_or("").to_owned();
                let message = reply.payload.get(1).and_then(Value::as_str).unwrap_or("").to_owned();
                Err(EndpointError::Remote(self.exceptions.resolve(&class, &message)))
            }
            Command::Err => {
                let reason = reply.payload.first().and_then(Value::as_str).unwrap_or("").to_owned();
                self.close().await;
                Err(EndpointError::Catastrophic(reason))
            }
            _ => {
                self.close().await;
                Err(EndpointError::UnexpectedCommand)
            }
        }
    }

    async fn send_recv(&mut self, msg: Message) -> Result<Message, EndpointError> {
        let conn = self.conn.as_mut().ok_or(ConnError::Closed)?;
        conn.send(&msg).await?;
        Ok(conn.recv().await?)
    }

    /// Transition to server mode (first call) and serve forever, spawning
    /// one task per accepted connection. Returns once the accept loop gives
    /// up after [`ACCEPT_ERROR_THRESHOLD`] consecutive failures.
    pub async fn listen(&mut self) -> Result<(), EndpointError>
    where
        S: 'static,
    {
        match self.mode {
            Mode::Client => return Err(EndpointError::WrongMode),
            Mode::Unset => self.mode = Mode::Server,
            Mode::Server => {}
        }

        let listener = bind_listener(&self.host, self.port).await?;
        let mut consecutive_errors: u32 = 0;

        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    consecutive_errors = 0;
                    self.logger.info(&format!("Accepted connection from {peer}"));
                    let conn = Connection::new(socket);
                    let authkey = Arc::clone(&self.authkey);
                    let service = Arc::clone(&self.service);
                    let registry = Arc::clone(&self.registry);
                    let logger = Arc::clone(&self.logger);
                    tokio::spawn(dispatcher::serve(conn, peer, authkey, service, registry, logger));
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if accept_error_is_fatal(consecutive_errors) {
                        self.logger.warn(&format!("Too many errors accepting connections: {e}"));
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// The 11th consecutive failure is fatal; any intervening success resets
/// the counter to zero before this is consulted again.
fn accept_error_is_fatal(consecutive_errors: u32) -> bool {
    consecutive_errors > ACCEPT_ERROR_THRESHOLD
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Backlog passed to `listen()` on the bound socket, matching the original's
/// explicit `listen(1024)`.
const LISTEN_BACKLOG: i32 = 1024;

/// Bind a listening socket against `host`/`port`, reproducing the original's
/// `_create_server` candidate fan-out: `host` is first split on `,` into one
/// or more hostnames (so `"h1,h2"` yields two candidate hosts, not one bogus
/// DNS label), each hostname is resolved via `tokio::net::lookup_host` into
/// its own set of candidate addresses, and every `(host, addr)` pair is tried
/// in order. For each candidate: open a `socket2::Socket`, set
/// `SO_REUSEADDR=1`, bind, and listen with backlog [`LISTEN_BACKLOG`]. Any of
/// those three operations failing drops the partially-constructed socket and
/// moves on to the next candidate; the last encountered error is returned if
/// every candidate fails. An empty candidate list (no comma-separated host
/// resolves to anything) signals the original's exact
/// `"getaddrinfo returns an empty list"` message rather than a generic I/O
/// error.
async fn bind_listener(host: &str, port: u16) -> Result<TcpListener, ConnError> {
    let mut candidates = Vec::new();
    for part in host.split(',') {
        if let Ok(addrs) = tokio::net::lookup_host((part, port)).await {
            candidates.extend(addrs);
        }
    }

    if candidates.is_empty() {
        return Err(ConnError::Io(io::Error::other("getaddrinfo returns an empty list")));
    }

    let mut last_err = None;
    for addr in candidates {
        match try_bind_candidate(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(ConnError::Io(last_err.expect("candidates is non-empty")))
}

/// Attempt to bind and listen on a single resolved address, per the
/// create-socket / setsockopt / bind / listen sequence `bind_listener` walks
/// one candidate at a time.
fn try_bind_candidate(addr: std::net::SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}
