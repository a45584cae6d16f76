//! A symmetric client/server RPC core over newline-delimited JSON framing.
//!
//! [`Endpoint`] is the single entry point: bound to a listening address it
//! serves a user-supplied service object through a [`MethodRegistry`];
//! connected to a remote address it proxies calls to the same kind of
//! registry on the other end. See `SPEC_FULL.md` in the repository root for
//! the full protocol design.
//!
//! ```no_run
//! use ndjson_rpc::{Endpoint, MethodRegistry};
//!
//! struct Greeter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = MethodRegistry::new().method("greet", |_svc, args, _kwargs| async move {
//!     let name = args.first().and_then(|v| v.as_str()).unwrap_or("world");
//!     Ok(serde_json::Value::String(format!("hi {name}")))
//! });
//!
//! let mut server = Endpoint::new("127.0.0.1", 9999, "shared-secret", Greeter, registry);
//! tokio::spawn(async move { let _ = server.listen().await; });
//!
//! let mut client = Endpoint::new("127.0.0.1", 9999, "shared-secret", Greeter, MethodRegistry::new());
//! let reply = client.call("greet", vec!["world".into()], serde_json::Map::new()).await?;
//! assert_eq!(reply, serde_json::Value::String("hi world".into()));
//! # Ok(())
//! # }
//! ```
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod exceptions;
pub mod logger;
pub mod message;
pub mod registry;

pub use connection::Connection;
pub use endpoint::{Endpoint, ACCEPT_ERROR_THRESHOLD};
pub use error::{ConnError, EndpointError, RemoteException};
pub use exceptions::{DefaultExceptionResolver, ExceptionResolver};
pub use logger::{Logger, RecordingLogger, TracingLogger};
pub use message::{Command, Message};
pub use registry::{MethodHandler, MethodRegistry};
