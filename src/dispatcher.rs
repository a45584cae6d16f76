//! Server dispatcher: the per-connection UNAUTH → AUTHED state machine (see
//! the protocol spec's component design, §4.4). One call to [`serve`] drives
//! exactly one accepted connection end-to-end and always leaves it closed.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::Connection;
use crate::error::{ConnError, RemoteException};
use crate::logger::Logger;
use crate::message::{Command, Message};
use crate::registry::MethodRegistry;

/// Drive `conn` through the authentication/command loop until the peer
/// disconnects, sends `QUIT`, or a fatal transport error occurs. Always
/// closes `conn` before returning.
pub async fn serve<S: Send + Sync + 'static>(
    mut conn: Connection,
    peer: SocketAddr,
    authkey: Arc<str>,
    service: Arc<S>,
    registry: Arc<MethodRegistry<S>>,
    logger: Arc<dyn Logger>,
) {
    let mut authenticated = false;

    loop {
        let msg = match conn.recv().await {
            Ok(msg) => msg,
            Err(ConnError::Closed) => break,
            Err(ConnError::Framing(e)) => {
                let _ = conn.send(&Message::err(format!("Failed to parse command: {e}"))).await;
                continue;
            }
            Err(ConnError::Io(e)) => {
                logger.warn(&format!("Error serving client at {peer}: {e}"));
                break;
            }
        };

        logger.debug(&format!(
            "Received command '{}' from {peer}; payload: {:?}",
            msg.cmd, msg.payload
        ));

        match msg.cmd {
            Command::Auth => {
                if authenticated {
                    let _ = conn.send(&Message::err("Already authenticated")).await;
                    continue;
                }
                let provided = msg.payload.first().and_then(Value::as_str).unwrap_or("");
                if provided == &*authkey {
                    authenticated = true;
                    if conn.send(&Message::ok()).await.is_err() {
                        break;
                    }
                } else {
                    let _ = conn.send(&Message::err("Invalid authentication key")).await;
                    break;
                }
            }
            _ if !authenticated => {
                let _ = conn.send(&Message::err("Not authenticated")).await;
                break;
            }
            Command::Ping => {
                let echoed = msg.payload.into_iter().next().unwrap_or(Value::Null);
                if conn.send(&Message::pong(echoed)).await.is_err() {
                    break;
                }
            }
            Command::Quit => break,
            Command::Call => {
                let reply = handle_call(&msg.payload, &service, &registry).await;
                if conn.send(&reply).await.is_err() {
                    break;
                }
            }
            Command::Other(ref token) => {
                let _ = conn.send(&Message::err(format!("Unrecognized command '{token}'"))).await;
            }
            Command::Ok | Command::Res | Command::Exc | Command::Err => {
                let _ = conn
                    .send(&Message::err(format!("Unrecognized command '{}'", msg.cmd)))
                    .await;
            }
        }
    }

    logger.info(&format!("Closing connection from {peer}"));
    conn.close().await;
}

async fn handle_call<S: Send + Sync + 'static>(
    payload: &[Value],
    service: &Arc<S>,
    registry: &MethodRegistry<S>,
) -> Message {
    let (name, args, kwargs) = match unpack_call_payload(payload) {
        Ok(parts) => parts,
        Err(reason) => return Message::err(format!("Invalid payload for 'CALL' command: {reason}")),
    };

    match registry.invoke(&name, Arc::clone(service), args, kwargs).await {
        Some(Ok(value)) => Message::res(value),
        Some(Err(RemoteException { class, message })) => Message::exc(class, message),
        None => {
            let type_name = std::any::type_name::<S>();
            let exc = RemoteException::no_such_attribute(type_name, &name);
            Message::exc(exc.class, exc.message)
        }
    }
}

fn unpack_call_payload(payload: &[Value]) -> Result<(String, Vec<Value>, serde_json::Map<String, Value>), String> {
    let name = payload
        .first()
        .and_then(Value::as_str)
        .ok_or("expected method name as first element")?
        .to_owned();
    let args = match payload.get(1) {
        Some(Value::Array(a)) => a.clone(),
        Some(other) => return Err(format!("expected array for positional args, got {other}")),
        None => Vec::new(),
    };
    let kwargs = match payload.get(2) {
        Some(Value::Object(m)) => m.clone(),
        Some(other) => return Err(format!("expected object for keyword args, got {other}")),
        None => serde_json::Map::new(),
    };
    Ok((name, args, kwargs))
}
