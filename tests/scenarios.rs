//! End-to-end scenarios driven over real loopback sockets, in the style of
//! `mcp-proxy`'s `tests/spawn_process.rs`.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use ndjson_rpc::{Connection, Endpoint, ExceptionResolver, Message, MethodRegistry, RemoteException};
use serde_json::{Map, Value};
use tokio::net::TcpListener;

struct Echo;

fn registry() -> MethodRegistry<Echo> {
    MethodRegistry::new()
        .method("greet", |_svc, args, _kwargs| async move {
            let name = args.first().and_then(Value::as_str).unwrap_or("world");
            Ok(Value::String(format!("hi {name}")))
        })
        .method("boom", |_svc, _args, _kwargs| async move {
            Err(RemoteException::new("app:MyError", "boom"))
        })
}

async fn reserve_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn happy_call_round_trip() {
    let port = reserve_port().await;
    let mut server = Endpoint::new("127.0.0.1", port, "secret", Echo, registry());
    let server_task = tokio::spawn(async move {
        let _ = server.listen().await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut client = Endpoint::new("127.0.0.1", port, "secret", Echo, MethodRegistry::new());
    let reply = client.call("greet", vec!["world".into()], Map::new()).await.unwrap();
    assert_eq!(reply, Value::String("hi world".into()));

    server_task.abort();
}

#[tokio::test]
async fn application_exception_resolves_to_remote_exception() {
    let port = reserve_port().await;
    let mut server = Endpoint::new("127.0.0.1", port, "secret", Echo, registry());
    let server_task = tokio::spawn(async move {
        let _ = server.listen().await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut client = Endpoint::new("127.0.0.1", port, "secret", Echo, MethodRegistry::new());
    let err = client.call("boom", vec![], Map::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "app:MyError: boom");

    server_task.abort();
}

struct MyErrorResolver;

impl ExceptionResolver for MyErrorResolver {
    fn resolve(&self, class: &str, message: &str) -> Box<dyn std::error::Error + Send + Sync> {
        if class == "app:MyError" {
            Box::new(RemoteException::new(class, format!("typed: {message}")))
        } else {
            Box::new(RemoteException::new(class, message))
        }
    }
}

#[tokio::test]
async fn custom_exception_resolver_reconstructs_recognized_tags() {
    let port = reserve_port().await;
    let mut server = Endpoint::new("127.0.0.1", port, "secret", Echo, registry());
    let server_task = tokio::spawn(async move {
        let _ = server.listen().await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut client = Endpoint::new("127.0.0.1", port, "secret", Echo, MethodRegistry::new())
        .with_exception_resolver(Arc::new(MyErrorResolver));
    let err = client.call("boom", vec![], Map::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "app:MyError: typed: boom");

    server_task.abort();
}

/// Server replies `ERR` to a `CALL`; the client must surface a catastrophic
/// error and drop its connection rather than retry.
#[tokio::test]
async fn protocol_err_closes_the_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(sock);
        // auth
        let _ = conn.recv().await.unwrap();
        conn.send(&Message::ok()).await.unwrap();
        // any call at all gets a catastrophic ERR
        let _ = conn.recv().await.unwrap();
        conn.send(&Message::err("wassup?")).await.unwrap();
    });

    let mut client: Endpoint<()> = Endpoint::new("127.0.0.1", addr.port(), "secret", (), MethodRegistry::new());
    let err = client.call("anything", vec![], Map::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "Catastrophic error from server: wassup?");

    acceptor.await.unwrap();
}

/// After authenticating, an unrecognized command is tolerated and the
/// session continues to serve subsequent commands.
#[tokio::test]
async fn unknown_command_does_not_kill_the_session() {
    let port = reserve_port().await;
    let mut server = Endpoint::new("127.0.0.1", port, "secret", Echo, registry());
    let server_task = tokio::spawn(async move {
        let _ = server.listen().await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut conn = Connection::connect(("127.0.0.1", port)).await.unwrap();
    conn.send(&Message::auth("secret")).await.unwrap();
    assert_eq!(conn.recv().await.unwrap().cmd, ndjson_rpc::Command::Ok);

    conn.send(&Message::new(ndjson_rpc::Command::Other("XXXX".into()), vec![]))
        .await
        .unwrap();
    let err_reply = conn.recv().await.unwrap();
    assert_eq!(err_reply.cmd, ndjson_rpc::Command::Err);

    conn.send(&Message::call("greet", vec!["again".into()], Map::new()))
        .await
        .unwrap();
    let reply = conn.recv().await.unwrap();
    assert_eq!(reply.cmd, ndjson_rpc::Command::Res);
    assert_eq!(reply.payload[0], Value::String("hi again".into()));

    server_task.abort();
}
