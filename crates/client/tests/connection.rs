//! Connection behaviour against a scripted socket server.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use skillswap_client::{ClientError, Connection, ConnectionState, ConnectOptions};
use skillswap_core::new_id;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{accept_async, tungstenite::Message as Frame, WebSocketStream};

type ServerSocket = WebSocketStream<TcpStream>;

const USER_ID: &str = "11111111-1111-4111-8111-111111111111";

async fn greet(socket: &mut ServerSocket) {
    let ready = json!({ "event": "ready", "data": { "userId": USER_ID } });
    socket.send(Frame::Text(ready.to_string())).await.unwrap();
}

async fn next_event(socket: &mut ServerSocket) -> Option<Value> {
    while let Some(Ok(frame)) = socket.next().await {
        if let Frame::Text(text) = frame {
            return serde_json::from_str(&text).ok();
        }
    }
    None
}

/// Accepts sockets forever, handing each to `script` in order.
async fn scripted_server<F, Fut>(script: F) -> std::net::SocketAddr
where
    F: Fn(usize, ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut accepted = 0;
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(socket) = accept_async(stream).await {
                tokio::spawn(script(accepted, socket));
                accepted += 1;
            }
        }
    });
    addr
}

fn options(ack_timeout: Duration) -> ConnectOptions {
    ConnectOptions {
        ack_timeout,
        reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(50),
    }
}

async fn wait_for_state(conn: &Connection, wanted: ConnectionState) {
    let mut states = conn.watch_state();
    timeout(Duration::from_secs(3), states.wait_for(|state| *state == wanted))
        .await
        .expect("state change")
        .expect("driver alive");
}

#[tokio::test]
async fn unanswered_send_times_out_and_detaches() {
    // Greets, then never answers anything.
    let addr = scripted_server(|_, mut socket| async move {
        greet(&mut socket).await;
        while next_event(&mut socket).await.is_some() {}
    })
    .await;

    let conn = Connection::connect(
        &common::client_config(addr),
        "token",
        options(Duration::from_millis(200)),
    )
    .await
    .unwrap();
    assert_eq!(conn.user_id(), USER_ID);
    assert_eq!(conn.listener_count(), 0);

    let err = conn
        .send_message(&new_id(), &new_id(), "hello?")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout), "{err:?}");
    assert_eq!(conn.listener_count(), 0);

    conn.disconnect().await;
}

#[tokio::test]
async fn requests_fail_fast_once_disconnected() {
    let addr = scripted_server(|_, mut socket| async move {
        greet(&mut socket).await;
        while next_event(&mut socket).await.is_some() {}
    })
    .await;

    let conn = Connection::connect(
        &common::client_config(addr),
        "token",
        options(Duration::from_secs(5)),
    )
    .await
    .unwrap();
    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    let started = std::time::Instant::now();
    let err = conn
        .send_message(&new_id(), &new_id(), "hello?")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(matches!(
        conn.mark_message_as_read(&new_id()),
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(conn.messages().err(), Some(ClientError::NotConnected)));
}

#[tokio::test]
async fn validation_happens_before_the_network() {
    let addr = scripted_server(|_, mut socket| async move {
        greet(&mut socket).await;
        while next_event(&mut socket).await.is_some() {}
    })
    .await;
    let conn = Connection::connect(
        &common::client_config(addr),
        "token",
        options(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    let err = conn.send_message("p1", &new_id(), "hi").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(ref m) if m == "Invalid Project ID format"));
    let err = conn.send_message(&new_id(), &new_id(), "   ").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn transport_drop_reconnects_and_rejoins_rooms() {
    let project_id = new_id();
    let (rejoined_tx, mut rejoined_rx) = mpsc::unbounded_channel::<Value>();

    let addr = scripted_server(move |n, mut socket| {
        let rejoined_tx = rejoined_tx.clone();
        async move {
            greet(&mut socket).await;
            let Some(join) = next_event(&mut socket).await else {
                return;
            };
            let reply = json!({ "event": "joined", "data": join["data"].clone() });
            socket.send(Frame::Text(reply.to_string())).await.unwrap();

            if n == 0 {
                // Vanish without a close handshake.
                drop(socket);
            } else {
                let _ = rejoined_tx.send(join);
                while next_event(&mut socket).await.is_some() {}
            }
        }
    })
    .await;

    let conn = Connection::connect(
        &common::client_config(addr),
        "token",
        options(Duration::from_secs(2)),
    )
    .await
    .unwrap();
    conn.join_project(&project_id).await.unwrap();

    let join = timeout(Duration::from_secs(3), rejoined_rx.recv())
        .await
        .expect("rejoin within the reconnect window")
        .unwrap();
    assert_eq!(join["event"], "joinProject");
    assert_eq!(join["data"]["projectId"], project_id.as_str());

    wait_for_state(&conn, ConnectionState::Connected).await;
    conn.disconnect().await;
}

#[tokio::test]
async fn server_close_reconnects_once() {
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel::<usize>();

    let addr = scripted_server(move |n, mut socket| {
        let accepted_tx = accepted_tx.clone();
        async move {
            let _ = accepted_tx.send(n);
            greet(&mut socket).await;
            if n == 0 {
                let _ = socket.close(None).await;
            } else {
                while next_event(&mut socket).await.is_some() {}
            }
        }
    })
    .await;

    let conn = Connection::connect(
        &common::client_config(addr),
        "token",
        options(Duration::from_secs(2)),
    )
    .await
    .unwrap();
    assert_eq!(accepted_rx.recv().await, Some(0));

    let second = timeout(Duration::from_secs(3), accepted_rx.recv())
        .await
        .expect("reconnect after close")
        .unwrap();
    assert_eq!(second, 1);
    wait_for_state(&conn, ConnectionState::Connected).await;
    conn.disconnect().await;
}

#[tokio::test]
async fn gives_up_when_the_server_is_gone() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        greet(&mut socket).await;
        // Dropping both the socket and the listener leaves nothing to reconnect to.
    });

    let conn = Connection::connect(
        &common::client_config(addr),
        "token",
        options(Duration::from_secs(1)),
    )
    .await
    .unwrap();
    server.await.unwrap();

    wait_for_state(&conn, ConnectionState::Disconnected).await;
    assert!(conn.state().is_terminal());
}
