use std::net::TcpListener;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use camview_protocol::{IceServer, IceServerList};
use camview_signaling_server::router::{self, ServerState};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn ice_servers() -> IceServerList {
    IceServerList(vec![IceServer::new("stun:stun.l.google.com:19302")])
}

fn spawn_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router::create(ServerState::new(ice_servers())).into_make_service());
    tokio::spawn(server);
    port
}

async fn connect(port: u16, camera: &str, role: &str) -> Socket {
    let url = format!("ws://127.0.0.1:{port}/cameras/{camera}/{role}");
    connect_async(url).await.unwrap().0
}

/// Next text frame as JSON, `None` once the server closed the socket.
async fn next_json(socket: &mut Socket) -> Option<Value> {
    let next = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for a frame");
    match next {
        Some(Ok(Message::Text(text))) => Some(serde_json::from_str(&text).unwrap()),
        _ => None,
    }
}

/// The publisher registers asynchronously after its upgrade, retry until
/// the viewer is let in.
async fn join(port: u16, camera: &str) -> (Socket, Value) {
    for _ in 0..50 {
        let mut viewer = connect(port, camera, "viewer").await;
        if let Some(first) = next_json(&mut viewer).await {
            return (viewer, first);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("viewer was never admitted");
}

#[tokio::test]
async fn viewer_without_publisher_is_closed() {
    let port = spawn_server();
    let mut viewer = connect(port, "nobody", "viewer").await;
    assert_eq!(next_json(&mut viewer).await, None);
}

#[tokio::test]
async fn frames_are_relayed_between_viewer_and_publisher() {
    let port = spawn_server();
    let mut publisher = connect(port, "cam1", "publisher").await;

    let (mut viewer, first) = join(port, "cam1").await;
    let servers: IceServerList = serde_json::from_value(first).unwrap();
    assert_eq!(servers, ice_servers());

    let joined = next_json(&mut publisher).await.unwrap();
    assert_eq!(joined["type"], "viewerJoined");
    let id = joined["viewer"].clone();

    viewer
        .send(Message::Text(r#"{"type":"offer","sdp":"v=0 offer"}"#.to_owned()))
        .await
        .unwrap();
    assert_eq!(
        next_json(&mut publisher).await.unwrap(),
        json!({"type": "signal", "viewer": id, "payload": {"type": "offer", "sdp": "v=0 offer"}})
    );

    let reply = json!({"type": "signal", "viewer": id, "payload": {"type": "answer", "sdp": "v=0 answer"}});
    publisher
        .send(Message::Text(reply.to_string()))
        .await
        .unwrap();
    assert_eq!(
        next_json(&mut viewer).await.unwrap(),
        json!({"type": "answer", "sdp": "v=0 answer"})
    );

    viewer.close(None).await.unwrap();
    assert_eq!(
        next_json(&mut publisher).await.unwrap(),
        json!({"type": "viewerLeft", "viewer": id})
    );
}

#[tokio::test]
async fn publisher_leaving_closes_its_viewers() {
    let port = spawn_server();
    let mut publisher = connect(port, "cam2", "publisher").await;
    let (mut viewer, _) = join(port, "cam2").await;
    next_json(&mut publisher).await.unwrap();

    publisher.close(None).await.unwrap();
    assert_eq!(next_json(&mut viewer).await, None);
}

#[tokio::test]
async fn second_publisher_is_rejected() {
    let port = spawn_server();
    let _publisher = connect(port, "cam3", "publisher").await;
    join(port, "cam3").await;

    let mut second = connect(port, "cam3", "publisher").await;
    assert_eq!(next_json(&mut second).await, None);
}

#[tokio::test]
async fn health_check_answers_ok() {
    let port = spawn_server();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("OK"));
}
