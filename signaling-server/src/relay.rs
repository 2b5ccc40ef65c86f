use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;

use camview_protocol::relay::{FromPublisher, ToPublisher};
use camview_protocol::{CameraId, IceServerList, ViewerId};

pub type Sender = mpsc::UnboundedSender<Message>;

/// The publisher of one camera and the viewers watching it.
#[derive(Default, Debug)]
pub struct Camera {
    pub publisher: Option<Sender>,
    pub viewers: HashMap<ViewerId, Sender>,
}

pub type Cameras = Arc<RwLock<HashMap<CameraId, Camera>>>;

static NEXT_VIEWER_ID: AtomicU64 = AtomicU64::new(1);

/// Move the writing half of `ws` into its own task and return the queue
/// feeding it.
fn spawn_writer(mut ws_tx: SplitSink<WebSocket, Message>) -> Sender {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut rx = UnboundedReceiverStream::new(rx);

    tokio::task::spawn(async move {
        while let Some(message) = rx.next().await {
            if let Err(err) = ws_tx.send(message).await {
                debug!("websocket send error: {}", err);
                break;
            }
        }
    });
    tx
}

fn send(tx: &Sender, message: Message) {
    if tx.send(message).is_err() {
        debug!("socket already closed, dropping message");
    }
}

fn send_json<T: Serialize + ?Sized>(tx: &Sender, message: &T) {
    match serde_json::to_string(message) {
        Ok(text) => send(tx, Message::Text(text)),
        Err(err) => error!("failed to serialize message: {:?}", err),
    }
}

pub async fn publisher_connected(ws: WebSocket, camera_id: CameraId, cameras: Cameras) {
    let (ws_tx, mut ws_rx) = ws.split();
    let tx = spawn_writer(ws_tx);

    {
        let mut cameras = cameras.write().await;
        let camera = cameras.entry(camera_id.clone()).or_default();
        if camera.publisher.is_some() {
            warn!("camera {} already has a publisher, rejecting", camera_id);
            send(&tx, Message::Close(None));
            return;
        }
        camera.publisher = Some(tx);
    }
    info!("publisher of camera {} connected", camera_id);

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                warn!("publisher websocket error (camera={}): {}", camera_id, err);
                break;
            }
        };
        match message {
            Message::Text(text) => publisher_message(&camera_id, &text, &cameras).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("publisher of camera {} disconnected", camera_id);
    publisher_disconnected(&camera_id, &cameras).await;
}

async fn publisher_message(camera_id: &CameraId, text: &str, cameras: &Cameras) {
    let message = match serde_json::from_str::<FromPublisher>(text) {
        Ok(message) => message,
        Err(err) => {
            error!("invalid message from publisher of {}: {:?}", camera_id, err);
            return;
        }
    };
    debug!("message from publisher of {}: {:?}", camera_id, message);

    match message {
        FromPublisher::Signal { viewer, payload } => {
            let cameras = cameras.read().await;
            match cameras
                .get(camera_id)
                .and_then(|camera| camera.viewers.get(&viewer))
            {
                Some(tx) => send(tx, Message::Text(payload.to_string())),
                None => warn!("no {} on camera {}", viewer, camera_id),
            }
        }
        FromPublisher::CloseViewer { viewer } => {
            let removed = cameras
                .write()
                .await
                .get_mut(camera_id)
                .and_then(|camera| camera.viewers.remove(&viewer));
            if let Some(tx) = removed {
                info!("publisher closed {} of camera {}", viewer, camera_id);
                send(&tx, Message::Close(None));
            }
        }
    }
}

async fn publisher_disconnected(camera_id: &CameraId, cameras: &Cameras) {
    let Some(camera) = cameras.write().await.remove(camera_id) else {
        return;
    };
    for (viewer, tx) in camera.viewers {
        debug!("closing {} of camera {}", viewer, camera_id);
        send(&tx, Message::Close(None));
    }
}

pub async fn viewer_connected(
    ws: WebSocket,
    camera_id: CameraId,
    cameras: Cameras,
    ice_servers: Arc<IceServerList>,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let tx = spawn_writer(ws_tx);
    let viewer = ViewerId::new(NEXT_VIEWER_ID.fetch_add(1, Ordering::Relaxed));

    {
        let mut cameras = cameras.write().await;
        let Some(camera) = cameras
            .get_mut(&camera_id)
            .filter(|camera| camera.publisher.is_some())
        else {
            warn!("camera {} has no publisher, rejecting viewer", camera_id);
            send(&tx, Message::Close(None));
            return;
        };
        send_json(&tx, &*ice_servers);
        camera.viewers.insert(viewer, tx);
        if let Some(publisher) = &camera.publisher {
            send_json(publisher, &ToPublisher::ViewerJoined { viewer });
        }
    }
    info!("{} joined camera {}", viewer, camera_id);

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket error ({}): {}", viewer, err);
                break;
            }
        };
        match message {
            Message::Text(text) => viewer_message(viewer, &camera_id, &text, &cameras).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("{} left camera {}", viewer, camera_id);
    viewer_disconnected(viewer, &camera_id, &cameras).await;
}

async fn viewer_message(viewer: ViewerId, camera_id: &CameraId, text: &str, cameras: &Cameras) {
    let payload = match serde_json::from_str::<Value>(text) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("{} sent a frame that is not JSON: {}", viewer, err);
            return;
        }
    };
    let cameras = cameras.read().await;
    match cameras
        .get(camera_id)
        .and_then(|camera| camera.publisher.as_ref())
    {
        Some(publisher) => send_json(publisher, &ToPublisher::Signal { viewer, payload }),
        None => warn!("camera {} lost its publisher", camera_id),
    }
}

async fn viewer_disconnected(viewer: ViewerId, camera_id: &CameraId, cameras: &Cameras) {
    let mut cameras = cameras.write().await;
    let Some(camera) = cameras.get_mut(camera_id) else {
        return;
    };
    if camera.viewers.remove(&viewer).is_none() {
        return;
    }
    if let Some(publisher) = &camera.publisher {
        send_json(publisher, &ToPublisher::ViewerLeft { viewer });
    }
}
