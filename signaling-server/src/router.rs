use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use camview_protocol::{CameraId, IceServerList};

use crate::relay::{self, Cameras};

#[derive(Default, Clone)]
pub struct ServerState {
    cameras: Cameras,
    ice_servers: Arc<IceServerList>,
}

impl ServerState {
    #[must_use]
    pub fn new(ice_servers: IceServerList) -> Self {
        Self {
            cameras: Cameras::default(),
            ice_servers: Arc::new(ice_servers),
        }
    }
}

#[allow(clippy::unused_async)]
async fn health_handler() -> &'static str {
    "OK"
}

#[allow(clippy::unused_async)]
async fn publisher_handler(
    Path(camera_id): Path<String>,
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> Response {
    let camera_id = CameraId::new(camera_id);
    ws.on_upgrade(move |socket| relay::publisher_connected(socket, camera_id, state.cameras))
}

#[allow(clippy::unused_async)]
async fn viewer_handler(
    Path(camera_id): Path<String>,
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> Response {
    let camera_id = CameraId::new(camera_id);
    ws.on_upgrade(move |socket| {
        relay::viewer_connected(socket, camera_id, state.cameras, state.ice_servers)
    })
}

pub fn create(server_state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/cameras/:camera_id/publisher", get(publisher_handler))
        .route("/cameras/:camera_id/viewer", get(viewer_handler))
        .with_state(server_state)
}
