use std::cell::Cell;
use std::rc::Rc;

use anyhow::Context;
use camview_protocol::{IceCandidate, IceServerList, SessionDescription};
use js_sys::Reflect;
use log::{debug, info, warn};
use serde_json::json;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    MediaStream, RtcConfiguration, RtcIceCandidate, RtcIceCandidateInit, RtcIceConnectionState,
    RtcPeerConnection, RtcPeerConnectionIceEvent, RtcRtpTransceiverInit,
    RtcSessionDescriptionInit, RtcTrackEvent,
};

use crate::config::TransceiverDirection;
use crate::platform::{IceConnectionState, MediaKind, PeerConnection, PlatformEvent};
use crate::web::{js_error, to_js};

/// Where a peer connection reports its events.
pub(crate) type Report = Rc<dyn Fn(PlatformEvent<MediaStream>)>;

/// `RtcPeerConnection` wrapper reporting through a [`Report`] callback.
pub struct WebPeerConnection {
    connection: RtcPeerConnection,
    report: Report,
    closed: Rc<Cell<bool>>,
    _on_ice_candidate: Closure<dyn FnMut(RtcPeerConnectionIceEvent)>,
    _on_ice_connection_state_change: Closure<dyn FnMut()>,
    _on_track: Closure<dyn FnMut(RtcTrackEvent)>,
}

impl WebPeerConnection {
    pub(crate) fn new(ice_servers: &IceServerList, report: Report) -> crate::Result<Self> {
        let configuration: RtcConfiguration = to_js(&json!({ "iceServers": ice_servers }))?
            .unchecked_into();
        let connection =
            RtcPeerConnection::new_with_configuration(&configuration).map_err(js_error)?;
        let closed = Rc::new(Cell::new(false));

        let on_ice_candidate = {
            let report = Rc::clone(&report);
            Closure::wrap(Box::new(move |event: RtcPeerConnectionIceEvent| {
                let candidate = event.candidate().map(|candidate| {
                    IceCandidate::new(
                        candidate.candidate(),
                        candidate.sdp_mid(),
                        candidate.sdp_m_line_index(),
                    )
                });
                report(PlatformEvent::LocalCandidate(candidate));
            }) as Box<dyn FnMut(RtcPeerConnectionIceEvent)>)
        };

        let on_ice_connection_state_change = {
            let report = Rc::clone(&report);
            let connection = connection.clone();
            Closure::wrap(Box::new(move || {
                if let Some(state) = ice_connection_state(connection.ice_connection_state()) {
                    report(PlatformEvent::IceConnectionState(state));
                }
            }) as Box<dyn FnMut()>)
        };

        let on_track = {
            let report = Rc::clone(&report);
            Closure::wrap(Box::new(move |event: RtcTrackEvent| {
                let track = event.track();
                let kind = if track.kind() == "audio" {
                    MediaKind::Audio
                } else {
                    MediaKind::Video
                };
                let stream = match event.streams().get(0).dyn_into::<MediaStream>() {
                    Ok(stream) => stream,
                    Err(_) => match MediaStream::new() {
                        Ok(stream) => {
                            stream.add_track(&track);
                            stream
                        }
                        Err(err) => {
                            warn!("failed to wrap {} track in a stream: {:?}", kind.as_str(), err);
                            return;
                        }
                    },
                };
                report(PlatformEvent::Track { kind, stream });
            }) as Box<dyn FnMut(RtcTrackEvent)>)
        };

        connection.set_onicecandidate(Some(on_ice_candidate.as_ref().unchecked_ref()));
        connection.set_oniceconnectionstatechange(Some(
            on_ice_connection_state_change.as_ref().unchecked_ref(),
        ));
        connection.set_ontrack(Some(on_track.as_ref().unchecked_ref()));

        Ok(Self {
            connection,
            report,
            closed,
            _on_ice_candidate: on_ice_candidate,
            _on_ice_connection_state_change: on_ice_connection_state_change,
            _on_track: on_track,
        })
    }

    pub(crate) fn connection(&self) -> RtcPeerConnection {
        self.connection.clone()
    }

    /// Run `step` in the background and report its failure unless the
    /// connection was closed meanwhile.
    fn spawn_step<F>(&self, what: &'static str, step: F)
    where
        F: std::future::Future<Output = crate::Result<()>> + 'static,
    {
        let report = Rc::clone(&self.report);
        let closed = Rc::clone(&self.closed);
        spawn_local(async move {
            if let Err(err) = step.await {
                if !closed.get() {
                    report(PlatformEvent::NegotiationFailed(format!("{what}: {err:?}")));
                }
            }
        });
    }
}

impl PeerConnection for WebPeerConnection {
    fn add_transceiver(
        &mut self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> crate::Result<()> {
        let init: RtcRtpTransceiverInit =
            to_js(&json!({ "direction": direction.as_str() }))?.unchecked_into();
        let _transceiver = self
            .connection
            .add_transceiver_with_str_and_init(kind.as_str(), &init);
        debug!("added {} transceiver ({})", kind.as_str(), direction.as_str());
        Ok(())
    }

    fn create_offer(&mut self) {
        let connection = self.connection.clone();
        let report = Rc::clone(&self.report);
        let closed = Rc::clone(&self.closed);
        spawn_local(async move {
            let result = create_offer(connection).await;
            if closed.get() {
                return;
            }
            match result {
                Ok(offer) => report(PlatformEvent::OfferCreated(offer)),
                Err(err) => report(PlatformEvent::NegotiationFailed(format!(
                    "failed to create offer: {err:?}"
                ))),
            }
        });
    }

    fn set_local_description(&mut self, description: &SessionDescription) -> crate::Result<()> {
        let future = set_local_description(&self.connection, description)?;
        self.spawn_step("failed to set local description", future);
        Ok(())
    }

    fn set_remote_description(&mut self, description: &SessionDescription) -> crate::Result<()> {
        let future = set_remote_description(&self.connection, description)?;
        self.spawn_step("failed to set remote description", future);
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> crate::Result<()> {
        let init: RtcIceCandidateInit = to_js(candidate)?.unchecked_into();
        let candidate = RtcIceCandidate::new(&init).map_err(js_error)?;
        let promise = self
            .connection
            .add_ice_candidate_with_opt_rtc_ice_candidate(Some(&candidate));
        spawn_local(async move {
            if let Err(err) = JsFuture::from(promise).await {
                debug!("remote candidate rejected: {:?}", err);
            }
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.closed.replace(true) {
            return;
        }
        self.connection.set_onicecandidate(None);
        self.connection.set_oniceconnectionstatechange(None);
        self.connection.set_ontrack(None);
        self.connection.close();
        info!("peer connection closed");
    }
}

impl Drop for WebPeerConnection {
    fn drop(&mut self) {
        PeerConnection::close(self);
    }
}

fn ice_connection_state(state: RtcIceConnectionState) -> Option<IceConnectionState> {
    Some(match state {
        RtcIceConnectionState::New => IceConnectionState::New,
        RtcIceConnectionState::Checking => IceConnectionState::Checking,
        RtcIceConnectionState::Connected => IceConnectionState::Connected,
        RtcIceConnectionState::Completed => IceConnectionState::Completed,
        RtcIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RtcIceConnectionState::Failed => IceConnectionState::Failed,
        RtcIceConnectionState::Closed => IceConnectionState::Closed,
        _ => return None,
    })
}

fn description_init(description: &SessionDescription) -> crate::Result<RtcSessionDescriptionInit> {
    Ok(to_js(description)?.unchecked_into())
}

pub(crate) async fn create_offer(
    connection: RtcPeerConnection,
) -> crate::Result<SessionDescription> {
    let offer = JsFuture::from(connection.create_offer())
        .await
        .map_err(js_error)?;
    let sdp = Reflect::get(&offer, &JsValue::from_str("sdp"))
        .map_err(js_error)?
        .as_string()
        .context("created offer has no sdp")?;
    Ok(SessionDescription::offer(sdp))
}

pub(crate) fn set_local_description(
    connection: &RtcPeerConnection,
    description: &SessionDescription,
) -> crate::Result<impl std::future::Future<Output = crate::Result<()>>> {
    let promise = connection.set_local_description(&description_init(description)?);
    Ok(async move {
        JsFuture::from(promise).await.map_err(js_error)?;
        Ok(())
    })
}

pub(crate) fn set_remote_description(
    connection: &RtcPeerConnection,
    description: &SessionDescription,
) -> crate::Result<impl std::future::Future<Output = crate::Result<()>>> {
    let promise = connection.set_remote_description(&description_init(description)?);
    Ok(async move {
        JsFuture::from(promise).await.map_err(js_error)?;
        Ok(())
    })
}
