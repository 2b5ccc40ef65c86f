use std::cell::RefCell;
use std::rc::{Rc, Weak};

use anyhow::Context;
use http::header::{LINK, LOCATION};
use http::{Request, Response};
use log::{debug, error, info, warn};
use serde_json::{json, Map, Value};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{HtmlVideoElement, MediaStream, RequestInit};

use crate::config::{CamViewConfig, Endpoint, TransceiverDirection};
use crate::platform::{Attempt, MediaKind, PeerConnection, PlatformEvent, TimerId, VideoSink};
use crate::restart::{NextRestart, RestartPolicy, StopSignal};
use crate::web::peer::{self, Report, WebPeerConnection};
use crate::web::{clear_timeout, js_error, set_timeout, to_js, VideoElementSink};
use crate::whep::WhepNegotiator;

/// Bail out of a negotiation step whose attempt is no longer live.
macro_rules! or_stale {
    ($value:expr) => {
        match $value {
            Some(value) => value,
            None => return Ok(()),
        }
    };
}

struct WhepState {
    negotiator: WhepNegotiator,
    policy: RestartPolicy,
    sink: VideoElementSink,
    peer: Option<WebPeerConnection>,
    restart_timeout: Option<(TimerId, i32)>,
    stream_attached: bool,
}

impl WhepState {
    fn open_peer(
        &mut self,
        ice_servers: &camview_protocol::IceServerList,
        report: Report,
    ) -> crate::Result<web_sys::RtcPeerConnection> {
        let mut peer = WebPeerConnection::new(ice_servers, report)?;
        peer.add_transceiver(MediaKind::Video, TransceiverDirection::Recvonly)?;
        peer.add_transceiver(MediaKind::Audio, TransceiverDirection::Recvonly)?;
        let connection = peer.connection();
        self.peer = Some(peer);
        Ok(connection)
    }

    fn teardown(&mut self) {
        self.policy.end_attempt();
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        if let Some(request) = self.negotiator.teardown_request() {
            spawn_local(async move {
                if let Err(err) = fetch(request).await {
                    debug!("failed to delete WHEP session: {:?}", err);
                }
            });
        }
        if self.stream_attached {
            self.sink.detach();
            self.stream_attached = false;
        }
    }

    fn stop(&mut self) {
        if self.policy.is_stopped() {
            return;
        }
        info!("stopping WHEP view");
        self.policy.stop();
        if let Some((_, handle)) = self.restart_timeout.take() {
            clear_timeout(handle);
        }
        self.teardown();
    }
}

/// Live view of a camera played back through WHEP.
///
/// Negotiates with receive-only video and audio transceivers; every failure
/// tears the session down and retries after the configured pause until
/// [`Self::stop`] is called or the view is dropped.
pub struct WhepView {
    state: Rc<RefCell<WhepState>>,
    stop_signal: StopSignal,
}

impl WhepView {
    /// # Errors
    /// Fails unless the endpoint is an `http` or `https` URL.
    pub fn new(config: &CamViewConfig, video: HtmlVideoElement) -> crate::Result<Self> {
        let policy = RestartPolicy::new(config.restart_delay());
        let stop_signal = policy.stop_signal();
        let state = Rc::new(RefCell::new(WhepState {
            negotiator: WhepNegotiator::new(config.endpoint.clone())?,
            policy,
            sink: VideoElementSink::new(video),
            peer: None,
            restart_timeout: None,
            stream_attached: false,
        }));
        connect(&state);
        Ok(Self { state, stop_signal })
    }

    /// `Ok(None)` for an empty address, meaning there is nothing to show.
    ///
    /// # Errors
    /// Fails for addresses that are not `http` or `https` URLs.
    pub fn from_url(url: &str, video: HtmlVideoElement) -> crate::Result<Option<Self>> {
        if url.trim().is_empty() {
            return Ok(None);
        }
        let config = CamViewConfig::new(Endpoint::parse(url)?);
        Self::new(&config, video).map(Some)
    }

    /// Suppresses restarts right away; the teardown runs as soon as the
    /// view is not busy.
    pub fn stop(&self) {
        self.stop_signal.request();
        stop_when_free(&self.state, self.stop_signal.clone());
    }
}

fn stop_when_free(state: &Rc<RefCell<WhepState>>, stop_signal: StopSignal) {
    if let Ok(mut inner) = state.try_borrow_mut() {
        inner.stop();
        stop_signal.acknowledge();
        return;
    }
    debug!("WHEP view busy, stopping once it is free");
    let state = Rc::clone(state);
    spawn_local(async move { stop_when_free(&state, stop_signal) });
}

impl Drop for WhepView {
    fn drop(&mut self) {
        self.stop();
    }
}

fn connect(state: &Rc<RefCell<WhepState>>) {
    let attempt = {
        let mut state = state.borrow_mut();
        let attempt = state.policy.begin_attempt();
        state.negotiator.reset();
        info!("connecting to {} (attempt {})", state.negotiator.endpoint(), attempt);
        attempt
    };
    let weak = Rc::downgrade(state);
    spawn_local(async move {
        if let Err(err) = negotiate(&weak, attempt).await {
            fail(&weak, attempt, &format!("{err:?}"));
        }
    });
}

/// Run `f` on the state if `attempt` is still the live one.
fn with_live<R>(
    state: &Weak<RefCell<WhepState>>,
    attempt: Attempt,
    f: impl FnOnce(&mut WhepState) -> R,
) -> Option<R> {
    let state = state.upgrade()?;
    let mut state = state.try_borrow_mut().ok()?;
    if !state.policy.is_current(attempt) {
        return None;
    }
    Some(f(&mut state))
}

async fn negotiate(state: &Weak<RefCell<WhepState>>, attempt: Attempt) -> crate::Result<()> {
    let request = or_stale!(with_live(state, attempt, |s| s
        .negotiator
        .ice_servers_request()))?;
    let ice_servers = WhepNegotiator::ice_servers_from_response(&fetch(request).await?);

    let report = reporter(state, attempt);
    let connection = or_stale!(with_live(state, attempt, |s| s
        .open_peer(&ice_servers, report)))?;

    let offer = peer::create_offer(connection.clone()).await?;
    peer::set_local_description(&connection, &offer)?.await?;

    let request = or_stale!(with_live(state, attempt, |s| s.negotiator.offer_request(&offer)))?;
    let response = fetch(request).await?;
    let answer = or_stale!(with_live(state, attempt, |s| s.negotiator.on_answer(response)))?;
    peer::set_remote_description(&connection, &answer)?.await?;

    if let Some(request) = or_stale!(with_live(state, attempt, |s| s
        .negotiator
        .flush_candidates()))?
    {
        send_candidates(state, attempt, request);
    }
    info!("WHEP negotiation complete");
    Ok(())
}

fn reporter(state: &Weak<RefCell<WhepState>>, attempt: Attempt) -> Report {
    let state = Weak::clone(state);
    Rc::new(move |event: PlatformEvent<MediaStream>| on_peer_event(&state, attempt, event))
}

fn on_peer_event(
    state: &Weak<RefCell<WhepState>>,
    attempt: Attempt,
    event: PlatformEvent<MediaStream>,
) {
    match event {
        PlatformEvent::LocalCandidate(Some(candidate)) => {
            match with_live(state, attempt, |s| s.negotiator.candidate_request(candidate)) {
                Some(Ok(Some(request))) => send_candidates(state, attempt, request),
                Some(Err(err)) => warn!("failed to prepare local candidate: {:?}", err),
                _ => {}
            }
        }
        PlatformEvent::LocalCandidate(None) => debug!("local ICE gathering complete"),
        PlatformEvent::IceConnectionState(ice_state) => {
            info!("peer connection state: {}", ice_state);
            if ice_state.is_fatal() {
                fail(state, attempt, &format!("peer connection {ice_state}"));
            }
        }
        PlatformEvent::Track { kind, stream } => {
            with_live(state, attempt, |s| {
                debug!("new {} track", kind.as_str());
                if !s.stream_attached {
                    s.sink.attach(&stream);
                    s.stream_attached = true;
                }
            });
        }
        PlatformEvent::NegotiationFailed(reason) => fail(state, attempt, &reason),
        _ => {}
    }
}

fn send_candidates(state: &Weak<RefCell<WhepState>>, attempt: Attempt, request: Request<String>) {
    let state = Weak::clone(state);
    spawn_local(async move {
        let result = match fetch(request).await {
            Ok(response) => WhepNegotiator::on_candidates_response(&response),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            fail(&state, attempt, &format!("failed to send local candidates: {err:?}"));
        }
    });
}

fn fail(state: &Weak<RefCell<WhepState>>, attempt: Attempt, reason: &str) {
    let Some(strong) = state.upgrade() else {
        return;
    };
    let Ok(mut inner) = strong.try_borrow_mut() else {
        debug!("WHEP view busy, handling the failure later");
        let state = Weak::clone(state);
        let reason = reason.to_owned();
        spawn_local(async move { fail(&state, attempt, &reason) });
        return;
    };
    if !inner.policy.fail(attempt) {
        return;
    }
    warn!("WHEP session failed: {}", reason);
    inner.teardown();

    let timer = match inner.policy.next_restart() {
        NextRestart::Schedule(timer) => timer,
        NextRestart::Suppressed => {
            debug!("stop requested, not scheduling a restart");
            return;
        }
        NextRestart::AlreadyPending => return,
    };
    let delay = inner.policy.delay();
    let weak = Weak::clone(state);
    match set_timeout(delay, move || restart_due(&weak, timer)) {
        Ok(handle) => {
            info!("restarting in {:?}", delay);
            inner.policy.restart_scheduled(timer);
            inner.restart_timeout = Some((timer, handle));
        }
        Err(err) => error!("failed to schedule restart, giving up: {:?}", err),
    }
}

fn restart_due(state: &Weak<RefCell<WhepState>>, timer: TimerId) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let restart = {
        let mut inner = state.borrow_mut();
        if inner.restart_timeout.map(|(pending, _)| pending) == Some(timer) {
            inner.restart_timeout = None;
        }
        inner.policy.restart_due(timer)
    };
    if restart {
        connect(&state);
    }
}

/// Issue `request` through the browser's `fetch`.
async fn fetch(request: Request<String>) -> crate::Result<Response<String>> {
    let window = web_sys::window().context("no window")?;
    let (parts, body) = request.into_parts();

    let mut headers = Map::new();
    for (name, value) in &parts.headers {
        headers.insert(name.as_str().to_owned(), Value::String(value.to_str()?.to_owned()));
    }
    let mut init = json!({ "method": parts.method.as_str(), "headers": headers });
    if !body.is_empty() {
        init["body"] = Value::String(body);
    }
    let init: RequestInit = to_js(&init)?.unchecked_into();
    let request = web_sys::Request::new_with_str_and_init(&parts.uri.to_string(), &init)
        .map_err(js_error)?;

    let response: web_sys::Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(js_error)?
        .dyn_into()
        .map_err(js_error)?;

    let mut builder = Response::builder().status(response.status());
    for name in [LINK, LOCATION] {
        if let Some(value) = response.headers().get(name.as_str()).map_err(js_error)? {
            builder = builder.header(name, value);
        }
    }
    let text = JsFuture::from(response.text().map_err(js_error)?)
        .await
        .map_err(js_error)?
        .as_string()
        .unwrap_or_default();
    Ok(builder.body(text)?)
}
