use camview_protocol::{IceServerList, InboundMessage, SignallingPhase};
use log::{debug, error, info, warn};

use crate::config::{Endpoint, SessionOptions, TransceiverDirection};
use crate::peer_session::{PeerSession, SessionStatus};
use crate::platform::{Attempt, Platform, PlatformEvent, TimerId, VideoSink};
use crate::restart::{NextRestart, RestartPolicy, StopSignal};
use crate::signalling::{ChannelState, SignallingConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Never started
    Idle,
    /// Control channel is being opened
    Connecting,
    /// Control channel is open, negotiation in progress
    Open,
    /// A stream was handed to the video sink
    Streaming,
    /// Waiting for the restart timer
    Restarting,
    /// Stopped by its owner
    Stopped,
}

/// Keeps one camera connection alive.
///
/// Owns at most one [`SignallingConnection`] and one [`PeerSession`]. Any
/// failure tears both down and schedules a single restart after a fixed
/// delay; [`Self::stop`] cancels everything for good.
///
/// Every platform event carries the [`Attempt`] that produced it and is
/// dropped here unless it belongs to the live attempt, so late callbacks of
/// torn down connections never reach the components.
pub struct ReconnectSupervisor<P: Platform, V> {
    platform: P,
    sink: V,
    direction: TransceiverDirection,
    endpoint: Option<Endpoint>,
    state: SupervisorState,
    policy: RestartPolicy,
    signalling: Option<SignallingConnection<P::Channel>>,
    session: Option<PeerSession<P::Peer>>,
    stream_attached: bool,
    tearing_down: bool,
}

impl<P, V> ReconnectSupervisor<P, V>
where
    P: Platform,
    V: VideoSink<Stream = P::Stream>,
{
    pub fn new(platform: P, sink: V, options: SessionOptions) -> Self {
        Self {
            platform,
            sink,
            direction: options.direction,
            endpoint: None,
            state: SupervisorState::Idle,
            policy: RestartPolicy::new(options.restart_delay),
            signalling: None,
            session: None,
            stream_attached: false,
            tearing_down: false,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn attempt(&self) -> Attempt {
        self.policy.attempt()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn has_pending_restart(&self) -> bool {
        self.policy.has_pending_restart()
    }

    /// `true` while a control channel or peer connection exists.
    pub fn is_live(&self) -> bool {
        self.signalling.is_some() || self.session.is_some()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.policy.stop_signal()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn sink(&self) -> &V {
        &self.sink
    }

    /// Connect to `endpoint`, replacing whatever connection exists.
    pub fn start(&mut self, endpoint: Endpoint) {
        self.teardown();
        let pending = self.policy.rearm();
        self.cancel_restart(pending);
        self.endpoint = Some(endpoint);
        self.connect();
    }

    /// Tear everything down and never restart on its own again.
    pub fn stop(&mut self) {
        info!("stopping camera view");
        let pending = self.policy.stop();
        self.cancel_restart(pending);
        self.teardown();
        self.state = SupervisorState::Stopped;
    }

    fn connect(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let attempt = self.policy.begin_attempt();
        self.state = SupervisorState::Connecting;
        let signalling = SignallingConnection::open(&mut self.platform, &endpoint, attempt);
        let refused = signalling.state() == ChannelState::Closed;
        self.signalling = Some(signalling);
        if refused {
            self.fail("control channel could not be opened");
        }
    }

    pub fn handle_event(&mut self, attempt: Attempt, event: PlatformEvent<P::Stream>) {
        if !self.policy.is_current(attempt) || self.signalling.is_none() {
            debug!("dropping event of stale attempt {}", attempt);
            return;
        }

        match event {
            PlatformEvent::ChannelOpened => {
                if let Some(signalling) = self.signalling.as_mut() {
                    signalling.mark_open();
                }
                info!("control channel open");
                self.state = SupervisorState::Open;
            }
            PlatformEvent::ChannelMessage(text) => self.on_channel_message(&text),
            PlatformEvent::ChannelError => self.fail("control channel error"),
            PlatformEvent::ChannelClosed => {
                if let Some(signalling) = self.signalling.as_mut() {
                    signalling.mark_closed();
                }
                self.fail("control channel closed");
            }
            PlatformEvent::OfferCreated(offer) => {
                let status = match (self.session.as_mut(), self.signalling.as_mut()) {
                    (Some(session), Some(signalling)) => {
                        session.on_offer_created(offer, signalling)
                    }
                    _ => SessionStatus::Healthy,
                };
                self.check(status);
            }
            PlatformEvent::NegotiationFailed(reason) => self.fail(&reason),
            PlatformEvent::LocalCandidate(candidate) => {
                if let (Some(session), Some(signalling)) =
                    (self.session.as_mut(), self.signalling.as_mut())
                {
                    session.on_local_candidate(candidate, signalling);
                }
            }
            PlatformEvent::IceConnectionState(state) => {
                let status = self
                    .session
                    .as_mut()
                    .map_or(SessionStatus::Healthy, |session| {
                        session.on_ice_connection_state(state)
                    });
                self.check(status);
            }
            PlatformEvent::Track { kind, stream } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if let Some(stream) = session.on_track(kind, stream) {
                    info!("received {} stream", kind.as_str());
                    self.sink.attach(&stream);
                    self.stream_attached = true;
                    self.state = SupervisorState::Streaming;
                }
            }
        }
    }

    /// The restart timer went off.
    pub fn on_restart_due(&mut self, timer: TimerId) {
        if !self.policy.restart_due(timer) {
            debug!("ignoring restart timer {}", timer.into_inner());
            return;
        }
        info!("restarting camera connection");
        self.connect();
    }

    fn on_channel_message(&mut self, text: &str) {
        let Some(message) = self
            .signalling
            .as_ref()
            .and_then(|signalling| signalling.dispatch(text))
        else {
            return;
        };

        match message {
            InboundMessage::IceServers(ice_servers) => self.create_session(&ice_servers),
            InboundMessage::RemoteDescription(description) => {
                let status = match (self.session.as_mut(), self.signalling.as_mut()) {
                    (Some(session), Some(signalling)) => {
                        session.on_remote_description(description, signalling)
                    }
                    _ => SessionStatus::Healthy,
                };
                self.check(status);
            }
            InboundMessage::RemoteCandidate(candidate) => {
                if let Some(session) = self.session.as_mut() {
                    session.on_remote_candidate(candidate);
                }
            }
            InboundMessage::EndOfCandidates => debug!("server finished sending candidates"),
            InboundMessage::DuplicateDescription(_) => {
                debug!("ignoring repeated remote description");
            }
            InboundMessage::Unexpected(frame) => debug!("ignoring unexpected frame {}", frame),
        }
    }

    fn create_session(&mut self, ice_servers: &IceServerList) {
        if self.session.is_some() {
            warn!("ICE servers received twice, ignoring");
            return;
        }
        info!("received {} ICE server(s)", ice_servers.len());
        if let Some(signalling) = self.signalling.as_mut() {
            signalling.on_message(SignallingPhase::LocalOffer);
        }

        let peer = match self.platform.create_peer(ice_servers, self.policy.attempt()) {
            Ok(peer) => peer,
            Err(err) => {
                self.fail(&format!("failed to create peer connection: {err:?}"));
                return;
            }
        };
        match PeerSession::start(peer, self.direction) {
            Ok(session) => self.session = Some(session),
            Err(err) => self.fail(&format!("failed to start peer session: {err:?}")),
        }
    }

    fn check(&mut self, status: SessionStatus) {
        if let SessionStatus::Fatal(reason) = status {
            self.fail(&reason);
        }
    }

    fn fail(&mut self, reason: &str) {
        if self.tearing_down {
            return;
        }
        warn!("camera connection failed: {}", reason);
        self.teardown();
        self.schedule_restart();
    }

    fn schedule_restart(&mut self) {
        let timer = match self.policy.next_restart() {
            NextRestart::Schedule(timer) => timer,
            NextRestart::Suppressed => {
                debug!("stop requested, not scheduling a restart");
                self.state = SupervisorState::Idle;
                return;
            }
            NextRestart::AlreadyPending => {
                debug!("restart already pending");
                return;
            }
        };
        let delay = self.policy.delay();
        match self.platform.schedule_restart(timer, delay) {
            Ok(()) => {
                info!("restarting in {:?}", delay);
                self.policy.restart_scheduled(timer);
                self.state = SupervisorState::Restarting;
            }
            Err(err) => {
                error!("failed to schedule restart, giving up: {:?}", err);
                self.state = SupervisorState::Idle;
            }
        }
    }

    fn cancel_restart(&mut self, pending: Option<TimerId>) {
        if let Some(timer) = pending {
            debug!("cancelling pending restart");
            self.platform.cancel_restart(timer);
        }
    }

    fn teardown(&mut self) {
        if self.tearing_down {
            return;
        }
        self.tearing_down = true;
        self.policy.end_attempt();
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(mut signalling) = self.signalling.take() {
            signalling.close();
        }
        if self.stream_attached {
            self.sink.detach();
            self.stream_attached = false;
        }
        self.tearing_down = false;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::mock::{recorder, MockPlatform, MockSink, Shared};
    use crate::platform::{IceConnectionState, MediaKind};
    use camview_protocol::SessionDescription;

    type Supervisor = ReconnectSupervisor<MockPlatform, MockSink>;

    fn supervisor() -> (Shared, Supervisor) {
        let recorder = recorder();
        let supervisor = ReconnectSupervisor::new(
            MockPlatform {
                recorder: recorder.clone(),
            },
            MockSink {
                recorder: recorder.clone(),
            },
            SessionOptions::default(),
        );
        (recorder, supervisor)
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("ws://camera.local:8083/stream/1/webrtc").unwrap()
    }

    fn streaming() -> (Shared, Supervisor) {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());
        let attempt = supervisor.attempt();
        supervisor.handle_event(attempt, PlatformEvent::ChannelOpened);
        supervisor.handle_event(
            attempt,
            PlatformEvent::ChannelMessage(r#"[{"urls":"stun:a"}]"#.to_owned()),
        );
        supervisor.handle_event(
            attempt,
            PlatformEvent::OfferCreated(SessionDescription::offer("offer")),
        );
        supervisor.handle_event(
            attempt,
            PlatformEvent::ChannelMessage(r#"{"type":"answer","sdp":"answer"}"#.to_owned()),
        );
        supervisor.handle_event(
            attempt,
            PlatformEvent::Track {
                kind: MediaKind::Video,
                stream: "stream".to_owned(),
            },
        );
        (recorder, supervisor)
    }

    #[test]
    fn start_opens_one_channel() {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());

        assert_eq!(supervisor.state(), SupervisorState::Connecting);
        assert_eq!(recorder.borrow().opened.len(), 1);
        assert!(supervisor.is_live());
        assert!(!supervisor.has_session());
    }

    #[test]
    fn ice_servers_create_exactly_one_session() {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());
        let attempt = supervisor.attempt();
        supervisor.handle_event(attempt, PlatformEvent::ChannelOpened);
        supervisor.handle_event(
            attempt,
            PlatformEvent::ChannelMessage(r#"[{"urls":"stun:a"}]"#.to_owned()),
        );

        assert!(supervisor.has_session());
        assert_eq!(recorder.borrow().peers.len(), 1);
        assert_eq!(recorder.borrow().offers_requested, 1);
    }

    #[test]
    fn first_track_reaches_the_sink() {
        let (recorder, supervisor) = streaming();

        assert_eq!(supervisor.state(), SupervisorState::Streaming);
        assert_eq!(recorder.borrow().attached, ["stream"]);
        assert_eq!(recorder.borrow().sent.len(), 1);
    }

    #[test]
    fn failure_tears_down_and_schedules_one_restart() {
        let (recorder, mut supervisor) = streaming();
        let attempt = supervisor.attempt();

        supervisor.handle_event(
            attempt,
            PlatformEvent::IceConnectionState(IceConnectionState::Disconnected),
        );
        supervisor.handle_event(attempt, PlatformEvent::ChannelClosed);

        assert_eq!(supervisor.state(), SupervisorState::Restarting);
        assert!(!supervisor.is_live());
        let recorder = recorder.borrow();
        assert_eq!(recorder.scheduled.len(), 1);
        assert_eq!(recorder.scheduled[0].1, Duration::from_millis(5000));
        assert_eq!(recorder.peers_closed, 1);
        assert_eq!(recorder.channels_closed, 1);
        assert_eq!(recorder.detached, 1);
    }

    #[test]
    fn restart_timer_reconnects_with_a_new_attempt() {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());
        let first = supervisor.attempt();
        supervisor.handle_event(first, PlatformEvent::ChannelError);
        let timer = recorder.borrow().scheduled[0].0;

        supervisor.on_restart_due(timer);

        assert_eq!(supervisor.state(), SupervisorState::Connecting);
        assert_ne!(supervisor.attempt(), first);
        assert_eq!(recorder.borrow().opened.len(), 2);
        assert!(!supervisor.has_pending_restart());
    }

    #[test]
    fn events_of_previous_attempts_are_ignored() {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());
        let first = supervisor.attempt();
        supervisor.handle_event(first, PlatformEvent::ChannelError);
        let timer = recorder.borrow().scheduled[0].0;
        supervisor.on_restart_due(timer);

        supervisor.handle_event(first, PlatformEvent::ChannelClosed);
        supervisor.handle_event(
            first,
            PlatformEvent::ChannelMessage(r#"[{"urls":"stun:a"}]"#.to_owned()),
        );

        assert_eq!(supervisor.state(), SupervisorState::Connecting);
        assert_eq!(recorder.borrow().scheduled.len(), 1);
        assert!(recorder.borrow().peers.is_empty());
    }

    #[test]
    fn stale_restart_timer_is_ignored() {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());
        supervisor.on_restart_due(TimerId::new(42));
        assert_eq!(recorder.borrow().opened.len(), 1);
    }

    #[test]
    fn refused_channel_schedules_restart_immediately() {
        let (recorder, mut supervisor) = supervisor();
        recorder.borrow_mut().fail_open = true;

        supervisor.start(endpoint());

        assert_eq!(supervisor.state(), SupervisorState::Restarting);
        assert_eq!(recorder.borrow().scheduled.len(), 1);
        assert!(!supervisor.is_live());
    }

    #[test]
    fn failing_peer_creation_restarts() {
        let (recorder, mut supervisor) = supervisor();
        recorder.borrow_mut().fail_peer = true;
        supervisor.start(endpoint());
        let attempt = supervisor.attempt();
        supervisor.handle_event(attempt, PlatformEvent::ChannelOpened);
        supervisor.handle_event(
            attempt,
            PlatformEvent::ChannelMessage(r#"[{"urls":"stun:a"}]"#.to_owned()),
        );

        assert_eq!(supervisor.state(), SupervisorState::Restarting);
        assert_eq!(recorder.borrow().channels_closed, 1);
    }

    #[test]
    fn stop_cancels_pending_restart() {
        let (recorder, mut supervisor) = supervisor();
        supervisor.start(endpoint());
        supervisor.handle_event(supervisor.attempt(), PlatformEvent::ChannelClosed);
        let timer = recorder.borrow().scheduled[0].0;

        supervisor.stop();
        supervisor.on_restart_due(timer);

        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(recorder.borrow().cancelled, [timer]);
        assert_eq!(recorder.borrow().opened.len(), 1);
    }

    #[test]
    fn pending_stop_request_suppresses_restart() {
        let (recorder, mut supervisor) = streaming();
        supervisor.stop_signal().request();

        supervisor.handle_event(supervisor.attempt(), PlatformEvent::ChannelClosed);

        assert!(recorder.borrow().scheduled.is_empty());
        assert!(!supervisor.is_live());
    }

    #[test]
    fn explicit_start_replaces_live_connection() {
        let (recorder, mut supervisor) = streaming();
        supervisor.start(Endpoint::parse("ws://other.local/ws").unwrap());

        let recorder = recorder.borrow();
        assert_eq!(recorder.opened.len(), 2);
        assert_eq!(recorder.channels_closed, 1);
        assert_eq!(recorder.peers_closed, 1);
        assert_eq!(supervisor.state(), SupervisorState::Connecting);
    }

    #[test]
    fn unschedulable_restart_leaves_supervisor_idle() {
        let (recorder, mut supervisor) = streaming();
        recorder.borrow_mut().fail_schedule = true;

        supervisor.handle_event(supervisor.attempt(), PlatformEvent::ChannelError);

        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert!(!supervisor.has_pending_restart());
        assert!(!supervisor.is_live());
        assert!(recorder.borrow().scheduled.is_empty());

        recorder.borrow_mut().fail_schedule = false;
        supervisor.start(endpoint());
        assert_eq!(supervisor.state(), SupervisorState::Connecting);
        assert_eq!(recorder.borrow().opened.len(), 2);
    }

    #[test]
    fn restart_delay_comes_from_options() {
        let recorder = recorder();
        let mut supervisor = ReconnectSupervisor::new(
            MockPlatform {
                recorder: recorder.clone(),
            },
            MockSink {
                recorder: recorder.clone(),
            },
            SessionOptions {
                restart_delay: Duration::from_millis(250),
                direction: TransceiverDirection::Recvonly,
            },
        );
        supervisor.start(endpoint());
        supervisor.handle_event(supervisor.attempt(), PlatformEvent::ChannelClosed);

        assert_eq!(
            recorder.borrow().scheduled[0].1,
            Duration::from_millis(250)
        );
    }
}
