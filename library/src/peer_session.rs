use camview_protocol::{IceCandidate, SdpType, SessionDescription, SignallingPhase};
use log::{debug, info, warn};

use crate::config::TransceiverDirection;
use crate::platform::{ControlChannel, IceConnectionState, MediaKind, PeerConnection};
use crate::signalling::SignallingConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Local offer is being created
    Offering,
    /// Offer sent, answer not applied yet
    AwaitingAnswer,
    /// Remote description applied
    Negotiated,
    Closed,
}

/// What the owner should make of the step a session just took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Healthy,
    /// The session cannot recover and has to be replaced.
    Fatal(String),
}

/// One peer connection negotiated over a [`SignallingConnection`].
pub struct PeerSession<P> {
    peer: Option<P>,
    state: SessionState,
    /// Remote candidates that arrived before the answer.
    pending_candidates: Vec<IceCandidate>,
    stream_delivered: bool,
}

impl<P: PeerConnection> PeerSession<P> {
    /// Add the video transceiver and request the local offer.
    ///
    /// # Errors
    /// Fails when the transceiver cannot be added; the peer connection is
    /// closed in that case.
    pub fn start(mut peer: P, direction: TransceiverDirection) -> crate::Result<Self> {
        if let Err(err) = peer.add_transceiver(MediaKind::Video, direction) {
            peer.close();
            return Err(err.context("failed to add video transceiver"));
        }
        peer.create_offer();
        debug!("peer session started, creating offer");

        Ok(Self {
            peer: Some(peer),
            state: SessionState::Offering,
            pending_candidates: Vec::new(),
            stream_delivered: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn stream_delivered(&self) -> bool {
        self.stream_delivered
    }

    /// Apply the freshly created offer locally and send it to the server.
    pub fn on_offer_created<C: ControlChannel>(
        &mut self,
        offer: SessionDescription,
        channel: &mut SignallingConnection<C>,
    ) -> SessionStatus {
        let (SessionState::Offering, Some(peer)) = (self.state, self.peer.as_mut()) else {
            debug!("offer completed in state {:?}, dropping it", self.state);
            return SessionStatus::Healthy;
        };
        if let Err(err) = peer.set_local_description(&offer) {
            return SessionStatus::Fatal(format!("failed to set local description: {err:?}"));
        }

        debug!("sending offer");
        channel.send(&offer);
        channel.on_message(SignallingPhase::RemoteDescription);
        self.state = SessionState::AwaitingAnswer;
        SessionStatus::Healthy
    }

    /// Apply the answer. Only the first one counts, later ones are ignored.
    pub fn on_remote_description<C: ControlChannel>(
        &mut self,
        description: SessionDescription,
        channel: &mut SignallingConnection<C>,
    ) -> SessionStatus {
        match self.state {
            SessionState::AwaitingAnswer => {}
            SessionState::Negotiated => {
                debug!("remote description already applied, ignoring duplicate");
                return SessionStatus::Healthy;
            }
            SessionState::Offering => {
                warn!("remote description received before the offer was sent, ignoring it");
                return SessionStatus::Healthy;
            }
            SessionState::Closed => return SessionStatus::Healthy,
        }
        if !matches!(description.sdp_type, SdpType::Answer | SdpType::Pranswer) {
            warn!(
                "expected an answer, got {:?}, ignoring it",
                description.sdp_type
            );
            return SessionStatus::Healthy;
        }
        let Some(peer) = self.peer.as_mut() else {
            return SessionStatus::Healthy;
        };
        if let Err(err) = peer.set_remote_description(&description) {
            return SessionStatus::Fatal(format!("failed to set remote description: {err:?}"));
        }

        info!("remote description applied");
        self.state = SessionState::Negotiated;
        channel.on_message(SignallingPhase::RemoteCandidates);

        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.apply_remote_candidate(&candidate);
        }
        SessionStatus::Healthy
    }

    /// Forward a locally gathered candidate to the server.
    pub fn on_local_candidate<C: ControlChannel>(
        &mut self,
        candidate: Option<IceCandidate>,
        channel: &mut SignallingConnection<C>,
    ) {
        if self.is_closed() {
            return;
        }
        match candidate {
            Some(candidate) if !candidate.is_end_of_candidates() => {
                debug!("sending local candidate {}", candidate.candidate);
                channel.send(&candidate);
            }
            _ => debug!("local ICE gathering complete"),
        }
    }

    /// Add a candidate received from the server. Failures are swallowed since
    /// candidates may legitimately outlive the negotiation they belong to.
    pub fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        if candidate.is_end_of_candidates() {
            debug!("remote ICE gathering complete");
            return;
        }
        match self.state {
            SessionState::Negotiated => self.apply_remote_candidate(&candidate),
            SessionState::Offering | SessionState::AwaitingAnswer => {
                debug!("remote candidate before answer, holding it back");
                self.pending_candidates.push(candidate);
            }
            SessionState::Closed => debug!("session closed, ignoring remote candidate"),
        }
    }

    fn apply_remote_candidate(&mut self, candidate: &IceCandidate) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };
        match peer.add_ice_candidate(candidate) {
            Ok(()) => debug!("added remote candidate {}", candidate.candidate),
            Err(err) => debug!("ignoring remote candidate that failed to apply: {:?}", err),
        }
    }

    pub fn on_ice_connection_state(&mut self, state: IceConnectionState) -> SessionStatus {
        info!("peer connection state: {}", state);
        if !self.is_closed() && state.is_fatal() {
            SessionStatus::Fatal(format!("peer connection {state}"))
        } else {
            SessionStatus::Healthy
        }
    }

    /// Returns the stream of the first track; later tracks yield `None`.
    pub fn on_track<S>(&mut self, kind: MediaKind, stream: S) -> Option<S> {
        debug!("new {} track", kind.as_str());
        if self.is_closed() || self.stream_delivered {
            return None;
        }
        self.stream_delivered = true;
        Some(stream)
    }

    pub fn close(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            debug!("closing peer connection");
            peer.close();
        }
        self.pending_candidates.clear();
        self.state = SessionState::Closed;
    }
}
