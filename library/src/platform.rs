/*!
The seam between the connection logic and the environment it runs in.

The supervisor drives a [`Platform`] and never touches a socket or a peer
connection directly. Operations that complete later (the channel opening, an
offer being created, a track arriving, a timer firing) are reported back as
[`PlatformEvent`]s through the [`EventSender`](crate::EventSender) the
platform was built with, tagged with the [`Attempt`] they belong to.
*/

use std::fmt::{Display, Formatter};
use std::time::Duration;

use camview_protocol::{IceCandidate, IceServerList, SessionDescription};

use crate::config::{Endpoint, TransceiverDirection};

/// Identifies one connection attempt; bumped on every (re)start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempt(u64);

impl Attempt {
    #[must_use]
    pub const fn new(inner: u64) -> Self {
        Self(inner)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl Display for Attempt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token of a scheduled restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn new(inner: u64) -> Self {
        Self(inner)
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Mirror of `RTCIceConnectionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// States after which the session is given up and the viewer restarts.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl Display for IceConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Something that happened on a channel or peer connection of an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent<S> {
    ChannelOpened,
    ChannelMessage(String),
    ChannelError,
    ChannelClosed,
    OfferCreated(SessionDescription),
    /// An asynchronous negotiation step (offer creation, applying a description) failed.
    NegotiationFailed(String),
    /// `None` once local gathering is complete.
    LocalCandidate(Option<IceCandidate>),
    IceConnectionState(IceConnectionState),
    Track {
        kind: MediaKind,
        stream: S,
    },
}

/// Outbound half of a control channel.
pub trait ControlChannel {
    /// Transmit one text frame.
    ///
    /// # Errors
    /// Fails when the transport refuses the frame.
    fn send_text(&mut self, text: &str) -> crate::Result<()>;

    /// Close the transport and stop delivering its events. Must be idempotent.
    fn close(&mut self);
}

/// A peer connection owned by a [`PeerSession`](crate::PeerSession).
pub trait PeerConnection {
    /// # Errors
    /// Fails when the transceiver cannot be created.
    fn add_transceiver(
        &mut self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> crate::Result<()>;

    /// Start building a local offer; completes with
    /// [`PlatformEvent::OfferCreated`] or [`PlatformEvent::NegotiationFailed`].
    fn create_offer(&mut self);

    /// # Errors
    /// Fails when the description is rejected synchronously.
    fn set_local_description(&mut self, description: &SessionDescription) -> crate::Result<()>;

    /// # Errors
    /// Fails when the description is rejected synchronously.
    fn set_remote_description(&mut self, description: &SessionDescription) -> crate::Result<()>;

    /// # Errors
    /// Fails when the candidate is rejected synchronously.
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> crate::Result<()>;

    /// Release the connection and stop delivering its events. Must be idempotent.
    fn close(&mut self);
}

/// Factory for channels, peer connections and restart timers.
pub trait Platform {
    /// Inbound media stream handed to the [`VideoSink`].
    type Stream;
    type Channel: ControlChannel;
    type Peer: PeerConnection;

    /// Begin connecting to `endpoint`; completion is reported as
    /// [`PlatformEvent::ChannelOpened`] or [`PlatformEvent::ChannelClosed`].
    ///
    /// # Errors
    /// Fails when the connection cannot even be attempted.
    fn open_channel(&mut self, endpoint: &Endpoint, attempt: Attempt)
        -> crate::Result<Self::Channel>;

    /// # Errors
    /// Fails when the peer connection cannot be constructed.
    fn create_peer(
        &mut self,
        ice_servers: &IceServerList,
        attempt: Attempt,
    ) -> crate::Result<Self::Peer>;

    /// Report `timer` back through the event sender after `delay`.
    ///
    /// # Errors
    /// Fails when no timer could be armed; `timer` will then never fire.
    fn schedule_restart(&mut self, timer: TimerId, delay: Duration) -> crate::Result<()>;

    fn cancel_restart(&mut self, timer: TimerId);
}

/// The UI side: something a received stream can be shown in.
pub trait VideoSink {
    type Stream;

    fn attach(&mut self, stream: &Self::Stream);

    /// The stream passed to the last `attach` is no longer valid.
    fn detach(&mut self);
}
