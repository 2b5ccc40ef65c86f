use camview_protocol::{InboundMessage, SignallingPhase};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::Endpoint;
use crate::platform::{Attempt, ControlChannel, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// The control channel to a media server.
///
/// Inbound frames are interpreted according to the current
/// [`SignallingPhase`]; the phase is switched with [`Self::on_message`] at the
/// exact moment the negotiation advances, so a frame is never read with the
/// rules of the previous step.
pub struct SignallingConnection<C> {
    channel: Option<C>,
    state: ChannelState,
    phase: SignallingPhase,
}

impl<C: ControlChannel> SignallingConnection<C> {
    /// Start connecting to `endpoint`. A platform that cannot even attempt the
    /// connection yields a connection that is already closed; retrying is up
    /// to the owner.
    pub fn open<P>(platform: &mut P, endpoint: &Endpoint, attempt: Attempt) -> Self
    where
        P: Platform<Channel = C>,
    {
        info!("connecting to {} (attempt {})", endpoint, attempt);
        match platform.open_channel(endpoint, attempt) {
            Ok(channel) => Self::new(channel),
            Err(err) => {
                warn!("failed to open control channel to {}: {:?}", endpoint, err);
                Self {
                    channel: None,
                    state: ChannelState::Closed,
                    phase: SignallingPhase::IceServers,
                }
            }
        }
    }

    /// Wrap a channel that is still connecting.
    pub fn new(channel: C) -> Self {
        Self {
            channel: Some(channel),
            state: ChannelState::Connecting,
            phase: SignallingPhase::IceServers,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    pub fn phase(&self) -> SignallingPhase {
        self.phase
    }

    pub fn mark_open(&mut self) {
        if self.state == ChannelState::Connecting {
            debug!("control channel is open");
            self.state = ChannelState::Open;
        }
    }

    /// The transport went away on its own.
    pub fn mark_closed(&mut self) {
        self.channel = None;
        self.state = ChannelState::Closed;
    }

    /// Select how the next inbound frames are interpreted.
    pub fn on_message(&mut self, phase: SignallingPhase) {
        debug!("signalling phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Send `message` as a JSON text frame. Outside of the open state this
    /// only leaves a warning behind.
    pub fn send<T: Serialize + ?Sized>(&mut self, message: &T) {
        let (ChannelState::Open, Some(channel)) = (self.state, self.channel.as_mut()) else {
            warn!("control channel is not open ({:?}), dropping outbound message", self.state);
            return;
        };
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                error!("failed to serialize control message: {:?}", err);
                return;
            }
        };
        if let Err(err) = channel.send_text(&text) {
            warn!("failed to send control message: {:?}", err);
        }
    }

    /// Interpret an inbound frame according to the current phase.
    pub fn dispatch(&self, text: &str) -> Option<InboundMessage> {
        if self.state == ChannelState::Closed {
            debug!("control channel closed, ignoring inbound frame");
            return None;
        }
        match self.phase.decode(text) {
            Ok(InboundMessage::Unexpected(frame)) => {
                warn!("ignoring frame received during {:?}: {}", self.phase, frame);
                None
            }
            Ok(message) => Some(message),
            Err(err) => {
                warn!("failed to decode frame in {:?} phase: {}", self.phase, err);
                None
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            debug!("closing control channel");
            channel.close();
        }
        self.state = ChannelState::Closed;
    }
}
