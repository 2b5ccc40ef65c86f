//! In-memory platform recording everything the core asks of it.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use camview_protocol::{IceCandidate, IceServerList, SessionDescription};

use crate::config::{Endpoint, TransceiverDirection};
use crate::platform::{
    Attempt, ControlChannel, MediaKind, PeerConnection, Platform, TimerId, VideoSink,
};

#[derive(Debug, Default)]
pub struct Recorder {
    pub fail_open: bool,
    pub fail_peer: bool,
    pub fail_remote_description: bool,
    pub fail_candidates: bool,
    pub fail_schedule: bool,

    pub opened: Vec<(Endpoint, Attempt)>,
    pub sent: Vec<String>,
    pub channels_closed: usize,

    pub peers: Vec<IceServerList>,
    pub transceivers: Vec<(MediaKind, TransceiverDirection)>,
    pub offers_requested: usize,
    pub local_descriptions: Vec<SessionDescription>,
    pub remote_descriptions: Vec<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub peers_closed: usize,

    pub scheduled: Vec<(TimerId, Duration)>,
    pub cancelled: Vec<TimerId>,

    pub attached: Vec<String>,
    pub detached: usize,
}

pub type Shared = Rc<RefCell<Recorder>>;

pub fn recorder() -> Shared {
    Rc::new(RefCell::new(Recorder::default()))
}

pub struct MockChannel {
    recorder: Shared,
    closed: bool,
}

impl MockChannel {
    pub fn new(recorder: Shared) -> Self {
        Self {
            recorder,
            closed: false,
        }
    }
}

impl ControlChannel for MockChannel {
    fn send_text(&mut self, text: &str) -> crate::Result<()> {
        if self.closed {
            return Err(anyhow!("channel closed"));
        }
        self.recorder.borrow_mut().sent.push(text.to_owned());
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recorder.borrow_mut().channels_closed += 1;
        }
    }
}

pub struct MockPeer {
    recorder: Shared,
    closed: bool,
}

impl MockPeer {
    pub fn new(recorder: Shared) -> Self {
        Self {
            recorder,
            closed: false,
        }
    }
}

impl PeerConnection for MockPeer {
    fn add_transceiver(
        &mut self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> crate::Result<()> {
        self.recorder.borrow_mut().transceivers.push((kind, direction));
        Ok(())
    }

    fn create_offer(&mut self) {
        self.recorder.borrow_mut().offers_requested += 1;
    }

    fn set_local_description(&mut self, description: &SessionDescription) -> crate::Result<()> {
        self.recorder
            .borrow_mut()
            .local_descriptions
            .push(description.clone());
        Ok(())
    }

    fn set_remote_description(&mut self, description: &SessionDescription) -> crate::Result<()> {
        let mut recorder = self.recorder.borrow_mut();
        if recorder.fail_remote_description {
            return Err(anyhow!("malformed answer"));
        }
        recorder.remote_descriptions.push(description.clone());
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> crate::Result<()> {
        let mut recorder = self.recorder.borrow_mut();
        if recorder.fail_candidates {
            return Err(anyhow!("candidate rejected"));
        }
        recorder.candidates.push(candidate.clone());
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recorder.borrow_mut().peers_closed += 1;
        }
    }
}

pub struct MockPlatform {
    pub recorder: Shared,
}

impl Platform for MockPlatform {
    type Stream = String;
    type Channel = MockChannel;
    type Peer = MockPeer;

    fn open_channel(
        &mut self,
        endpoint: &Endpoint,
        attempt: Attempt,
    ) -> crate::Result<Self::Channel> {
        let mut recorder = self.recorder.borrow_mut();
        if recorder.fail_open {
            return Err(anyhow!("endpoint unreachable"));
        }
        recorder.opened.push((endpoint.clone(), attempt));
        Ok(MockChannel::new(Rc::clone(&self.recorder)))
    }

    fn create_peer(
        &mut self,
        ice_servers: &IceServerList,
        _attempt: Attempt,
    ) -> crate::Result<Self::Peer> {
        let mut recorder = self.recorder.borrow_mut();
        if recorder.fail_peer {
            return Err(anyhow!("peer connection refused"));
        }
        recorder.peers.push(ice_servers.clone());
        Ok(MockPeer::new(Rc::clone(&self.recorder)))
    }

    fn schedule_restart(&mut self, timer: TimerId, delay: Duration) -> crate::Result<()> {
        let mut recorder = self.recorder.borrow_mut();
        if recorder.fail_schedule {
            return Err(anyhow!("no timers available"));
        }
        recorder.scheduled.push((timer, delay));
        Ok(())
    }

    fn cancel_restart(&mut self, timer: TimerId) {
        self.recorder.borrow_mut().cancelled.push(timer);
    }
}

pub struct MockSink {
    pub recorder: Shared,
}

impl VideoSink for MockSink {
    type Stream = String;

    fn attach(&mut self, stream: &String) {
        self.recorder.borrow_mut().attached.push(stream.clone());
    }

    fn detach(&mut self) {
        self.recorder.borrow_mut().detached += 1;
    }
}
