/*!
Frames exchanged over the viewer's control channel.

Every frame is a JSON text message. The server opens with the list of ICE
servers, the viewer answers with its offer, the server replies with the
answer and from then on both sides trickle ICE candidates. Frames carry no
type tag, so the receiving side interprets them according to the
[`SignallingPhase`] it is in.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One or many URLs of a single ICE server, as browsers accept both forms.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceUrls {
    /// `"urls": "stun:example.org"`
    One(String),
    /// `"urls": ["stun:example.org", "turn:example.org"]`
    Many(Vec<String>),
}

impl IceUrls {
    /// Iterate over all contained URLs.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let urls: &[String] = match self {
            Self::One(url) => std::slice::from_ref(url),
            Self::Many(urls) => urls,
        };
        urls.iter().map(String::as_str)
    }
}

/// Descriptor of a STUN or TURN server.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server address(es)
    pub urls: IceUrls,
    /// TURN user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Server without credentials, typically STUN.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: IceUrls::One(url.into()),
            username: None,
            credential: None,
        }
    }

    /// Attach TURN credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// ICE servers announced by the media server, the first frame of every session.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceServerList(pub Vec<IceServer>);

impl IceServerList {
    /// Number of servers in the list
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the server asked for host candidates only
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the servers
    pub fn iter(&self) -> std::slice::Iter<'_, IceServer> {
        self.0.iter()
    }
}

impl From<Vec<IceServer>> for IceServerList {
    fn from(servers: Vec<IceServer>) -> Self {
        Self(servers)
    }
}

/// Kind of a session description.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Local proposal
    Offer,
    /// Provisional answer
    Pranswer,
    /// Final answer
    Answer,
    /// Revert to the last stable state
    Rollback,
}

/// `{ "type": ..., "sdp": ... }`, the shape `RTCSessionDescription` serializes to.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Opaque negotiation payload
    pub sdp: String,
}

impl SessionDescription {
    /// Local offer carrying `sdp`
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Remote answer carrying `sdp`
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A network path proposal, the shape `RTCIceCandidate` serializes to.
///
/// An empty `candidate` marks the end of candidate gathering.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// `candidate:` attribute line
    #[serde(default)]
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    /// ICE user fragment of the generating agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Candidate with a media line index, the way browsers report them.
    #[must_use]
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_m_line_index: index,
            username_fragment: None,
        }
    }

    /// `true` for the end-of-candidates marker
    #[must_use]
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Which inbound frame the viewer expects next.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SignallingPhase {
    /// Waiting for the ICE server list
    IceServers,
    /// Peer connection is building its offer, nothing is expected from the server
    LocalOffer,
    /// Offer was sent, waiting for the answer
    RemoteDescription,
    /// Answer applied, only candidates are expected
    RemoteCandidates,
}

/// An inbound frame interpreted in the context of a [`SignallingPhase`].
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// ICE servers to build the peer connection with
    IceServers(IceServerList),
    /// Answer to the offer
    RemoteDescription(SessionDescription),
    /// Remote candidate to add to the peer connection
    RemoteCandidate(IceCandidate),
    /// Remote side finished gathering
    EndOfCandidates,
    /// Description received after the remote one was already applied
    DuplicateDescription(SessionDescription),
    /// Frame received while nothing was expected
    Unexpected(String),
}

impl SignallingPhase {
    /// Interpret `text` as the frame this phase expects.
    ///
    /// # Errors
    /// Fails when the frame is not valid JSON or does not have the shape
    /// expected in this phase.
    pub fn decode(self, text: &str) -> Result<InboundMessage, serde_json::Error> {
        match self {
            Self::IceServers => serde_json::from_str(text).map(InboundMessage::IceServers),
            Self::LocalOffer => Ok(InboundMessage::Unexpected(text.to_owned())),
            Self::RemoteDescription => {
                let value: Value = serde_json::from_str(text)?;
                if is_description(&value) {
                    serde_json::from_value(value).map(InboundMessage::RemoteDescription)
                } else {
                    decode_candidate(value)
                }
            }
            Self::RemoteCandidates => {
                let value: Value = serde_json::from_str(text)?;
                if is_description(&value) {
                    serde_json::from_value(value).map(InboundMessage::DuplicateDescription)
                } else {
                    decode_candidate(value)
                }
            }
        }
    }
}

fn is_description(value: &Value) -> bool {
    value.get("sdp").is_some() && value.get("type").is_some()
}

fn decode_candidate(value: Value) -> Result<InboundMessage, serde_json::Error> {
    if value.is_null() {
        return Ok(InboundMessage::EndOfCandidates);
    }
    let candidate: IceCandidate = serde_json::from_value(value)?;
    if candidate.is_end_of_candidates() {
        Ok(InboundMessage::EndOfCandidates)
    } else {
        Ok(InboundMessage::RemoteCandidate(candidate))
    }
}
