/*!
Envelopes exchanged between the signaling server and a camera publisher.

Viewers speak the plain [`control`](crate::control) protocol; the server tags
whatever a viewer sends with the viewer's id before handing it to the
publisher, and strips the tag from the publisher's replies.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ViewerId;

/// Messages the signaling server sends to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToPublisher {
    /// A viewer connected and received the ICE server list
    ViewerJoined {
        /// The new viewer
        viewer: ViewerId,
    },
    /// A viewer went away, its peer connection can be dropped
    ViewerLeft {
        /// The departed viewer
        viewer: ViewerId,
    },
    /// Control frame sent by a viewer, passed on without modifications
    Signal {
        /// Sender
        viewer: ViewerId,
        /// Offer or ICE candidate
        payload: Value,
    },
}

/// Messages the publisher sends to the signaling server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FromPublisher {
    /// Control frame for a viewer, passed on without modifications
    Signal {
        /// Recipient
        viewer: ViewerId,
        /// Answer or ICE candidate
        payload: Value,
    },
    /// Disconnect a viewer, e.g. because its negotiation failed
    CloseViewer {
        /// Viewer to disconnect
        viewer: ViewerId,
    },
}
