/*!
Types shared between the [camview](../camview/index.html) viewer library
and the [camview-signaling-server](../camview_signaling_server/index.html).

The [`control`] module describes the JSON text frames a viewer exchanges with
a media server over its control channel, the [`relay`] module the envelopes
the signaling server uses to talk to the camera-side publisher.
*/

#![warn(missing_docs)]

mod common;
pub mod control;
pub mod relay;

pub use common::{CameraId, ViewerId};
pub use control::{
    IceCandidate, IceServer, IceServerList, IceUrls, InboundMessage, SdpType, SessionDescription,
    SignallingPhase,
};
