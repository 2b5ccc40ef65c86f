/*!
Live camera video over `WebRTC` for Rust front-ends compiled to WASM.

# Overview

A camera (or the media server in front of it) is reached through a single
control channel. The viewer receives the ICE servers to use, sends an offer,
gets an answer back and trickles ICE candidates both ways until the first
track arrives and can be shown in a `<video>` element.

The connection logic is independent of the browser: [`ReconnectSupervisor`]
drives a [`Platform`] and restarts everything after a fixed pause whenever the
channel or the peer connection fails, until it is stopped. On `wasm32` the
`web` module provides the browser platform and two ready-made viewers,
`web::CamView` for the WebSocket control protocol and `web::WhepView` for
WHEP endpoints.

```no_run
use camview::{CamViewConfig, Endpoint};

let endpoint = Endpoint::parse("wss://cameras.example.org/stream/1/webrtc")?;
let config = CamViewConfig::new(endpoint);
assert_eq!(config.restart_delay().as_millis(), 5000);
# Ok::<(), camview::Error>(())
```
*/

#![allow(
    clippy::module_name_repetitions,
    clippy::future_not_send, // false positive in WASM (single threaded) context
)]
// clippy WARN level lints
#![warn(
    // missing_docs,
    clippy::cargo,
    clippy::pedantic,
    // clippy::nursery,
    clippy::dbg_macro,
    clippy::unwrap_used,
    clippy::integer_division,
    clippy::large_include_file,
    clippy::map_err_ignore,
    // clippy::missing_docs_in_private_items,
    clippy::panic,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented,
    clippy::unreachable
)]
// clippy WARN level lints, that can be upgraded to DENY if preferred
#![warn(
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    clippy::as_conversions,
    clippy::assertions_on_result_states,
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::default_union_representation,
    clippy::deref_by_slicing,
    clippy::empty_drop,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::filetype_is_file,
    clippy::float_cmp_const,
    clippy::if_then_some_else_none,
    clippy::indexing_slicing,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::pattern_type_mismatch,
    clippy::string_slice,
    clippy::try_err
)]
// clippy DENY level lints, they always have a quick fix that should be preferred
#![deny(
    clippy::wildcard_imports,
    clippy::multiple_inherent_impl,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::self_named_module_files,
    clippy::separated_literal_suffix,
    clippy::shadow_unrelated,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::unnecessary_self_imports,
    clippy::unneeded_field_pattern,
    clippy::unseparated_literal_suffix,
    clippy::verbose_file_reads
)]

pub(crate) mod constants;
mod config;
mod error;
mod handle;
#[cfg(test)]
mod mock;
mod peer_session;
mod platform;
mod restart;
mod signalling;
mod supervisor;
mod uav_list;
#[cfg(target_arch = "wasm32")]
pub mod web;
pub mod whep;

pub use config::{CamViewConfig, Endpoint, SessionOptions, TransceiverDirection};
pub use constants::DEFAULT_RESTART_DELAY;
pub use error::{Error, Result};
pub use handle::{CamViewHandle, EventSender};
pub use peer_session::{PeerSession, SessionState, SessionStatus};
pub use platform::{
    Attempt, ControlChannel, IceConnectionState, MediaKind, PeerConnection, Platform,
    PlatformEvent, TimerId, VideoSink,
};
pub use restart::{NextRestart, RestartPolicy, StopSignal};
pub use signalling::{ChannelState, SignallingConnection};
pub use supervisor::{ReconnectSupervisor, SupervisorState};
pub use uav_list::{FlockChange, UavList, UavSummary};

pub use camview_protocol::{
    IceCandidate, IceServer, IceServerList, SdpType, SessionDescription, SignallingPhase,
};
