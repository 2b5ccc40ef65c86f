//! Relays control frames between camera publishers and the viewers watching
//! them. Each viewer is handed the configured ICE servers as its first frame
//! and afterwards speaks the plain viewer control protocol; the publisher
//! sees the same frames wrapped in envelopes carrying the viewer id.

pub mod config;
pub mod relay;
pub mod router;
