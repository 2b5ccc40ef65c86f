use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Name of a camera feed, the `:camera_id` segment of the relay routes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    /// Wrap a route segment
    #[must_use]
    pub const fn new(name: String) -> Self {
        Self(name)
    }
}

impl Display for CameraId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number the signaling server gives each connected viewer, used by the
/// publisher to address its replies.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct ViewerId(u64);

impl ViewerId {
    /// Wrap a viewer number
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }
}

impl Display for ViewerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}
