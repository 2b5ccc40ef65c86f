use log::debug;
use web_sys::{HtmlVideoElement, MediaStream};

use crate::platform::VideoSink;

/// Shows the received stream in a `<video>` element.
///
/// The element is muted up front, browsers refuse to autoplay audible media.
pub struct VideoElementSink {
    video: HtmlVideoElement,
}

impl VideoElementSink {
    #[must_use]
    pub fn new(video: HtmlVideoElement) -> Self {
        video.set_default_muted(true);
        video.set_muted(true);
        video.set_autoplay(true);
        Self { video }
    }

    #[must_use]
    pub fn video(&self) -> &HtmlVideoElement {
        &self.video
    }
}

impl VideoSink for VideoElementSink {
    type Stream = MediaStream;

    fn attach(&mut self, stream: &MediaStream) {
        debug!("attaching stream {} to video element", stream.id());
        self.video.set_src_object(Some(stream));
    }

    fn detach(&mut self) {
        self.video.set_src_object(None);
    }
}
