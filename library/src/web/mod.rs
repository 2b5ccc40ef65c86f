/*!
Browser backend built on `web-sys`.

[`CamView`] shows a camera that talks the JSON control protocol over a
WebSocket, [`WhepView`] one that is played back through WHEP. Both keep
retrying with a fixed pause until they are stopped or dropped.
*/

use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::debug;
use serde::Serialize;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{HtmlVideoElement, MediaStream};

use camview_protocol::IceServerList;

use crate::config::{CamViewConfig, Endpoint};
use crate::handle::{CamViewHandle, EventSender};
use crate::platform::{Attempt, Platform, TimerId};
use crate::supervisor::SupervisorState;

mod channel;
mod peer;
mod video;
mod whep;

pub use channel::WebSocketChannel;
pub use peer::WebPeerConnection;
pub use video::VideoElementSink;
pub use whep::WhepView;

/// Install the panic hook and route `log` output to the browser console.
pub fn init_logging(level: log::Level) {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(level));
}

pub(crate) fn js_error(error: JsValue) -> anyhow::Error {
    match error.as_string() {
        Some(message) => anyhow!(message),
        None => anyhow!("{:?}", error),
    }
}

/// Turn `value` into a plain JS object through its JSON representation.
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> crate::Result<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(js_error)
}

fn delay_millis(delay: Duration) -> i32 {
    i32::try_from(delay.as_millis()).unwrap_or(i32::MAX)
}

/// Run `callback` once after `delay`; returns the `clearTimeout` handle.
pub(crate) fn set_timeout(delay: Duration, callback: impl FnOnce() + 'static) -> crate::Result<i32> {
    let window = web_sys::window().context("no window")?;
    let callback = Closure::once_into_js(callback);
    window
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.unchecked_ref(),
            delay_millis(delay),
        )
        .map_err(js_error)
}

pub(crate) fn clear_timeout(handle: i32) {
    if let Some(window) = web_sys::window() {
        window.clear_timeout_with_handle(handle);
    }
}

/// [`Platform`] running in a browser window.
pub struct WebPlatform {
    events: EventSender<MediaStream>,
    pending_timeout: Option<(TimerId, i32)>,
}

impl WebPlatform {
    #[must_use]
    pub fn new(events: EventSender<MediaStream>) -> Self {
        Self {
            events,
            pending_timeout: None,
        }
    }
}

impl Platform for WebPlatform {
    type Stream = MediaStream;
    type Channel = WebSocketChannel;
    type Peer = WebPeerConnection;

    fn open_channel(
        &mut self,
        endpoint: &Endpoint,
        attempt: Attempt,
    ) -> crate::Result<Self::Channel> {
        WebSocketChannel::open(endpoint, attempt, &self.events)
    }

    fn create_peer(
        &mut self,
        ice_servers: &IceServerList,
        attempt: Attempt,
    ) -> crate::Result<Self::Peer> {
        let events = self.events.clone();
        WebPeerConnection::new(
            ice_servers,
            Rc::new(move |event| events.send(attempt, event)),
        )
    }

    fn schedule_restart(&mut self, timer: TimerId, delay: Duration) -> crate::Result<()> {
        let events = self.events.clone();
        let handle = set_timeout(delay, move || events.restart_due(timer))?;
        self.pending_timeout = Some((timer, handle));
        Ok(())
    }

    fn cancel_restart(&mut self, timer: TimerId) {
        match self.pending_timeout {
            Some((pending, handle)) if pending == timer => {
                clear_timeout(handle);
                self.pending_timeout = None;
            }
            _ => debug!("restart timer {} is not pending", timer.into_inner()),
        }
    }
}

impl Drop for WebPlatform {
    fn drop(&mut self) {
        if let Some((timer, _)) = self.pending_timeout {
            self.cancel_restart(timer);
        }
    }
}

/// Live view of a camera served over the WebSocket control protocol.
///
/// Starts connecting on construction; dropping it stops everything.
pub struct CamView {
    handle: CamViewHandle<WebPlatform, VideoElementSink>,
}

impl CamView {
    #[must_use]
    pub fn new(config: &CamViewConfig, video: HtmlVideoElement) -> Self {
        let handle = CamViewHandle::new(
            config.options(),
            VideoElementSink::new(video),
            WebPlatform::new,
        );
        handle.start(config.endpoint.clone());
        Self { handle }
    }

    /// `Ok(None)` for an empty address, meaning there is nothing to show.
    ///
    /// # Errors
    /// Fails for addresses that are not valid endpoints.
    pub fn from_url(url: &str, video: HtmlVideoElement) -> crate::Result<Option<Self>> {
        if url.trim().is_empty() {
            return Ok(None);
        }
        let config = CamViewConfig::new(Endpoint::parse(url)?);
        Ok(Some(Self::new(&config, video)))
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    #[must_use]
    pub fn state(&self) -> Option<SupervisorState> {
        self.handle.state()
    }
}

impl Drop for CamView {
    fn drop(&mut self) {
        self.handle.stop();
    }
}
