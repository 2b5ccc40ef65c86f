use log::{debug, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CloseEvent, MediaStream, MessageEvent, WebSocket};

use crate::config::Endpoint;
use crate::handle::EventSender;
use crate::platform::{Attempt, ControlChannel, PlatformEvent};
use crate::web::js_error;

/// Control channel backed by a browser `WebSocket`.
///
/// Owns its event handlers; they are unregistered on close so that a socket
/// which is still shutting down cannot call into freed closures.
pub struct WebSocketChannel {
    websocket: WebSocket,
    closed: bool,
    _on_open: Closure<dyn FnMut(JsValue)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(JsValue)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl WebSocketChannel {
    pub(crate) fn open(
        endpoint: &Endpoint,
        attempt: Attempt,
        events: &EventSender<MediaStream>,
    ) -> crate::Result<Self> {
        let websocket = WebSocket::new(endpoint.as_str()).map_err(js_error)?;

        let on_open = {
            let events = events.clone();
            Closure::wrap(Box::new(move |_| {
                events.send(attempt, PlatformEvent::ChannelOpened);
            }) as Box<dyn FnMut(JsValue)>)
        };
        let on_message = {
            let events = events.clone();
            Closure::wrap(Box::new(move |event: MessageEvent| {
                match event.data().as_string() {
                    Some(text) => events.send(attempt, PlatformEvent::ChannelMessage(text)),
                    None => debug!("ignoring binary frame on control channel"),
                }
            }) as Box<dyn FnMut(MessageEvent)>)
        };
        let on_error = {
            let events = events.clone();
            Closure::wrap(Box::new(move |_| {
                warn!("control channel error");
                events.send(attempt, PlatformEvent::ChannelError);
            }) as Box<dyn FnMut(JsValue)>)
        };
        let on_close = {
            let events = events.clone();
            Closure::wrap(Box::new(move |event: CloseEvent| {
                debug!(
                    "control channel closed with code {}: {}",
                    event.code(),
                    event.reason()
                );
                events.send(attempt, PlatformEvent::ChannelClosed);
            }) as Box<dyn FnMut(CloseEvent)>)
        };

        websocket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        websocket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        websocket.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        websocket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        Ok(Self {
            websocket,
            closed: false,
            _on_open: on_open,
            _on_message: on_message,
            _on_error: on_error,
            _on_close: on_close,
        })
    }
}

impl ControlChannel for WebSocketChannel {
    fn send_text(&mut self, text: &str) -> crate::Result<()> {
        self.websocket.send_with_str(text).map_err(js_error)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.websocket.set_onopen(None);
        self.websocket.set_onmessage(None);
        self.websocket.set_onerror(None);
        self.websocket.set_onclose(None);
        if let Err(err) = self.websocket.close() {
            debug!("closing websocket failed: {:?}", err);
        }
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        ControlChannel::close(self);
    }
}
