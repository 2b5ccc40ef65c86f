//! Test suite for the Web and headless browsers.

#![cfg(target_arch = "wasm32")]

use camview::web::{CamView, VideoElementSink, WhepView};
use camview::{CamViewConfig, Endpoint, SupervisorState, VideoSink};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{HtmlVideoElement, MediaStream};

wasm_bindgen_test_configure!(run_in_browser);

// nothing listens here, connecting fails right away
const UNREACHABLE: &str = "ws://127.0.0.1:9/ws";

fn video() -> HtmlVideoElement {
    web_sys::window()
        .and_then(|window| window.document())
        .unwrap()
        .create_element("video")
        .unwrap()
        .dyn_into()
        .unwrap()
}

#[wasm_bindgen_test]
fn empty_url_shows_nothing() {
    assert!(CamView::from_url("", video()).unwrap().is_none());
    assert!(WhepView::from_url("  ", video()).unwrap().is_none());
}

#[wasm_bindgen_test]
fn whep_view_needs_http_endpoint() {
    assert!(WhepView::from_url(UNREACHABLE, video()).is_err());
}

#[wasm_bindgen_test]
fn whep_view_stops_more_than_once() {
    let config = CamViewConfig::new(Endpoint::parse("http://127.0.0.1:9/cam1/whep").unwrap());
    let view = WhepView::new(&config, video()).unwrap();
    view.stop();
    view.stop();
    drop(view);
}

#[wasm_bindgen_test]
fn cam_view_connects_and_stops() {
    let config = CamViewConfig::new(Endpoint::parse(UNREACHABLE).unwrap());
    let view = CamView::new(&config, video());
    assert!(matches!(
        view.state(),
        Some(SupervisorState::Connecting | SupervisorState::Restarting)
    ));

    view.stop();
    assert_eq!(view.state(), Some(SupervisorState::Stopped));
}

#[wasm_bindgen_test]
fn video_sink_mutes_and_attaches() {
    let element = video();
    let mut sink = VideoElementSink::new(element.clone());
    assert!(element.muted());
    assert!(element.default_muted());

    let stream = MediaStream::new().unwrap();
    sink.attach(&stream);
    assert!(element.src_object().is_some());
    sink.detach();
    assert!(element.src_object().is_none());
}
