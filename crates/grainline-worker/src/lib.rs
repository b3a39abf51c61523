//! Web worker entry point for the grainline execution host.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It owns one [`Host`] backed by an [`OffscreenBackend`] and
//! answers every `postMessage` from the main thread with exactly one
//! message (except `TERMINATE`, which is silent).
//!
//! # Message protocol
//!
//! Requests are plain JS objects:
//! - `type`: `"INIT" | "UPDATE_SETTINGS" | "PROCESS" | "TERMINATE"`
//! - `id`: number, echoed back
//! - `settingsJson`: string, camelCase `ProcessingSettings` (required for
//!   `UPDATE_SETTINGS`, optional for `PROCESS`)
//! - `width`, `height`: numbers (`PROCESS`)
//! - `pixels`: `Uint8Array` of RGBA bytes, or `bitmap`: `ImageBitmap`
//!   (`PROCESS`; pixels win when both are present)
//!
//! Responses:
//! - `{ type: "READY", id, capability: "rawPixels" | "handle" }`
//! - `{ type: "SETTINGS_ACK", id }`
//! - `{ type: "PROCESS_COMPLETE", id, width, height, pixels | bitmap }`
//! - `{ type: "ERROR", id, kind, message }`
//!
//! Pixel buffers and bitmaps travel in the transfer list in both
//! directions, so neither side keeps a copy. Uncaught panics surface on
//! the main thread through the worker's `onerror`.

mod backend;

use std::cell::RefCell;

use grainline_host::{
    ErrorKind, Host, HostError, Output, Payload, ProcessRequest, Request, RequestId, Response,
};
use grainline_pipeline::{PipelineError, ProcessingSettings};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{DedicatedWorkerGlobalScope, ImageBitmap, MessageEvent};

pub use backend::OffscreenBackend;

thread_local! {
    static HOST: RefCell<Host<OffscreenBackend>> = RefCell::new(Host::new(OffscreenBackend::default()));
}

/// Request message type, parsed from the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `INIT`
    Init,
    /// `UPDATE_SETTINGS`
    UpdateSettings,
    /// `PROCESS`
    Process,
    /// `TERMINATE`
    Terminate,
}

impl MessageType {
    /// Parse a wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "INIT" => Some(Self::Init),
            "UPDATE_SETTINGS" => Some(Self::UpdateSettings),
            "PROCESS" => Some(Self::Process),
            "TERMINATE" => Some(Self::Terminate),
            _ => None,
        }
    }
}

/// Parse a `settingsJson` field.
///
/// # Errors
///
/// [`PipelineError::InvalidConfig`] if the JSON does not describe
/// processing settings.
pub fn parse_settings(json: &str) -> Result<ProcessingSettings, PipelineError> {
    serde_json::from_str(json)
        .map_err(|e| PipelineError::InvalidConfig(format!("failed to parse settings: {e}")))
}

/// Worker entry point, called when the WASM module is instantiated.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let global: DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        handle_message(&event.data());
    });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime
}

fn handle_message(data: &JsValue) {
    let id = get(data, "id").and_then(|v| request_id(&v)).unwrap_or(0);
    let request = match decode_request(data, id) {
        Ok(request) => request,
        Err(err) => {
            post(&Response::<ImageBitmap>::error(id, &err));
            return;
        }
    };
    let response = HOST.with(|host| host.borrow_mut().handle(request));
    if let Some(response) = response {
        post(&response);
    }
}

fn decode_request(data: &JsValue, id: RequestId) -> Result<Request<ImageBitmap>, HostError> {
    let name = get(data, "type")
        .and_then(|v| v.as_string())
        .unwrap_or_default();
    let Some(kind) = MessageType::from_wire(&name) else {
        return Err(PipelineError::InvalidConfig(format!("unknown message type {name:?}")).into());
    };

    let settings = get(data, "settingsJson")
        .and_then(|v| v.as_string())
        .map(|json| parse_settings(&json))
        .transpose()?;

    Ok(match kind {
        MessageType::Init => Request::Init { id },
        MessageType::Terminate => Request::Terminate { id },
        MessageType::UpdateSettings => Request::UpdateSettings {
            id,
            settings: settings.ok_or_else(|| {
                PipelineError::InvalidConfig("UPDATE_SETTINGS without settingsJson".to_owned())
            })?,
        },
        MessageType::Process => Request::Process {
            id,
            request: ProcessRequest {
                width: dimension(data, "width"),
                height: dimension(data, "height"),
                settings,
                payload: payload(data),
            },
        },
    })
}

fn payload(data: &JsValue) -> Payload<ImageBitmap> {
    if let Some(pixels) = get(data, "pixels").and_then(|v| v.dyn_into::<js_sys::Uint8Array>().ok()) {
        return Payload::Pixels(pixels.to_vec());
    }
    if let Some(bitmap) = get(data, "bitmap").and_then(|v| v.dyn_into::<ImageBitmap>().ok()) {
        return Payload::Handle(bitmap);
    }
    Payload::Empty
}

fn get(data: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(data, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn request_id(value: &JsValue) -> Option<RequestId> {
    value
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as RequestId)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(data: &JsValue, key: &str) -> u32 {
    get(data, key)
        .and_then(|v| v.as_f64())
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map_or(0, |n| n as u32)
}

/// Post a response back to the main thread, transferring any pixel
/// buffer or bitmap.
fn post(response: &Response<ImageBitmap>) {
    let message = js_sys::Object::new();
    let transfer = js_sys::Array::new();
    let set = |key: &str, val: &JsValue| {
        let _ = js_sys::Reflect::set(&message, &JsValue::from_str(key), val);
    };

    #[allow(clippy::cast_precision_loss)]
    let id = JsValue::from_f64(response.id() as f64);
    set("type", &JsValue::from_str(response.name()));
    set("id", &id);

    match response {
        Response::Ready { capability, .. } => {
            let capability = serde_json::to_value(capability)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            set("capability", &JsValue::from_str(&capability));
        }
        Response::SettingsAck { .. } => {}
        Response::ProcessComplete {
            width,
            height,
            output,
            ..
        } => {
            set("width", &JsValue::from_f64(f64::from(*width)));
            set("height", &JsValue::from_f64(f64::from(*height)));
            match output {
                Output::Pixels(surface) => {
                    let pixels = js_sys::Uint8Array::from(surface.as_raw());
                    transfer.push(&pixels.buffer());
                    set("pixels", &pixels);
                }
                Output::Handle(bitmap) => {
                    transfer.push(bitmap);
                    set("bitmap", bitmap);
                }
            }
        }
        Response::Error { kind, message: text, .. } => {
            set("kind", &JsValue::from_str(kind.as_str()));
            set("message", &JsValue::from_str(text));
        }
    }

    let Ok(global) = js_sys::global().dyn_into::<DedicatedWorkerGlobalScope>() else {
        return;
    };
    if let Err(err) = global.post_message_with_transfer(&message, &transfer) {
        web_sys::console::error_2(&JsValue::from_str("grainline-worker: postMessage failed"), &err);
        // Report the failure itself so the caller is not left waiting.
        let fallback = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&fallback, &"type".into(), &"ERROR".into());
        let _ = js_sys::Reflect::set(&fallback, &"id".into(), &id);
        let _ = js_sys::Reflect::set(&fallback, &"kind".into(), &ErrorKind::WorkerFault.as_str().into());
        let _ = js_sys::Reflect::set(&fallback, &"message".into(), &"postMessage failed".into());
        let _ = global.post_message(&fallback);
    }
}
