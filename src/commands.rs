//! Method-call surface for hosts that talk to the controller over a
//! message channel.
//!
//! Arguments and results are `serde_json` values. Each call gets exactly one
//! [`CommandReply`] through its responder; `takePicture` replies once the
//! capture resolves, everything else replies before `dispatch` returns.

use crate::controller::CameraController;
use crate::discovery::camera_settings;
use crate::hardware::CameraBackend;
use crate::session::ApplyOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APPLY_SETTINGS: &str = "applySettings";
pub const SET_ZOOM: &str = "setZoom";
pub const SET_EXPOSURE_COMPENSATION: &str = "setExposureCompensation";
pub const TAKE_PICTURE: &str = "takePicture";
pub const PAUSE_CAMERA: &str = "pauseCamera";
pub const GET_NATIVE_CAMERA_SETTINGS: &str = "getNativeCameraSettings";

/// Error code for failed capability queries.
pub const CAMERA_QUERY_ERROR: &str = "CAM_ERR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.as_object().and_then(|args| args.get(name))
    }

    fn float_argument(&self, name: &str) -> Option<f32> {
        self.argument(name).and_then(Value::as_f64).map(|v| v as f32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandReply {
    Success { result: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl CommandReply {
    pub fn ok() -> Self {
        CommandReply::Success {
            result: Value::Null,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        CommandReply::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type Responder = Box<dyn FnOnce(CommandReply) + Send + 'static>;

/// Route a controller method call.
pub fn dispatch(controller: &CameraController, call: &MethodCall, respond: Responder) {
    log::debug!("method call {}", call.method);
    match call.method.as_str() {
        APPLY_SETTINGS => {
            let empty = Map::new();
            let settings = call.arguments.as_object().unwrap_or(&empty);
            log_outcome(call, controller.apply_settings(settings));
            respond(CommandReply::ok());
        }
        SET_ZOOM => {
            match call.float_argument("zoom") {
                Some(zoom) => log_outcome(call, controller.set_zoom(zoom)),
                None => log::warn!("{} ignored: missing numeric zoom", SET_ZOOM),
            }
            respond(CommandReply::ok());
        }
        SET_EXPOSURE_COMPENSATION => {
            match call.float_argument("exposure") {
                Some(exposure) => log_outcome(call, controller.set_exposure_compensation(exposure)),
                None => log::warn!(
                    "{} ignored: missing numeric exposure",
                    SET_EXPOSURE_COMPENSATION
                ),
            }
            respond(CommandReply::ok());
        }
        TAKE_PICTURE => controller.capture_with(move |result| {
            let reply = match result {
                Ok(location) => CommandReply::Success {
                    result: Value::String(location),
                },
                Err(e) => CommandReply::error(e.code(), e.to_string()),
            };
            respond(reply);
        }),
        PAUSE_CAMERA => {
            controller.pause();
            respond(CommandReply::ok());
        }
        _ => respond(CommandReply::NotImplemented),
    }
}

/// Route a capability query. Works without an open controller.
pub fn dispatch_settings(backend: &dyn CameraBackend, call: &MethodCall) -> CommandReply {
    if call.method != GET_NATIVE_CAMERA_SETTINGS {
        return CommandReply::NotImplemented;
    }

    let device_id = match call.argument("cameraId") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return CommandReply::error(CAMERA_QUERY_ERROR, "missing cameraId"),
    };

    match camera_settings(backend, &device_id) {
        Ok(range) => match serde_json::to_value(range) {
            Ok(result) => CommandReply::Success { result },
            Err(e) => CommandReply::error(CAMERA_QUERY_ERROR, e.to_string()),
        },
        Err(e) => CommandReply::error(CAMERA_QUERY_ERROR, e.to_string()),
    }
}

fn log_outcome(call: &MethodCall, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied { revision, ignored } => {
            for err in &ignored {
                log::warn!("{}: {}", call.method, err);
            }
            log::debug!("{} applied (revision {})", call.method, revision);
        }
        ApplyOutcome::Dropped => log::debug!("{} dropped, not streaming", call.method),
        ApplyOutcome::Failed(e) => log::warn!("{} failed: {}", call.method, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{VirtualBackend, VirtualDeviceSpec};
    use serde_json::json;

    #[test]
    fn test_settings_query() {
        let backend = VirtualBackend::new(vec![VirtualDeviceSpec::rear("0")]);
        let reply = dispatch_settings(
            &backend,
            &MethodCall::new(GET_NATIVE_CAMERA_SETTINGS, json!({ "cameraId": "0" })),
        );
        assert_eq!(
            reply,
            CommandReply::Success {
                result: json!({
                    "minExposureCompensation": -12,
                    "maxExposureCompensation": 12,
                    "minZoom": 1.0,
                    "maxZoom": 8.0,
                })
            }
        );
    }

    #[test]
    fn test_settings_query_errors() {
        let backend = VirtualBackend::new(vec![VirtualDeviceSpec::rear("0")]);
        let unknown = dispatch_settings(
            &backend,
            &MethodCall::new(GET_NATIVE_CAMERA_SETTINGS, json!({ "cameraId": "5" })),
        );
        assert!(matches!(unknown, CommandReply::Error { ref code, .. } if code == "CAM_ERR"));

        let other = dispatch_settings(&backend, &MethodCall::new("listCameras", Value::Null));
        assert_eq!(other, CommandReply::NotImplemented);
    }

    #[test]
    fn test_reply_serialization() {
        let value = serde_json::to_value(CommandReply::error("BUSY", "capture already in progress"))
            .unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "BUSY");
    }
}
