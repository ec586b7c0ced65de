//! Decoding of loosely-typed settings maps into typed request deltas.
//!
//! Decoding never fails as a whole. Each key is handled on its own: unknown
//! keys are skipped, keys with the wrong shape are reported in
//! [`DecodedSettings::ignored`], and enum strings or region strings that do
//! not parse are treated as if the key were absent.

pub mod regions;
pub mod tables;

pub use regions::parse_regions;

use crate::errors::ControllerError;
use crate::geometry::{compute_exposure_compensation, compute_zoom_rect};
use crate::request::{ColorGains, FpsRange, RequestParameters};
use crate::types::{DeviceCapabilities, MeteringRegion};
use serde_json::{Map, Value};

pub const SENSOR_SENSITIVITY: &str = "SENSOR_SENSITIVITY";
pub const SENSOR_EXPOSURE_TIME_NS: &str = "SENSOR_EXPOSURE_TIME_NS";
pub const CONTROL_AE_EXPOSURE_COMPENSATION: &str = "CONTROL_AE_EXPOSURE_COMPENSATION";
pub const CONTROL_AE_LOCK: &str = "CONTROL_AE_LOCK";
pub const CONTROL_AWB_LOCK: &str = "CONTROL_AWB_LOCK";
pub const FLASH_MODE: &str = "FLASH_MODE";
pub const CONTROL_SCENE_MODE: &str = "CONTROL_SCENE_MODE";
pub const CONTROL_EFFECT_MODE: &str = "CONTROL_EFFECT_MODE";
pub const NOISE_REDUCTION_MODE: &str = "NOISE_REDUCTION_MODE";
pub const TONEMAP_MODE: &str = "TONEMAP_MODE";
pub const CONTROL_AE_ANTIBANDING_MODE: &str = "CONTROL_AE_ANTIBANDING_MODE";
pub const COLOR_CORRECTION_MODE: &str = "COLOR_CORRECTION_MODE";
pub const COLOR_CORRECTION_GAINS: &str = "COLOR_CORRECTION_GAINS";
pub const LENS_FOCUS_DISTANCE: &str = "LENS_FOCUS_DISTANCE";
pub const CONTROL_AE_TARGET_FPS_RANGE: &str = "CONTROL_AE_TARGET_FPS_RANGE";
pub const JPEG_QUALITY: &str = "JPEG_QUALITY";
pub const CONTROL_AF_REGIONS: &str = "CONTROL_AF_REGIONS";
pub const CONTROL_AE_REGIONS: &str = "CONTROL_AE_REGIONS";
pub const CONTROL_AWB_REGIONS: &str = "CONTROL_AWB_REGIONS";
pub const ZOOM_RATIO: &str = "ZOOM_RATIO";

/// Result of decoding one settings map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSettings {
    pub delta: RequestParameters,
    /// One `Malformed` entry per key that had the wrong shape.
    pub ignored: Vec<ControllerError>,
}

impl DecodedSettings {
    pub fn from_delta(delta: RequestParameters) -> Self {
        Self {
            delta,
            ignored: Vec::new(),
        }
    }

    pub fn rejected(error: ControllerError) -> Self {
        Self {
            delta: RequestParameters::default(),
            ignored: vec![error],
        }
    }
}

type FieldResult<T> = Result<Option<T>, ControllerError>;

/// Decode a settings map into a request delta against the given device.
pub fn decode_settings(settings: &Map<String, Value>, caps: &DeviceCapabilities) -> DecodedSettings {
    let mut decoded = DecodedSettings::default();

    for (key, value) in settings {
        let outcome = decode_entry(&mut decoded.delta, key, value, caps);
        if let Err(err) = outcome {
            log::warn!("ignoring setting {}: {}", key, err);
            decoded.ignored.push(err);
        }
    }

    decoded
}

fn decode_entry(
    delta: &mut RequestParameters,
    key: &str,
    value: &Value,
    caps: &DeviceCapabilities,
) -> Result<(), ControllerError> {
    match key {
        SENSOR_SENSITIVITY => {
            delta.iso = non_negative(key, number(key, value)?)?.map(|v| v as i32);
        }
        SENSOR_EXPOSURE_TIME_NS => {
            let ns = number(key, value)?.map(|v| v as i64);
            if matches!(ns, Some(ns) if ns <= 0) {
                return Err(ControllerError::malformed(key, "exposure time must be positive"));
            }
            delta.exposure_time_ns = ns;
        }
        CONTROL_AE_EXPOSURE_COMPENSATION => {
            delta.ae_compensation = number(key, value)?
                .map(|v| compute_exposure_compensation(v as f32, caps.exposure_range));
        }
        CONTROL_AE_LOCK => delta.ae_lock = boolean(key, value)?,
        CONTROL_AWB_LOCK => delta.awb_lock = boolean(key, value)?,
        FLASH_MODE => delta.flash = string(key, value)?.and_then(tables::flash_setting),
        CONTROL_SCENE_MODE => delta.scene_mode = string(key, value)?.and_then(tables::scene_mode),
        CONTROL_EFFECT_MODE => {
            delta.effect_mode = string(key, value)?.and_then(tables::effect_mode)
        }
        NOISE_REDUCTION_MODE => {
            delta.noise_reduction = string(key, value)?.and_then(tables::noise_reduction_mode)
        }
        TONEMAP_MODE => delta.tonemap = string(key, value)?.and_then(tables::tonemap_mode),
        CONTROL_AE_ANTIBANDING_MODE => {
            delta.antibanding = string(key, value)?.and_then(tables::antibanding_mode)
        }
        COLOR_CORRECTION_MODE => {
            delta.color_correction = string(key, value)?.and_then(tables::color_correction_mode)
        }
        COLOR_CORRECTION_GAINS => delta.color_gains = color_gains(key, value)?,
        LENS_FOCUS_DISTANCE => {
            delta.focus_distance = non_negative(key, number(key, value)?)?.map(|v| v as f32);
        }
        CONTROL_AE_TARGET_FPS_RANGE => delta.fps_range = fps_range(key, value)?,
        JPEG_QUALITY => {
            delta.jpeg_quality = number(key, value)?.map(|v| (v as i64).clamp(1, 100) as u8);
        }
        CONTROL_AF_REGIONS => delta.af_regions = regions(key, value, caps)?,
        CONTROL_AE_REGIONS => delta.ae_regions = regions(key, value, caps)?,
        CONTROL_AWB_REGIONS => delta.awb_regions = regions(key, value, caps)?,
        ZOOM_RATIO => {
            delta.crop_region = number(key, value)?.map(|zoom| {
                compute_zoom_rect(caps.active_array, zoom as f32, caps.max_digital_zoom)
            });
        }
        other => log::debug!("unknown setting key {}", other),
    }
    Ok(())
}

/// Delta for a standalone zoom change.
pub fn zoom_delta(zoom: f32, caps: &DeviceCapabilities) -> RequestParameters {
    RequestParameters {
        crop_region: Some(compute_zoom_rect(
            caps.active_array,
            zoom,
            caps.max_digital_zoom,
        )),
        ..Default::default()
    }
}

/// Delta for a standalone exposure-compensation change.
pub fn exposure_delta(exposure: f32, caps: &DeviceCapabilities) -> RequestParameters {
    RequestParameters {
        ae_compensation: Some(compute_exposure_compensation(exposure, caps.exposure_range)),
        ..Default::default()
    }
}

fn number(key: &str, value: &Value) -> FieldResult<f64> {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ControllerError::malformed(key, "number out of range")),
        },
        other => Err(shape_error(key, "a number", other)),
    }
}

fn non_negative(key: &str, value: Option<f64>) -> FieldResult<f64> {
    match value {
        Some(v) if v < 0.0 => Err(ControllerError::malformed(key, "must not be negative")),
        v => Ok(v),
    }
}

fn boolean(key: &str, value: &Value) -> FieldResult<bool> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(shape_error(key, "a boolean", other)),
    }
}

fn string<'a>(key: &str, value: &'a Value) -> FieldResult<&'a str> {
    match value {
        Value::String(s) => Ok(Some(s.as_str())),
        other => Err(shape_error(key, "a string", other)),
    }
}

fn numbers(key: &str, value: &Value, len: usize) -> Result<Vec<f64>, ControllerError> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(shape_error(key, "an array", other)),
    };
    if items.len() != len {
        return Err(ControllerError::malformed(
            key,
            format!("expected {} elements, got {}", len, items.len()),
        ));
    }
    items
        .iter()
        .map(|item| number(key, item).map(|v| v.unwrap_or_default()))
        .collect()
}

fn color_gains(key: &str, value: &Value) -> FieldResult<ColorGains> {
    let v = numbers(key, value, 4)?;
    Ok(Some(ColorGains {
        red: v[0] as f32,
        green_even: v[1] as f32,
        green_odd: v[2] as f32,
        blue: v[3] as f32,
    }))
}

fn fps_range(key: &str, value: &Value) -> FieldResult<FpsRange> {
    let v = numbers(key, value, 2)?;
    let range = FpsRange {
        min: v[0] as i32,
        max: v[1] as i32,
    };
    if range.min > range.max {
        return Err(ControllerError::malformed(key, "min exceeds max"));
    }
    Ok(Some(range))
}

fn regions(key: &str, value: &Value, caps: &DeviceCapabilities) -> FieldResult<Vec<MeteringRegion>> {
    let text = string(key, value)?;
    Ok(text.and_then(|text| parse_regions(text, caps.active_array)))
}

fn shape_error(key: &str, expected: &str, found: &Value) -> ControllerError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ControllerError::malformed(key, format!("expected {}, found {}", expected, found))
}
