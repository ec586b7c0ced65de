//! Core value types shared by the geometry, request and session layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions of a stream or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangle in sensor coordinates, right/bottom exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Largest weight a metering region may carry.
pub const METERING_WEIGHT_MAX: u32 = 1000;

/// A weighted metering rectangle for AF/AE/AWB regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteringRegion {
    pub rect: Rect,
    pub weight: u32,
}

impl MeteringRegion {
    pub fn max_weight(rect: Rect) -> Self {
        Self {
            rect,
            weight: METERING_WEIGHT_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Back,
    Front,
    External,
}

/// Inclusive exposure-compensation range in device steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureRange {
    pub min: i32,
    pub max: i32,
}

impl ExposureRange {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

impl Default for ExposureRange {
    fn default() -> Self {
        Self::new(-2, 2)
    }
}

/// Raw metadata reported by a backend for one device. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCharacteristics {
    pub facing: Option<LensFacing>,
    pub active_array: Option<Rect>,
    pub max_digital_zoom: Option<f32>,
    pub exposure_compensation_range: Option<ExposureRange>,
    pub sensor_orientation: Option<i32>,
    pub preview_sizes: Vec<Size>,
}

/// Immutable capability snapshot taken once per device selection.
///
/// Zoom rectangles, exposure clamping and preview sizing derive only from
/// this value. Missing metadata is normalised here and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub device_id: String,
    pub facing: Option<LensFacing>,
    pub active_array: Rect,
    pub max_digital_zoom: f32,
    pub exposure_range: ExposureRange,
    pub sensor_orientation: i32,
    pub preview_sizes: Vec<Size>,
}

impl DeviceCapabilities {
    pub fn from_characteristics(device_id: &str, raw: DeviceCharacteristics) -> Self {
        let max_digital_zoom = match raw.max_digital_zoom {
            Some(zoom) if zoom.is_finite() && zoom > 1.0 => zoom,
            _ => 1.0,
        };

        Self {
            device_id: device_id.to_string(),
            facing: raw.facing,
            active_array: raw.active_array.unwrap_or_default(),
            max_digital_zoom,
            exposure_range: raw.exposure_compensation_range.unwrap_or_default(),
            sensor_orientation: raw.sensor_orientation.unwrap_or(0),
            preview_sizes: raw.preview_sizes,
        }
    }
}
