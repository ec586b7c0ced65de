//! Preview sizing, zoom cropping and exposure clamping.
//!
//! Everything here is a pure function of a `DeviceCapabilities` snapshot
//! (or pieces of it) and the caller's request.

use crate::types::{ExposureRange, Rect, Size};

/// Used when the device advertises no preview sizes.
pub const DEFAULT_PREVIEW_SIZE: Size = Size::new(1280, 720);

/// Pick the candidate whose area is closest to the target area.
///
/// Ties resolve to the earliest candidate. A zero target dimension falls back
/// to the matching dimension of [`DEFAULT_PREVIEW_SIZE`].
pub fn choose_preview_size(candidates: &[Size], target_width: u32, target_height: u32) -> Size {
    let wanted = Size::new(
        if target_width > 0 {
            target_width
        } else {
            DEFAULT_PREVIEW_SIZE.width
        },
        if target_height > 0 {
            target_height
        } else {
            DEFAULT_PREVIEW_SIZE.height
        },
    );
    let wanted_area = wanted.area();

    candidates
        .iter()
        .copied()
        .min_by_key(|candidate| candidate.area().abs_diff(wanted_area))
        .unwrap_or(DEFAULT_PREVIEW_SIZE)
}

/// Clamp a zoom factor into `[1.0, max_zoom]`.
pub fn clamp_zoom(zoom: f32, max_zoom: f32) -> f32 {
    let upper = if max_zoom.is_finite() && max_zoom > 1.0 {
        max_zoom
    } else {
        1.0
    };
    if !zoom.is_finite() {
        return 1.0;
    }
    zoom.max(1.0).min(upper)
}

/// Centred crop of the active array for the given zoom factor.
pub fn compute_zoom_rect(active_array: Rect, zoom: f32, max_zoom: f32) -> Rect {
    let zoom = clamp_zoom(zoom, max_zoom);
    let width = active_array.width();
    let height = active_array.height();
    let crop_width = (width as f32 / zoom) as i32;
    let crop_height = (height as f32 / zoom) as i32;
    let left = active_array.left + (width - crop_width) / 2;
    let top = active_array.top + (height - crop_height) / 2;

    Rect::new(left, top, left + crop_width, top + crop_height)
}

/// Round half-up to the nearest step, then clamp into the device range.
pub fn compute_exposure_compensation(requested: f32, range: ExposureRange) -> i32 {
    let rounded = if requested.is_finite() {
        (requested as f64 + 0.5).floor()
    } else {
        0.0
    };
    let (low, high) = if range.min <= range.max {
        (range.min, range.max)
    } else {
        (range.max, range.min)
    };
    (rounded.clamp(low as f64, high as f64)) as i32
}

/// Middle third of the active array by width and height.
pub fn center_region(active_array: Rect) -> Rect {
    let width = active_array.width() / 3;
    let height = active_array.height() / 3;
    let left = active_array.left + (active_array.width() - width) / 2;
    let top = active_array.top + (active_array.height() - height) / 2;

    Rect::new(left, top, left + width, top + height)
}

/// JPEG orientation for a still capture, normalised to `[0, 360)`.
pub fn jpeg_orientation(sensor_orientation: i32, display_rotation: i32) -> i32 {
    (sensor_orientation as i64 + display_rotation as i64).rem_euclid(360) as i32
}
