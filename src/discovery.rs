//! Device selection and the read-only capability query.

use crate::errors::{ControllerError, HardwareError};
use crate::hardware::CameraBackend;
use crate::types::{DeviceCapabilities, LensFacing};
use serde::Serialize;

/// Pick the first device facing `preferred`, else the first enumerated one.
///
/// Devices whose characteristics cannot be read are skipped for the facing
/// match but can still be chosen as the fallback.
pub fn select_device(
    backend: &dyn CameraBackend,
    preferred: LensFacing,
) -> Result<String, ControllerError> {
    let ids = backend
        .device_ids()
        .map_err(|e| ControllerError::DeviceUnavailable(e.to_string()))?;

    let matching = ids.iter().find(|id| match backend.characteristics(id) {
        Ok(raw) => raw.facing == Some(preferred),
        Err(e) => {
            log::warn!("skipping device {}: {}", id, e);
            false
        }
    });

    match matching.or_else(|| ids.first()) {
        Some(id) => {
            log::debug!("selected device {} (preferred {:?})", id, preferred);
            Ok(id.clone())
        }
        None => Err(ControllerError::DeviceUnavailable(
            "no camera devices enumerated".to_string(),
        )),
    }
}

/// Exposure and zoom limits reported to hosts before they open a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettingsRange {
    pub min_exposure_compensation: i32,
    pub max_exposure_compensation: i32,
    pub min_zoom: f32,
    pub max_zoom: f32,
}

impl From<&DeviceCapabilities> for CameraSettingsRange {
    fn from(caps: &DeviceCapabilities) -> Self {
        Self {
            min_exposure_compensation: caps.exposure_range.min,
            max_exposure_compensation: caps.exposure_range.max,
            min_zoom: 1.0,
            max_zoom: caps.max_digital_zoom,
        }
    }
}

pub fn camera_settings(
    backend: &dyn CameraBackend,
    device_id: &str,
) -> Result<CameraSettingsRange, HardwareError> {
    let raw = backend.characteristics(device_id)?;
    let caps = DeviceCapabilities::from_characteristics(device_id, raw);
    Ok(CameraSettingsRange::from(&caps))
}
