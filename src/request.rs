//! Typed capture-request parameters and the immutable requests built from them.
//!
//! A `CaptureRequest` is never edited after `build()`. Changing anything on the
//! live stream means folding a delta into a new `PendingRequestState` and
//! building a fresh request from it.

use crate::types::{MeteringRegion, Rect};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlashSetting {
    /// Let auto-exposure fire the flash (AE mode on-auto-flash).
    Auto,
    Off,
    Single,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlashMode {
    Off,
    Single,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SceneMode {
    Disabled,
    Portrait,
    Night,
    Sports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectMode {
    Off,
    Mono,
    Negative,
    Sepia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NoiseReductionMode {
    Off,
    Fast,
    HighQuality,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TonemapMode {
    ContrastCurve,
    Fast,
    HighQuality,
    GammaValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AntibandingMode {
    Off,
    Hz50,
    Hz60,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorCorrectionMode {
    TransformMatrix,
    Fast,
    HighQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AfMode {
    Off,
    ContinuousPicture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AeMode {
    On,
    OnAutoFlash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlMode {
    Auto,
    UseSceneMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

/// Output a request writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutputTarget {
    Preview,
    StillSink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FpsRange {
    pub min: i32,
    pub max: i32,
}

/// RGGB channel gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorGains {
    pub red: f32,
    pub green_even: f32,
    pub green_odd: f32,
    pub blue: f32,
}

/// Every user-adjustable field of a request. `None` means "device default".
///
/// Used both as a delta (fields the caller touched) and as the accumulated
/// state on the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestParameters {
    pub iso: Option<i32>,
    pub exposure_time_ns: Option<i64>,
    pub ae_compensation: Option<i32>,
    pub ae_lock: Option<bool>,
    pub awb_lock: Option<bool>,
    pub flash: Option<FlashSetting>,
    pub scene_mode: Option<SceneMode>,
    pub effect_mode: Option<EffectMode>,
    pub noise_reduction: Option<NoiseReductionMode>,
    pub tonemap: Option<TonemapMode>,
    pub antibanding: Option<AntibandingMode>,
    pub color_correction: Option<ColorCorrectionMode>,
    pub color_gains: Option<ColorGains>,
    pub focus_distance: Option<f32>,
    pub fps_range: Option<FpsRange>,
    pub jpeg_quality: Option<u8>,
    pub af_regions: Option<Vec<MeteringRegion>>,
    pub ae_regions: Option<Vec<MeteringRegion>>,
    pub awb_regions: Option<Vec<MeteringRegion>>,
    pub crop_region: Option<Rect>,
}

macro_rules! overlay_fields {
    ($base:expr, $delta:expr; $($field:ident),+ $(,)?) => {
        RequestParameters {
            $($field: $delta.$field.clone().or_else(|| $base.$field.clone()),)+
        }
    };
}

impl RequestParameters {
    pub fn is_empty(&self) -> bool {
        *self == RequestParameters::default()
    }

    /// Field-wise last-writer-wins merge: set fields in `delta` replace ours.
    pub fn overlay(&self, delta: &RequestParameters) -> RequestParameters {
        overlay_fields!(self, delta;
            iso,
            exposure_time_ns,
            ae_compensation,
            ae_lock,
            awb_lock,
            flash,
            scene_mode,
            effect_mode,
            noise_reduction,
            tonemap,
            antibanding,
            color_correction,
            color_gains,
            focus_distance,
            fps_range,
            jpeg_quality,
            af_regions,
            ae_regions,
            awb_regions,
            crop_region,
        )
    }
}

/// Parameters currently in effect on the repeating stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingRequestState {
    params: RequestParameters,
    revision: u64,
}

impl PendingRequestState {
    pub fn params(&self) -> &RequestParameters {
        &self.params
    }

    /// Number of deltas folded in since the stream started.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn with_delta(&self, delta: &RequestParameters) -> PendingRequestState {
        PendingRequestState {
            params: self.params.overlay(delta),
            revision: self.revision + 1,
        }
    }

    pub fn preview_request(&self) -> CaptureRequest {
        CaptureRequest::builder(RequestTemplate::Preview)
            .target(OutputTarget::Preview)
            .parameters(self.params.clone())
            .build()
    }

    /// Still request aimed only at the frame sink.
    ///
    /// Only JPEG quality and crop carry over from the stream; exposure and
    /// focus stay under auto control for the still.
    pub fn still_request(&self, jpeg_orientation: i32) -> CaptureRequest {
        let params = RequestParameters {
            jpeg_quality: self.params.jpeg_quality,
            crop_region: self.params.crop_region,
            ..Default::default()
        };
        CaptureRequest::builder(RequestTemplate::StillCapture)
            .target(OutputTarget::StillSink)
            .parameters(params)
            .jpeg_orientation(jpeg_orientation)
            .build()
    }
}

/// A fully built, immutable request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureRequest {
    template: RequestTemplate,
    targets: Vec<OutputTarget>,
    af_mode: AfMode,
    ae_mode: AeMode,
    control_mode: ControlMode,
    flash_mode: Option<FlashMode>,
    jpeg_orientation: Option<i32>,
    params: RequestParameters,
}

impl CaptureRequest {
    pub fn builder(template: RequestTemplate) -> CaptureRequestBuilder {
        CaptureRequestBuilder {
            template,
            targets: Vec::new(),
            params: RequestParameters::default(),
            jpeg_orientation: None,
        }
    }

    pub fn template(&self) -> RequestTemplate {
        self.template
    }

    pub fn targets(&self) -> &[OutputTarget] {
        &self.targets
    }

    pub fn af_mode(&self) -> AfMode {
        self.af_mode
    }

    pub fn ae_mode(&self) -> AeMode {
        self.ae_mode
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn flash_mode(&self) -> Option<FlashMode> {
        self.flash_mode
    }

    pub fn jpeg_orientation(&self) -> Option<i32> {
        self.jpeg_orientation
    }

    pub fn params(&self) -> &RequestParameters {
        &self.params
    }
}

/// Builder for [`CaptureRequest`].
///
/// Autofocus is always continuous-picture. AE mode, flash mode and control
/// mode are resolved from the parameters at `build()`.
pub struct CaptureRequestBuilder {
    template: RequestTemplate,
    targets: Vec<OutputTarget>,
    params: RequestParameters,
    jpeg_orientation: Option<i32>,
}

impl CaptureRequestBuilder {
    pub fn target(mut self, target: OutputTarget) -> Self {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    pub fn parameters(mut self, params: RequestParameters) -> Self {
        self.params = params;
        self
    }

    pub fn jpeg_orientation(mut self, degrees: i32) -> Self {
        self.jpeg_orientation = Some(degrees);
        self
    }

    pub fn build(self) -> CaptureRequest {
        let (ae_mode, flash_mode) = match self.params.flash {
            Some(FlashSetting::Auto) => (AeMode::OnAutoFlash, None),
            Some(FlashSetting::Off) => (AeMode::On, Some(FlashMode::Off)),
            Some(FlashSetting::Single) => (AeMode::On, Some(FlashMode::Single)),
            Some(FlashSetting::Torch) => (AeMode::On, Some(FlashMode::Torch)),
            None => (AeMode::On, None),
        };
        let control_mode = if self.params.scene_mode.is_some() {
            ControlMode::UseSceneMode
        } else {
            ControlMode::Auto
        };

        CaptureRequest {
            template: self.template,
            targets: self.targets,
            af_mode: AfMode::ContinuousPicture,
            ae_mode,
            control_mode,
            flash_mode,
            jpeg_orientation: self.jpeg_orientation,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preview_request() {
        let request = PendingRequestState::default().preview_request();
        assert_eq!(request.template(), RequestTemplate::Preview);
        assert_eq!(request.targets(), &[OutputTarget::Preview]);
        assert_eq!(request.af_mode(), AfMode::ContinuousPicture);
        assert_eq!(request.ae_mode(), AeMode::On);
        assert_eq!(request.control_mode(), ControlMode::Auto);
        assert!(request.params().is_empty());
    }

    #[test]
    fn test_overlay_is_last_writer_wins() {
        let base = RequestParameters {
            iso: Some(100),
            ae_lock: Some(true),
            ..Default::default()
        };
        let delta = RequestParameters {
            iso: Some(400),
            jpeg_quality: Some(80),
            ..Default::default()
        };
        let merged = base.overlay(&delta);
        assert_eq!(merged.iso, Some(400));
        assert_eq!(merged.ae_lock, Some(true));
        assert_eq!(merged.jpeg_quality, Some(80));
    }

    #[test]
    fn test_with_delta_returns_new_state() {
        let first = PendingRequestState::default();
        let second = first.with_delta(&RequestParameters {
            iso: Some(200),
            ..Default::default()
        });
        assert_eq!(first.params().iso, None);
        assert_eq!(second.params().iso, Some(200));
        assert_eq!(second.revision(), 1);
    }

    #[test]
    fn test_flash_resolution() {
        let auto = CaptureRequest::builder(RequestTemplate::Preview)
            .parameters(RequestParameters {
                flash: Some(FlashSetting::Auto),
                ..Default::default()
            })
            .build();
        assert_eq!(auto.ae_mode(), AeMode::OnAutoFlash);
        assert_eq!(auto.flash_mode(), None);

        let torch = CaptureRequest::builder(RequestTemplate::Preview)
            .parameters(RequestParameters {
                flash: Some(FlashSetting::Torch),
                ..Default::default()
            })
            .build();
        assert_eq!(torch.ae_mode(), AeMode::On);
        assert_eq!(torch.flash_mode(), Some(FlashMode::Torch));
    }

    #[test]
    fn test_scene_mode_switches_control_mode() {
        let request = CaptureRequest::builder(RequestTemplate::Preview)
            .parameters(RequestParameters {
                scene_mode: Some(SceneMode::Night),
                ..Default::default()
            })
            .build();
        assert_eq!(request.control_mode(), ControlMode::UseSceneMode);
    }

    #[test]
    fn test_still_request_targets_sink_only() {
        let pending = PendingRequestState::default().with_delta(&RequestParameters {
            iso: Some(800),
            jpeg_quality: Some(90),
            crop_region: Some(Rect::new(1000, 750, 3000, 2250)),
            ..Default::default()
        });
        let still = pending.still_request(90);
        assert_eq!(still.template(), RequestTemplate::StillCapture);
        assert_eq!(still.targets(), &[OutputTarget::StillSink]);
        assert_eq!(still.jpeg_orientation(), Some(90));
        assert_eq!(still.af_mode(), AfMode::ContinuousPicture);
        assert_eq!(still.ae_mode(), AeMode::On);
        assert_eq!(still.params().jpeg_quality, Some(90));
        assert_eq!(still.params().iso, None);
        assert!(still.params().crop_region.is_some());
    }
}
