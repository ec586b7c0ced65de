use crate::request::{
    AntibandingMode, ColorCorrectionMode, EffectMode, FlashSetting, NoiseReductionMode, SceneMode,
    TonemapMode,
};
use std::collections::HashMap;

// Keys are stored upper-case; lookups upper-case the trimmed input.
lazy_static::lazy_static! {
    static ref FLASH_MODES: HashMap<&'static str, FlashSetting> = HashMap::from([
        ("AUTO", FlashSetting::Auto),
        ("OFF", FlashSetting::Off),
        ("SINGLE", FlashSetting::Single),
        ("TORCH", FlashSetting::Torch),
    ]);

    static ref SCENE_MODES: HashMap<&'static str, SceneMode> = HashMap::from([
        ("AUTO", SceneMode::Disabled),
        ("OFF", SceneMode::Disabled),
        ("DISABLED", SceneMode::Disabled),
        ("PORTRAIT", SceneMode::Portrait),
        ("NIGHT", SceneMode::Night),
        ("SPORTS", SceneMode::Sports),
    ]);

    static ref EFFECT_MODES: HashMap<&'static str, EffectMode> = HashMap::from([
        ("NONE", EffectMode::Off),
        ("OFF", EffectMode::Off),
        ("MONO", EffectMode::Mono),
        ("NEGATIVE", EffectMode::Negative),
        ("SEPIA", EffectMode::Sepia),
    ]);

    static ref NOISE_REDUCTION_MODES: HashMap<&'static str, NoiseReductionMode> = HashMap::from([
        ("OFF", NoiseReductionMode::Off),
        ("FAST", NoiseReductionMode::Fast),
        ("HIGH_QUALITY", NoiseReductionMode::HighQuality),
        ("MINIMAL", NoiseReductionMode::Minimal),
    ]);

    static ref TONEMAP_MODES: HashMap<&'static str, TonemapMode> = HashMap::from([
        ("CONTRAST_CURVE", TonemapMode::ContrastCurve),
        ("FAST", TonemapMode::Fast),
        ("HIGH_QUALITY", TonemapMode::HighQuality),
        ("GAMMA_VALUE", TonemapMode::GammaValue),
    ]);

    static ref ANTIBANDING_MODES: HashMap<&'static str, AntibandingMode> = HashMap::from([
        ("OFF", AntibandingMode::Off),
        ("50HZ", AntibandingMode::Hz50),
        ("60HZ", AntibandingMode::Hz60),
        ("AUTO", AntibandingMode::Auto),
    ]);

    static ref COLOR_CORRECTION_MODES: HashMap<&'static str, ColorCorrectionMode> = HashMap::from([
        ("OFF", ColorCorrectionMode::TransformMatrix),
        ("TRANSFORM_MATRIX", ColorCorrectionMode::TransformMatrix),
        ("FAST", ColorCorrectionMode::Fast),
        ("HIGH_QUALITY", ColorCorrectionMode::HighQuality),
    ]);
}

fn lookup<T: Copy>(table: &HashMap<&'static str, T>, text: &str) -> Option<T> {
    table.get(text.trim().to_ascii_uppercase().as_str()).copied()
}

pub fn flash_setting(text: &str) -> Option<FlashSetting> {
    lookup(&FLASH_MODES, text)
}

pub fn scene_mode(text: &str) -> Option<SceneMode> {
    lookup(&SCENE_MODES, text)
}

pub fn effect_mode(text: &str) -> Option<EffectMode> {
    lookup(&EFFECT_MODES, text)
}

pub fn noise_reduction_mode(text: &str) -> Option<NoiseReductionMode> {
    lookup(&NOISE_REDUCTION_MODES, text)
}

pub fn tonemap_mode(text: &str) -> Option<TonemapMode> {
    lookup(&TONEMAP_MODES, text)
}

pub fn antibanding_mode(text: &str) -> Option<AntibandingMode> {
    lookup(&ANTIBANDING_MODES, text)
}

pub fn color_correction_mode(text: &str) -> Option<ColorCorrectionMode> {
    lookup(&COLOR_CORRECTION_MODES, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case_and_padding() {
        assert_eq!(flash_setting(" torch "), Some(FlashSetting::Torch));
        assert_eq!(antibanding_mode("50hz"), Some(AntibandingMode::Hz50));
        assert_eq!(tonemap_mode("Gamma_Value"), Some(TonemapMode::GammaValue));
    }

    #[test]
    fn test_aliases() {
        assert_eq!(scene_mode("AUTO"), Some(SceneMode::Disabled));
        assert_eq!(effect_mode("NONE"), Some(EffectMode::Off));
        assert_eq!(
            color_correction_mode("OFF"),
            Some(ColorCorrectionMode::TransformMatrix)
        );
    }

    #[test]
    fn test_unknown_strings() {
        assert_eq!(flash_setting("STROBE"), None);
        assert_eq!(noise_reduction_mode(""), None);
    }
}
