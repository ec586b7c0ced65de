//! Property tests for geometry and settings decoding.

use camgent::geometry::{
    choose_preview_size, clamp_zoom, compute_exposure_compensation, compute_zoom_rect,
    jpeg_orientation,
};
use camgent::params::decode_settings;
use camgent::params::regions::parse_regions;
use camgent::types::{DeviceCapabilities, DeviceCharacteristics, ExposureRange};
use camgent::{Rect, Size};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn caps() -> DeviceCapabilities {
    DeviceCapabilities::from_characteristics(
        "0",
        DeviceCharacteristics {
            active_array: Some(Rect::new(0, 0, 4000, 3000)),
            max_digital_zoom: Some(8.0),
            exposure_compensation_range: Some(ExposureRange::new(-12, 12)),
            ..Default::default()
        },
    )
}

proptest! {
    #[test]
    fn prop_zoom_rect_inside_active_array(
        width in 1i32..10_000,
        height in 1i32..10_000,
        zoom in -10.0f32..50.0,
        max_zoom in 0.5f32..20.0,
    ) {
        let active = Rect::new(0, 0, width, height);
        let rect = compute_zoom_rect(active, zoom, max_zoom);
        prop_assert!(rect.left >= 0 && rect.top >= 0);
        prop_assert!(rect.right <= width && rect.bottom <= height);
        prop_assert!(rect.width() <= width && rect.height() <= height);
    }

    #[test]
    fn prop_zoom_clamped(zoom in any::<f32>(), max_zoom in any::<f32>()) {
        let z = clamp_zoom(zoom, max_zoom);
        prop_assert!(z >= 1.0);
        prop_assert!(z.is_finite());
    }

    #[test]
    fn prop_exposure_within_range(requested in any::<f32>(), a in -50i32..50, b in -50i32..50) {
        let value = compute_exposure_compensation(requested, ExposureRange::new(a, b));
        prop_assert!(value >= a.min(b) && value <= a.max(b));
    }

    #[test]
    fn prop_orientation_normalised(sensor in any::<i32>(), display in any::<i32>()) {
        let degrees = jpeg_orientation(sensor, display);
        prop_assert!((0..360).contains(&degrees));
    }

    #[test]
    fn prop_preview_size_is_a_candidate(
        sizes in prop::collection::vec((1u32..5000, 1u32..5000), 1..8),
        w in 0u32..5000,
        h in 0u32..5000,
    ) {
        let candidates: Vec<Size> = sizes.iter().map(|&(w, h)| Size::new(w, h)).collect();
        let chosen = choose_preview_size(&candidates, w, h);
        prop_assert!(candidates.contains(&chosen));
    }

    #[test]
    fn prop_region_parser_never_panics(text in ".{0,64}") {
        let _ = parse_regions(&text, Rect::new(0, 0, 4000, 3000));
    }

    #[test]
    fn prop_quadruples_round_trip(quads in prop::collection::vec((0i32..4000, 0i32..3000, 1i32..500, 1i32..500), 1..5)) {
        let text = quads
            .iter()
            .map(|(x, y, w, h)| format!("{},{},{},{}", x, y, w, h))
            .collect::<Vec<_>>()
            .join(";");
        let regions = parse_regions(&text, Rect::new(0, 0, 4000, 3000)).unwrap();
        prop_assert_eq!(regions.len(), quads.len());
        for (region, (x, y, w, h)) in regions.iter().zip(&quads) {
            prop_assert_eq!(region.rect, Rect::from_xywh(*x, *y, *w, *h));
        }
    }

    #[test]
    fn prop_jpeg_quality_clamped(quality in -1000i64..1000) {
        let mut settings = Map::new();
        settings.insert("JPEG_QUALITY".into(), json!(quality));
        let decoded = decode_settings(&settings, &caps());
        let q = decoded.delta.jpeg_quality.unwrap();
        prop_assert!((1..=100).contains(&q));
    }

    #[test]
    fn prop_decoding_arbitrary_strings_never_panics(key in "[A-Z_]{1,32}", value in ".{0,16}") {
        let mut settings = Map::new();
        settings.insert(key, Value::String(value));
        let _ = decode_settings(&settings, &caps());
    }
}
