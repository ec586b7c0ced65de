use crate::geometry::center_region;
use crate::types::{MeteringRegion, Rect};

/// Parse a metering-region string against the active array.
///
/// Accepts `full`, `center`, or `x,y,w,h` quadruples separated by `;`.
/// Any malformed quadruple rejects the whole string.
pub fn parse_regions(text: &str, active_array: Rect) -> Option<Vec<MeteringRegion>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.eq_ignore_ascii_case("full") {
        return Some(vec![MeteringRegion::max_weight(active_array)]);
    }
    if trimmed.eq_ignore_ascii_case("center") {
        return Some(vec![MeteringRegion::max_weight(center_region(active_array))]);
    }

    trimmed
        .split(';')
        .map(parse_quadruple)
        .collect::<Option<Vec<_>>>()
}

fn parse_quadruple(part: &str) -> Option<MeteringRegion> {
    let nums = part
        .trim()
        .split(',')
        .map(|n| n.trim().parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()?;

    match nums.as_slice() {
        [x, y, w, h] => Some(MeteringRegion::max_weight(Rect::from_xywh(*x, *y, *w, *h))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::METERING_WEIGHT_MAX;

    const ACTIVE: Rect = Rect::new(0, 0, 4000, 3000);

    #[test]
    fn test_full_covers_active_array() {
        let regions = parse_regions("FULL", ACTIVE).unwrap();
        assert_eq!(regions, vec![MeteringRegion::max_weight(ACTIVE)]);
    }

    #[test]
    fn test_center_is_middle_third() {
        let regions = parse_regions("  center ", ACTIVE).unwrap();
        assert_eq!(regions[0].rect, Rect::new(1333, 1000, 2666, 2000));
        assert_eq!(regions[0].weight, METERING_WEIGHT_MAX);
    }

    #[test]
    fn test_quadruples() {
        let regions = parse_regions("10,20,30,40; 0,0,5,5", ACTIVE).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].rect, Rect::new(10, 20, 40, 60));
        assert_eq!(regions[1].rect, Rect::new(0, 0, 5, 5));
    }

    #[test]
    fn test_malformed_rejects_everything() {
        assert_eq!(parse_regions("10,20,30", ACTIVE), None);
        assert_eq!(parse_regions("10,20,30,40;a,b,c,d", ACTIVE), None);
        assert_eq!(parse_regions("10,20,30,40;", ACTIVE), None);
        assert_eq!(parse_regions("   ", ACTIVE), None);
    }
}
