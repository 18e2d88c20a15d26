use once_cell::sync::Lazy;
use regex::Regex;

use crate::geofile::feature::{RouteFeature, RouteGeometry};

/// Optional "KM" prefix, a number with dot or comma decimals, and an optional "+meters" suffix.
static KM_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:km\s*)?(\d+(?:[.,]\d+)?)(?:\s*\+\s*(\d{3}))?")
        .expect("km label pattern is valid")
});

/// A named point marking a kilometer position along the highway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmMarker {
    pub coord: geo::Coord,
    pub km: f64,
}

/// Parse the kilometer encoded in a point label such as `"KM 112"`, `"Km 112.5"`, `"112,5"`
/// or `"km 112+500"`.
pub fn parse_km(label: &str) -> Option<f64> {
    let captures = KM_LABEL.captures(label)?;
    let km: f64 = captures.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let meters = match captures.get(2) {
        Some(meters) => meters.as_str().parse::<f64>().ok()? / 1000.0,
        None => 0.0,
    };
    Some(km + meters)
}

/// Collect every point feature whose name encodes a km, sorted ascending by km.
///
/// The sort is stable, so markers sharing a km keep their document order.
pub fn index_km_markers(features: &[RouteFeature]) -> Vec<KmMarker> {
    let mut markers: Vec<KmMarker> = features
        .iter()
        .filter_map(|feature| match &feature.geometry {
            Some(RouteGeometry::Point(coord)) => Some(KmMarker {
                coord: *coord,
                km: parse_km(&feature.name()?)?,
            }),
            _ => None,
        })
        .collect();
    markers.sort_by(|left, right| left.km.total_cmp(&right.km));
    log::debug!("Indexed {} km markers", markers.len());
    markers
}
