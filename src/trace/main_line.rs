use crate::geofile::feature::{RouteFeature, RouteGeometry};

/// The master trace of a highway together with the feature it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MainLine {
    pub line: geo::LineString,
    pub name: Option<String>,
}

/// Split a geometry into its constituent line strings, descending into collections.
pub fn flatten_lines(geometry: &RouteGeometry) -> Vec<&geo::LineString> {
    match geometry {
        RouteGeometry::LineString(line) => vec![line],
        RouteGeometry::MultiLineString(lines) => lines.iter().collect(),
        RouteGeometry::Collection(parts) => parts.iter().flat_map(flatten_lines).collect(),
        RouteGeometry::Point(_) | RouteGeometry::Other(_) => Vec::new(),
    }
}

/// Pick the line with the most points anywhere in `features`.
///
/// Multi line strings compete through their longest part. Ties go to the first line met.
/// Lines with fewer than two points are not candidates. Returns `None` when no line exists.
pub fn extract_main_line(features: &[RouteFeature]) -> Option<MainLine> {
    let mut best: Option<(&geo::LineString, &RouteFeature)> = None;
    for feature in features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        for line in flatten_lines(geometry) {
            if line.0.len() < 2 {
                continue;
            }
            let is_longer = match best {
                Some((current, _)) => line.0.len() > current.0.len(),
                None => true,
            };
            if is_longer {
                best = Some((line, feature));
            }
        }
    }
    best.map(|(line, feature)| {
        log::debug!("Selected main line with {} points", line.0.len());
        MainLine {
            line: line.clone(),
            name: feature.name(),
        }
    })
}
