use serde::Deserialize;

use crate::error::IngestError;
use crate::geofile::feature::{RouteFeature, RouteGeometry};
use crate::ingest::deadline::Deadline;

const KEPT_PROPERTIES: [&str; 2] = ["name", "description"];

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OptimizeParams {
    /// Decimal places kept on every coordinate component. 6 places is roughly 0.11 m.
    pub precision: u32,
    /// Geometries with more points than this are decimated.
    pub max_line_points: usize,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            precision: 6,
            max_line_points: 1000,
        }
    }
}

/// Shrink an uploaded feature list before it is persisted.
///
/// Only points and (multi) line strings survive, coordinates are rounded to
/// `params.precision` decimals, long lines are decimated and all properties besides `name`
/// and `description` are dropped. Lines left with fewer than two points are dropped too.
/// Input order is kept. Applying this twice gives the same result as applying it once.
///
/// `deadline` is checked before every feature.
pub fn optimize_features(
    features: &[RouteFeature],
    params: &OptimizeParams,
    deadline: &Deadline,
) -> Result<Vec<RouteFeature>, IngestError> {
    let mut optimized = Vec::with_capacity(features.len());
    for feature in features {
        deadline.check("optimization")?;
        optimized.extend(optimize_feature(feature, params));
    }
    if optimized.len() != features.len() {
        log::info!(
            "Out of {} features, {} were kept after optimization.",
            features.len(),
            optimized.len()
        );
    }
    Ok(optimized)
}

fn optimize_feature(feature: &RouteFeature, params: &OptimizeParams) -> Option<RouteFeature> {
    let geometry = match feature.geometry.as_ref()? {
        RouteGeometry::Point(coord) => RouteGeometry::Point(round_coord(coord, params.precision)),
        RouteGeometry::LineString(line) => {
            let rounded = round_line(line, params.precision);
            if rounded.0.len() < 2 {
                log::debug!("Dropping line with {} points", rounded.0.len());
                return None;
            }
            RouteGeometry::LineString(decimate(&rounded, params.max_line_points))
        }
        RouteGeometry::MultiLineString(lines) => {
            let parts: Vec<geo::LineString> = lines
                .iter()
                .map(|line| round_line(line, params.precision))
                .filter(|line| line.0.len() >= 2)
                .collect();
            if parts.is_empty() {
                log::debug!("Dropping multi line without any usable part");
                return None;
            }
            RouteGeometry::MultiLineString(geo::MultiLineString::new(decimate_parts(
                &parts,
                params.max_line_points,
            )))
        }
        other => {
            log::debug!("Dropping {} feature", other.type_name());
            return None;
        }
    };
    let properties = feature
        .properties
        .iter()
        .filter(|(key, _)| KEPT_PROPERTIES.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Some(RouteFeature {
        geometry: Some(geometry),
        properties,
    })
}

fn round_line(line: &geo::LineString, precision: u32) -> geo::LineString {
    line.coords()
        .map(|coord| round_coord(coord, precision))
        .collect()
}

pub fn round_coord(coord: &geo::Coord, precision: u32) -> geo::Coord {
    geo::Coord {
        x: round_to(coord.x, precision),
        y: round_to(coord.y, precision),
    }
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Keep every Nth point, with `N = ceil(len / max_points)`, so that at most `max_points`
/// remain. The original first and last points are always kept.
pub fn decimate(line: &geo::LineString, max_points: usize) -> geo::LineString {
    let max_points = max_points.max(2);
    let count = line.0.len();
    if count <= max_points {
        return line.clone();
    }
    let step = (count + max_points - 1) / max_points;
    let mut kept: Vec<geo::Coord> = line.0.iter().step_by(step).copied().collect();
    let last_index = count - 1;
    if last_index % step != 0 {
        // Replace rather than append when the budget is used up, so a second pass is a no-op.
        if kept.len() >= max_points {
            kept.pop();
        }
        kept.push(line.0[last_index]);
    }
    geo::LineString::new(kept)
}

/// Decimate the parts of a multi line so that their total point count stays within
/// `max_points`. Each part gets a share of the budget proportional to its size and keeps its
/// own first and last point.
pub fn decimate_parts(parts: &[geo::LineString], max_points: usize) -> Vec<geo::LineString> {
    let total: usize = parts.iter().map(|part| part.0.len()).sum();
    if total <= max_points {
        return parts.to_vec();
    }
    parts
        .iter()
        .map(|part| decimate(part, part.0.len() * max_points / total))
        .collect()
}
