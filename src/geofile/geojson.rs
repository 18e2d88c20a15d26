use geojson::{FeatureCollection, PointType};

use super::feature::{RouteFeature, RouteGeometry};

fn position_to_coord(position: &PointType) -> Option<geo::Coord> {
    match position.as_slice() {
        [x, y, ..] => Some(geo::Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn coord_to_position(coord: &geo::Coord) -> PointType {
    vec![coord.x, coord.y]
}

fn positions_to_line(positions: &[PointType]) -> geo::LineString {
    positions.iter().filter_map(position_to_coord).collect()
}

fn line_to_positions(line: &geo::LineString) -> Vec<PointType> {
    line.coords().map(coord_to_position).collect()
}

impl From<&geojson::Value> for RouteGeometry {
    fn from(value: &geojson::Value) -> Self {
        match value {
            geojson::Value::Point(position) => match position_to_coord(position) {
                Some(coord) => RouteGeometry::Point(coord),
                None => RouteGeometry::Other(value.clone()),
            },
            geojson::Value::LineString(positions) => {
                RouteGeometry::LineString(positions_to_line(positions))
            }
            geojson::Value::MultiLineString(lines) => RouteGeometry::MultiLineString(
                geo::MultiLineString::new(lines.iter().map(|line| positions_to_line(line)).collect()),
            ),
            geojson::Value::GeometryCollection(geometries) => RouteGeometry::Collection(
                geometries
                    .iter()
                    .map(|geometry| RouteGeometry::from(&geometry.value))
                    .collect(),
            ),
            _ => RouteGeometry::Other(value.clone()),
        }
    }
}

impl From<&RouteGeometry> for geojson::Value {
    fn from(geometry: &RouteGeometry) -> Self {
        match geometry {
            RouteGeometry::Point(coord) => geojson::Value::Point(coord_to_position(coord)),
            RouteGeometry::LineString(line) => geojson::Value::LineString(line_to_positions(line)),
            RouteGeometry::MultiLineString(lines) => {
                geojson::Value::MultiLineString(lines.iter().map(line_to_positions).collect())
            }
            RouteGeometry::Collection(parts) => geojson::Value::GeometryCollection(
                parts
                    .iter()
                    .map(|part| geojson::Geometry::new(geojson::Value::from(part)))
                    .collect(),
            ),
            RouteGeometry::Other(value) => value.clone(),
        }
    }
}

impl From<&geojson::Feature> for RouteFeature {
    fn from(feature: &geojson::Feature) -> Self {
        Self {
            geometry: feature
                .geometry
                .as_ref()
                .map(|geometry| RouteGeometry::from(&geometry.value)),
            properties: feature.properties.clone().unwrap_or_default(),
        }
    }
}

impl From<&RouteFeature> for geojson::Feature {
    fn from(feature: &RouteFeature) -> Self {
        geojson::Feature {
            bbox: None,
            geometry: feature
                .geometry
                .as_ref()
                .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
            id: None,
            properties: if feature.properties.is_empty() {
                None
            } else {
                Some(feature.properties.clone())
            },
            foreign_members: None,
        }
    }
}

pub fn features_from_collection(collection: &FeatureCollection) -> Vec<RouteFeature> {
    collection.features.iter().map(RouteFeature::from).collect()
}

pub fn collection_from_features(features: &[RouteFeature]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: features.iter().map(geojson::Feature::from).collect(),
        foreign_members: None,
    }
}

/// Size in bytes of the collection once serialized, as it would be persisted.
pub fn encoded_len(collection: &FeatureCollection) -> Result<usize, serde_json::Error> {
    Ok(serde_json::to_vec(collection)?.len())
}
