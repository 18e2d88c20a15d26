use std::str::FromStr;

use geojson::{FeatureCollection, JsonObject, PointType};
use kml::types::Geometry;
use kml::Kml;

use crate::error::ParseError;

/// Convert KML text into a GeoJSON feature collection, one feature per placemark.
///
/// Placemark `name` and `description` become properties. Placemarks without a geometry are
/// kept with a null geometry; filtering is left to the optimizer.
pub fn kml_to_geojson(kml_text: &str) -> Result<FeatureCollection, ParseError> {
    if !kml_text.trim_start().starts_with('<') {
        return Err(ParseError::MalformedXml(
            "document does not start with an XML element".to_string(),
        ));
    }
    let document: Kml =
        Kml::from_str(kml_text).map_err(|err| ParseError::MalformedXml(err.to_string()))?;

    let mut features = Vec::new();
    collect_placemarks(&document, &mut features);
    log::debug!("Converted {} placemarks from KML", features.len());
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn collect_placemarks(element: &Kml, features: &mut Vec<geojson::Feature>) {
    match element {
        Kml::KmlDocument(document) => document
            .elements
            .iter()
            .for_each(|child| collect_placemarks(child, features)),
        Kml::Document { elements, .. } => elements
            .iter()
            .for_each(|child| collect_placemarks(child, features)),
        Kml::Folder(folder) => folder
            .elements
            .iter()
            .for_each(|child| collect_placemarks(child, features)),
        Kml::Placemark(placemark) => {
            let mut properties = JsonObject::new();
            if let Some(name) = &placemark.name {
                properties.insert("name".to_string(), name.trim().into());
            }
            if let Some(description) = &placemark.description {
                properties.insert("description".to_string(), description.clone().into());
            }
            features.push(geojson::Feature {
                bbox: None,
                geometry: placemark
                    .geometry
                    .as_ref()
                    .and_then(convert_geometry)
                    .map(geojson::Geometry::new),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            });
        }
        _ => {}
    }
}

fn coord_position(coord: &kml::types::Coord) -> PointType {
    vec![coord.x, coord.y]
}

fn convert_geometry(geometry: &Geometry) -> Option<geojson::Value> {
    match geometry {
        Geometry::Point(point) => Some(geojson::Value::Point(coord_position(&point.coord))),
        Geometry::LineString(line) => Some(geojson::Value::LineString(
            line.coords.iter().map(coord_position).collect(),
        )),
        Geometry::LinearRing(ring) => Some(geojson::Value::Polygon(vec![ring
            .coords
            .iter()
            .map(coord_position)
            .collect()])),
        Geometry::Polygon(polygon) => {
            let rings = std::iter::once(&polygon.outer)
                .chain(polygon.inner.iter())
                .map(|ring| ring.coords.iter().map(coord_position).collect())
                .collect();
            Some(geojson::Value::Polygon(rings))
        }
        Geometry::MultiGeometry(multi) => {
            let mut parts: Vec<geojson::Value> = Vec::new();
            flatten_multi_geometry(&multi.geometries, &mut parts);
            merge_parts(parts)
        }
        _ => None,
    }
}

fn flatten_multi_geometry(geometries: &[Geometry], parts: &mut Vec<geojson::Value>) {
    for geometry in geometries {
        match geometry {
            Geometry::MultiGeometry(nested) => flatten_multi_geometry(&nested.geometries, parts),
            other => parts.extend(convert_geometry(other)),
        }
    }
}

/// A multi-geometry made only of lines becomes a MultiLineString, a single part collapses to
/// itself and anything else is kept as a GeometryCollection.
fn merge_parts(mut parts: Vec<geojson::Value>) -> Option<geojson::Value> {
    if parts.len() <= 1 {
        return parts.pop();
    }
    if parts
        .iter()
        .all(|part| matches!(part, geojson::Value::LineString(_)))
    {
        let lines = parts
            .into_iter()
            .filter_map(|part| match part {
                geojson::Value::LineString(line) => Some(line),
                _ => None,
            })
            .collect();
        return Some(geojson::Value::MultiLineString(lines));
    }
    Some(geojson::Value::GeometryCollection(
        parts.into_iter().map(geojson::Geometry::new).collect(),
    ))
}
