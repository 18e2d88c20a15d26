//! Coordinates the geometry components for uploads and segment re-slicing.

pub mod deadline;
pub mod reslice;
pub mod stage;
pub mod upload;

use crate::config::PipelineSettings;
use crate::store::{BlobStore, TraceStore};

pub struct Ingestor<'a> {
    store: &'a dyn TraceStore,
    blobs: Option<&'a dyn BlobStore>,
    settings: PipelineSettings,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a dyn TraceStore, settings: PipelineSettings) -> Self {
        Self {
            store,
            blobs: None,
            settings,
        }
    }

    /// Archive raw uploads in `blobs` once they have been ingested.
    pub fn with_blob_store(mut self, blobs: &'a dyn BlobStore) -> Self {
        self.blobs = Some(blobs);
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::archive::extractor::{tests::build_kmz, RouteDocument};

    /// KML of a straight highway on the equator from longitude 0 to 0.29, plus `markers` km
    /// posts named "KM 0", "KM 1", ... placed every 0.01 degrees along it.
    pub(crate) fn highway_kml(line_points: usize, markers: usize) -> String {
        let mut placemarks = String::new();
        if line_points >= 2 {
            let coords: Vec<String> = (0..line_points)
                .map(|index| format!("{},0,0", 0.29 * index as f64 / (line_points - 1) as f64))
                .collect();
            placemarks.push_str(&format!(
                "<Placemark><name>Eixo</name><LineString><coordinates>{}</coordinates></LineString></Placemark>",
                coords.join(" ")
            ));
        }
        for km in 0..markers {
            placemarks.push_str(&format!(
                "<Placemark><name>KM {km}</name><Point><coordinates>{},0,0</coordinates></Point></Placemark>",
                km as f64 * 0.01
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><kml xmlns="http://www.opengis.net/kml/2.2"><Document>{placemarks}</Document></kml>"#
        )
    }

    pub(crate) fn route_kmz(line_points: usize, markers: usize) -> RouteDocument {
        let kml = highway_kml(line_points, markers);
        RouteDocument::new("route.kmz", build_kmz(&[("doc.kml", kml.as_str())]))
    }
}
