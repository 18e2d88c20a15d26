use serde::Serialize;

use crate::archive::extractor::{extract_kml, RouteDocument};
use crate::error::{IngestError, SizeError, StoreError, ValidationError};
use crate::geofile::geojson::{collection_from_features, encoded_len, features_from_collection};
use crate::geofile::kml::kml_to_geojson;
use crate::store::HighwayId;
use crate::trace::km_markers::index_km_markers;
use crate::trace::linear_ref::MeasuredLine;
use crate::trace::main_line::extract_main_line;
use crate::trace::optimizer::optimize_features;

use super::deadline::Deadline;
use super::stage::{UploadProgress, UploadStage};
use super::Ingestor;

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub highway_id: HighwayId,
    pub version: u64,
    pub length_km: f64,
    pub feature_count: usize,
    pub main_line_points: usize,
    pub marker_count: usize,
    pub payload_bytes: usize,
    pub blob_url: Option<String>,
    pub stages: Vec<UploadStage>,
}

impl<'a> Ingestor<'a> {
    /// Run an uploaded route file through extraction, conversion, optimization and validation,
    /// then store it as the master trace of `highway_id`.
    ///
    /// Any failure rejects the whole upload and nothing is persisted.
    pub fn ingest_upload(
        &self,
        highway_id: HighwayId,
        document: &RouteDocument,
    ) -> Result<IngestOutcome, IngestError> {
        let deadline = Deadline::after(self.settings.timeout());
        let mut progress = UploadProgress::new(highway_id);
        log::debug!(
            "Highway {}: {} ({} bytes)",
            highway_id,
            document.filename,
            document.len()
        );

        let kml_text = extract_kml(document).map_err(|err| progress.reject(err.into()))?;
        progress.advance(UploadStage::Extracted);

        let collection = kml_to_geojson(&kml_text).map_err(|err| progress.reject(err.into()))?;
        deadline
            .check("conversion")
            .map_err(|err| progress.reject(err))?;
        progress.advance(UploadStage::Converted);

        let optimized = optimize_features(
            &features_from_collection(&collection),
            &self.settings.optimize,
            &deadline,
        )
        .map_err(|err| progress.reject(err))?;
        progress.advance(UploadStage::Optimized);

        let main_line = extract_main_line(&optimized)
            .ok_or_else(|| progress.reject(ValidationError::NoRouteTrace.into()))?;
        let length_km = MeasuredLine::new(main_line.line.clone()).total_length() / 1000.0;
        deadline
            .check("validation")
            .map_err(|err| progress.reject(err))?;
        progress.advance(UploadStage::LineValidated);

        let optimized_collection = collection_from_features(&optimized);
        let payload_bytes = encoded_len(&optimized_collection)
            .map_err(|err| progress.reject(StoreError::from(err).into()))?;
        if payload_bytes > self.settings.max_payload_bytes {
            return Err(progress.reject(
                SizeError::PayloadTooLarge {
                    size: payload_bytes,
                    limit: self.settings.max_payload_bytes,
                }
                .into(),
            ));
        }

        let version = self
            .store
            .save_highway_trace(highway_id, &optimized_collection, length_km)
            .map_err(|err| progress.reject(err.into()))?;
        progress.advance(UploadStage::Persisted);

        let blob_url = self.archive_upload(highway_id, version, document);
        let outcome = IngestOutcome {
            highway_id,
            version,
            length_km,
            feature_count: optimized.len(),
            main_line_points: main_line.line.0.len(),
            marker_count: index_km_markers(&optimized).len(),
            payload_bytes,
            blob_url,
            stages: progress.history().to_vec(),
        };
        log::info!(
            "Highway {}: stored trace v{} ({:.3} km, {} features, {} markers)",
            highway_id,
            outcome.version,
            outcome.length_km,
            outcome.feature_count,
            outcome.marker_count
        );
        Ok(outcome)
    }

    /// Keep the raw upload for download. Failing here does not undo the ingestion.
    fn archive_upload(
        &self,
        highway_id: HighwayId,
        version: u64,
        document: &RouteDocument,
    ) -> Option<String> {
        let blobs = self.blobs?;
        let filename = std::path::Path::new(&document.filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let key = format!("highway-{highway_id}/v{version}-{filename}");
        match blobs.store(&document.bytes, &key) {
            Ok(url) => Some(url),
            Err(err) => {
                log::warn!("Highway {}: could not archive upload: {}", highway_id, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use testdir::testdir;

    use crate::archive::extractor::tests::build_kmz;
    use crate::config::PipelineSettings;
    use crate::geofile::kml::tests::SAMPLE_KML;
    use crate::ingest::tests::{highway_kml, route_kmz};
    use crate::store::blob::FileBlobStore;
    use crate::store::memory::InMemoryStore;
    use crate::store::TraceStore;

    use super::*;

    #[test]
    fn test_ingest_kml_upload() {
        let store = InMemoryStore::default();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());
        let document = RouteDocument::new("br101.kml", SAMPLE_KML.as_bytes().to_vec());

        let outcome = ingestor.ingest_upload(1, &document).unwrap();

        assert_eq!(1, outcome.version);
        // The polygon is dropped, the line, the marker and the multi line survive.
        assert_eq!(3, outcome.feature_count);
        assert_eq!(3, outcome.main_line_points);
        assert_eq!(1, outcome.marker_count);
        assert!(outcome.length_km > 2.0 && outcome.length_km < 4.0);
        assert_eq!(Some(&UploadStage::Persisted), outcome.stages.last());

        let trace = store.load_highway_trace(1).unwrap().unwrap();
        assert_eq!(3, trace.geojson.features.len());
        assert_eq!(outcome.length_km, trace.length_km);
    }

    #[test]
    fn test_ingest_large_kmz() {
        let store = InMemoryStore::default();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());

        let outcome = ingestor.ingest_upload(2, &route_kmz(1500, 30)).unwrap();

        assert!(outcome.main_line_points <= 1001);
        assert_eq!(30, outcome.marker_count);
        let trace = store.load_highway_trace(2).unwrap().unwrap();
        let line = trace
            .geojson
            .features
            .iter()
            .find_map(|feature| match &feature.geometry.as_ref()?.value {
                geojson::Value::LineString(coords) => Some(coords.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(vec![0.0, 0.0], line[0]);
        assert_eq!(vec![0.29, 0.0], *line.last().unwrap());
    }

    #[test]
    fn test_reupload_bumps_version_and_archives() {
        let store = InMemoryStore::default();
        let blobs = FileBlobStore::open(testdir!()).unwrap();
        let ingestor =
            Ingestor::new(&store, PipelineSettings::default()).with_blob_store(&blobs);
        let document = RouteDocument::new("nested/route.kmz", build_kmz(&[("doc.kml", SAMPLE_KML)]));

        assert_eq!(1, ingestor.ingest_upload(4, &document).unwrap().version);
        let second = ingestor.ingest_upload(4, &document).unwrap();
        assert_eq!(2, second.version);
        assert!(second.blob_url.unwrap().ends_with("highway-4/v2-route.kmz"));
    }

    #[test]
    fn test_kmz_without_kml_is_rejected() {
        let store = InMemoryStore::default();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());
        let document = RouteDocument::new("route.kmz", build_kmz(&[("notes.txt", "hi")]));

        let error = ingestor.ingest_upload(1, &document).unwrap_err();
        assert!(matches!(error, IngestError::Archive(_)));
        assert_eq!(422, error.status_code());
        assert_eq!(None, store.load_highway_trace(1).unwrap());
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        let store = InMemoryStore::default();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());
        let document = RouteDocument::new("route.kml", b"{\"not\": \"kml\"}".to_vec());

        let error = ingestor.ingest_upload(1, &document).unwrap_err();
        assert!(matches!(error, IngestError::Parse(_)));
        assert_eq!(None, store.load_highway_trace(1).unwrap());
    }

    #[test]
    fn test_points_only_is_rejected() {
        let store = InMemoryStore::default();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());
        let document = RouteDocument::new("markers.kml", highway_kml(0, 5).into_bytes());

        let error = ingestor.ingest_upload(1, &document).unwrap_err();
        assert!(matches!(
            error,
            IngestError::Validation(ValidationError::NoRouteTrace)
        ));
        assert_eq!(None, store.load_highway_trace(1).unwrap());
    }

    #[test]
    fn test_payload_too_large() {
        let store = InMemoryStore::default();
        let settings = PipelineSettings {
            max_payload_bytes: 128,
            ..PipelineSettings::default()
        };
        let ingestor = Ingestor::new(&store, settings);

        let error = ingestor.ingest_upload(1, &route_kmz(50, 5)).unwrap_err();
        assert_eq!(413, error.status_code());
        assert_eq!(None, store.load_highway_trace(1).unwrap());
    }

    #[test]
    fn test_timeout() {
        let store = InMemoryStore::default();
        let settings = PipelineSettings {
            timeout_secs: 0,
            ..PipelineSettings::default()
        };
        let ingestor = Ingestor::new(&store, settings);

        let error = ingestor.ingest_upload(1, &route_kmz(50, 5)).unwrap_err();
        assert!(matches!(error, IngestError::Timeout(_, "conversion")));
        assert_eq!(504, error.status_code());
        assert_eq!(None, store.load_highway_trace(1).unwrap());
    }
}
