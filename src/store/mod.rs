//! Persistence collaborators of the ingestion engine.
//!
//! The engine never talks to a database directly, it goes through [`TraceStore`] for highway
//! and segment traces and through [`BlobStore`] for archiving raw uploads.

pub mod blob;
pub mod file;
pub mod memory;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub type HighwayId = u64;
pub type SegmentId = u64;

/// Km range of a homogeneous segment, as defined by an operator.
///
/// `km_inicial`/`km_final` are in the internal reference scale. The `_kml` pair, when present,
/// expresses the same range in the marker scale of the source KML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRange {
    pub id: SegmentId,
    pub km_inicial: f64,
    pub km_final: f64,
    #[serde(rename = "kmInicialKML", default)]
    pub km_inicial_kml: Option<f64>,
    #[serde(rename = "kmFinalKML", default)]
    pub km_final_kml: Option<f64>,
}

impl SegmentRange {
    pub fn new(id: SegmentId, km_inicial: f64, km_final: f64) -> Self {
        Self {
            id,
            km_inicial,
            km_final,
            km_inicial_kml: None,
            km_final_kml: None,
        }
    }

    pub fn with_kml_range(mut self, km_inicial_kml: f64, km_final_kml: f64) -> Self {
        self.km_inicial_kml = Some(km_inicial_kml);
        self.km_final_kml = Some(km_final_kml);
        self
    }

    /// Range in the marker scale of the source KML, falling back to the internal range.
    pub fn kml_range(&self) -> (f64, f64) {
        (
            self.km_inicial_kml.unwrap_or(self.km_inicial),
            self.km_final_kml.unwrap_or(self.km_final),
        )
    }
}

/// The master trace of a highway as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighwayTrace {
    pub geojson: FeatureCollection,
    pub length_km: f64,
    /// Bumped on every save. Concurrent uploads are last-write-wins.
    pub version: u64,
}

pub trait TraceStore: Send + Sync {
    /// Replace the master trace of a highway and return its new version.
    fn save_highway_trace(
        &self,
        highway_id: HighwayId,
        geojson: &FeatureCollection,
        length_km: f64,
    ) -> Result<u64, StoreError>;

    fn load_highway_trace(&self, highway_id: HighwayId) -> Result<Option<HighwayTrace>, StoreError>;

    fn save_segment_trace(
        &self,
        segment_id: SegmentId,
        geojson: &FeatureCollection,
    ) -> Result<(), StoreError>;

    fn load_segment_trace(&self, segment_id: SegmentId)
        -> Result<Option<FeatureCollection>, StoreError>;

    fn list_segments(&self, highway_id: HighwayId) -> Result<Vec<SegmentRange>, StoreError>;

    /// Insert a segment, or replace the one with the same id.
    fn upsert_segment(&self, highway_id: HighwayId, segment: SegmentRange)
        -> Result<(), StoreError>;
}

pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a URL to download them again.
    fn store(&self, bytes: &[u8], key: &str) -> Result<String, StoreError>;
}

#[cfg(test)]
mod fixtures {
    use testdir::testdir;

    use super::{file::FileStore, memory::InMemoryStore, TraceStore};

    pub trait StoreFixture: TraceStore + Sized {
        fn fixture() -> Self;
    }

    impl StoreFixture for InMemoryStore {
        fn fixture() -> Self {
            InMemoryStore::default()
        }
    }

    impl StoreFixture for FileStore {
        fn fixture() -> Self {
            FileStore::open(testdir!()).unwrap()
        }
    }
}
