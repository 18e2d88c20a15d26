use std::fs;
use std::path::{Path, PathBuf};

use geojson::FeatureCollection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

use super::{memory::upsert, HighwayId, HighwayTrace, SegmentId, SegmentRange, TraceStore};

/// Trace store backed by JSON documents on disk:
///
/// - `<root>/highways/<highway id>/trace.json`
/// - `<root>/highways/<highway id>/segments.json`
/// - `<root>/segments/<segment id>.geojson`
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("highways"))?;
        fs::create_dir_all(root.join("segments"))?;
        log::debug!("Opened trace store at {:?}", root);
        Ok(Self { root })
    }

    fn highway_dir(&self, highway_id: HighwayId) -> PathBuf {
        self.root.join("highways").join(highway_id.to_string())
    }

    fn segment_trace_path(&self, segment_id: SegmentId) -> PathBuf {
        self.root
            .join("segments")
            .join(format!("{segment_id}.geojson"))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&contents)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Write next to the target and rename, so readers never see a half written document.
    let staging_path = path.with_extension("tmp");
    fs::write(&staging_path, serde_json::to_vec(value)?)?;
    fs::rename(&staging_path, path)?;
    Ok(())
}

impl TraceStore for FileStore {
    fn save_highway_trace(
        &self,
        highway_id: HighwayId,
        geojson: &FeatureCollection,
        length_km: f64,
    ) -> Result<u64, StoreError> {
        let path = self.highway_dir(highway_id).join("trace.json");
        let version = read_json::<HighwayTrace>(&path)?.map_or(1, |previous| previous.version + 1);
        write_json(
            &path,
            &HighwayTrace {
                geojson: geojson.clone(),
                length_km,
                version,
            },
        )?;
        Ok(version)
    }

    fn load_highway_trace(&self, highway_id: HighwayId) -> Result<Option<HighwayTrace>, StoreError> {
        read_json(&self.highway_dir(highway_id).join("trace.json"))
    }

    fn save_segment_trace(
        &self,
        segment_id: SegmentId,
        geojson: &FeatureCollection,
    ) -> Result<(), StoreError> {
        write_json(&self.segment_trace_path(segment_id), geojson)
    }

    fn load_segment_trace(
        &self,
        segment_id: SegmentId,
    ) -> Result<Option<FeatureCollection>, StoreError> {
        read_json(&self.segment_trace_path(segment_id))
    }

    fn list_segments(&self, highway_id: HighwayId) -> Result<Vec<SegmentRange>, StoreError> {
        Ok(read_json(&self.highway_dir(highway_id).join("segments.json"))?.unwrap_or_default())
    }

    fn upsert_segment(
        &self,
        highway_id: HighwayId,
        segment: SegmentRange,
    ) -> Result<(), StoreError> {
        let path = self.highway_dir(highway_id).join("segments.json");
        let mut segments: Vec<SegmentRange> = read_json(&path)?.unwrap_or_default();
        upsert(&mut segments, segment);
        write_json(&path, &segments)
    }
}
