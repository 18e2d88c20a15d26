use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use geojson::FeatureCollection;

use crate::error::StoreError;

use super::{HighwayId, HighwayTrace, SegmentId, SegmentRange, TraceStore};

/// Trace store kept in process memory. Used by tests and one-shot CLI runs.
#[derive(Default)]
pub struct InMemoryStore {
    highways: Mutex<HashMap<HighwayId, HighwayTrace>>,
    segments: Mutex<HashMap<HighwayId, Vec<SegmentRange>>>,
    segment_traces: Mutex<HashMap<SegmentId, FeatureCollection>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TraceStore for InMemoryStore {
    fn save_highway_trace(
        &self,
        highway_id: HighwayId,
        geojson: &FeatureCollection,
        length_km: f64,
    ) -> Result<u64, StoreError> {
        let mut highways = lock(&self.highways);
        let version = highways
            .get(&highway_id)
            .map_or(1, |previous| previous.version + 1);
        highways.insert(
            highway_id,
            HighwayTrace {
                geojson: geojson.clone(),
                length_km,
                version,
            },
        );
        Ok(version)
    }

    fn load_highway_trace(&self, highway_id: HighwayId) -> Result<Option<HighwayTrace>, StoreError> {
        Ok(lock(&self.highways).get(&highway_id).cloned())
    }

    fn save_segment_trace(
        &self,
        segment_id: SegmentId,
        geojson: &FeatureCollection,
    ) -> Result<(), StoreError> {
        lock(&self.segment_traces).insert(segment_id, geojson.clone());
        Ok(())
    }

    fn load_segment_trace(
        &self,
        segment_id: SegmentId,
    ) -> Result<Option<FeatureCollection>, StoreError> {
        Ok(lock(&self.segment_traces).get(&segment_id).cloned())
    }

    fn list_segments(&self, highway_id: HighwayId) -> Result<Vec<SegmentRange>, StoreError> {
        Ok(lock(&self.segments)
            .get(&highway_id)
            .cloned()
            .unwrap_or_default())
    }

    fn upsert_segment(
        &self,
        highway_id: HighwayId,
        segment: SegmentRange,
    ) -> Result<(), StoreError> {
        let mut segments = lock(&self.segments);
        upsert(segments.entry(highway_id).or_default(), segment);
        Ok(())
    }
}

pub(super) fn upsert(segments: &mut Vec<SegmentRange>, segment: SegmentRange) {
    match segments.iter_mut().find(|existing| existing.id == segment.id) {
        Some(existing) => *existing = segment,
        None => segments.push(segment),
    }
}
