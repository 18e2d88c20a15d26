use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;

use crate::error::{IngestError, SlicingError, StoreError, ValidationError};
use crate::geofile::feature::{RouteFeature, RouteGeometry};
use crate::geofile::geojson::{collection_from_features, features_from_collection};
use crate::store::{HighwayId, SegmentId, SegmentRange};
use crate::trace::km_markers::{index_km_markers, KmMarker};
use crate::trace::linear_ref::{haversine_length, km_to_coords, slice_segment, KmSpan, MeasuredLine};
use crate::trace::main_line::{extract_main_line, MainLine};

use super::deadline::Deadline;
use super::Ingestor;

/// Which km scale segment ranges are read in when slicing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KmScale {
    /// Span of the km markers found in the master trace. Segments use their KML range.
    Markers,
    /// Fewer than two markers: span of the declared segment ranges, in the internal scale.
    DeclaredRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceStatus {
    Ok,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentOutcome {
    pub segment_id: SegmentId,
    pub status: SliceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_km: Option<f64>,
}

impl SegmentOutcome {
    fn skipped(segment_id: SegmentId, reason: String) -> Self {
        log::warn!("Segment {} skipped: {}", segment_id, reason);
        Self {
            segment_id,
            status: SliceStatus::Skipped,
            reason: Some(reason),
            length_km: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResliceReport {
    pub highway_id: HighwayId,
    pub trace_version: u64,
    pub scale: Option<KmScale>,
    pub segments: Vec<SegmentOutcome>,
}

impl ResliceReport {
    pub fn skipped_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|outcome| outcome.status == SliceStatus::Skipped)
            .count()
    }
}

/// Master line of a highway, measured once and shared read-only by all segment slices.
struct SliceReference {
    line: MeasuredLine,
    markers: Vec<KmMarker>,
    scale: Result<(KmScale, KmSpan), SlicingError>,
}

impl SliceReference {
    fn new(main_line: MainLine, markers: Vec<KmMarker>, segments: &[SegmentRange]) -> Self {
        let scale = match KmSpan::from_markers(&markers) {
            Ok(span) => Ok((KmScale::Markers, span)),
            Err(gap) => {
                log::warn!("{}, falling back to the declared segment ranges", gap);
                declared_span(segments)
                    .map(|span| (KmScale::DeclaredRange, span))
                    .ok_or(gap)
            }
        };
        Self {
            line: MeasuredLine::new(main_line.line),
            markers,
            scale,
        }
    }

    fn slice(&self, segment: &SegmentRange) -> Result<geo::LineString, SlicingError> {
        let (scale, span) = self.scale.clone()?;
        let (start, end) = match scale {
            KmScale::Markers => segment.kml_range(),
            KmScale::DeclaredRange => (segment.km_inicial, segment.km_final),
        };
        slice_segment(&self.line, span, start, end)
    }

    fn locate(&self, km: f64) -> Result<geo::Coord, SlicingError> {
        match &self.scale {
            Ok((KmScale::Markers, span)) => {
                km_to_coords(km, &self.markers).ok_or(SlicingError::DegenerateRange {
                    start: km,
                    end: km,
                    first: span.first,
                    last: span.last,
                })
            }
            Ok((KmScale::DeclaredRange, span)) => self.line.coord_at_km(km, *span),
            Err(gap) => Err(gap.clone()),
        }
    }
}

/// Smallest `km_inicial` to largest `km_final` over all segments. Non-finite kms are ignored.
fn declared_span(segments: &[SegmentRange]) -> Option<KmSpan> {
    let first = segments
        .iter()
        .map(|segment| segment.km_inicial)
        .filter(|km| km.is_finite())
        .min_by(f64::total_cmp)?;
    let last = segments
        .iter()
        .map(|segment| segment.km_final)
        .filter(|km| km.is_finite())
        .max_by(f64::total_cmp)?;
    Some(KmSpan::new(first, last))
}

/// Feature for a segment trace, tagged with the segment identity and both of its km ranges.
fn segment_feature(segment: &SegmentRange, line: geo::LineString) -> RouteFeature {
    RouteFeature::new(RouteGeometry::LineString(line))
        .with_property("segmentId", segment.id)
        .with_property("kmInicial", segment.km_inicial)
        .with_property("kmFinal", segment.km_final)
        .with_property("kmInicialKML", json!(segment.km_inicial_kml))
        .with_property("kmFinalKML", json!(segment.km_final_kml))
}

impl<'a> Ingestor<'a> {
    fn slice_reference(
        &self,
        highway_id: HighwayId,
        segments: &[SegmentRange],
    ) -> Result<(SliceReference, u64), IngestError> {
        let trace = self
            .store
            .load_highway_trace(highway_id)?
            .ok_or(StoreError::MissingHighwayTrace(highway_id))?;
        let features = features_from_collection(&trace.geojson);
        let main_line = extract_main_line(&features).ok_or(ValidationError::NoRouteTrace)?;
        let markers = index_km_markers(&features);
        Ok((
            SliceReference::new(main_line, markers, segments),
            trace.version,
        ))
    }

    /// Recompute and store the trace of every segment of `highway_id` from its master trace.
    ///
    /// Segments are sliced in parallel on a pool of `reslice_threads` workers. A segment that
    /// cannot be sliced or stored is reported as skipped and does not stop its siblings.
    pub fn reslice_highway(
        &self,
        highway_id: HighwayId,
        progress_bar: &ProgressBar,
    ) -> Result<ResliceReport, IngestError> {
        let deadline = Deadline::after(self.settings.timeout());
        let segments = self.store.list_segments(highway_id)?;
        let (reference, trace_version) = self.slice_reference(highway_id, &segments)?;
        log::info!(
            "Highway {}: re-slicing {} segments from trace v{}",
            highway_id,
            segments.len(),
            trace_version
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.reslice_threads.max(1))
            .build()
            .map_err(|err| IngestError::WorkerPool(err.to_string()))?;
        progress_bar.set_length(segments.len() as u64);
        let outcomes: Vec<SegmentOutcome> = pool.install(|| {
            segments
                .par_iter()
                .map(|segment| {
                    let outcome = self.reslice_segment(&reference, segment, &deadline);
                    progress_bar.inc(1);
                    outcome
                })
                .collect()
        });
        progress_bar.finish();

        let report = ResliceReport {
            highway_id,
            trace_version,
            scale: reference.scale.as_ref().ok().map(|(scale, _)| *scale),
            segments: outcomes,
        };
        log::info!(
            "Highway {}: {} segments sliced, {} skipped",
            highway_id,
            report.segments.len() - report.skipped_count(),
            report.skipped_count()
        );
        Ok(report)
    }

    fn reslice_segment(
        &self,
        reference: &SliceReference,
        segment: &SegmentRange,
        deadline: &Deadline,
    ) -> SegmentOutcome {
        if deadline.expired() {
            return SegmentOutcome::skipped(segment.id, "deadline exceeded".to_string());
        }
        let line = match reference.slice(segment) {
            Ok(line) => line,
            Err(err) => return SegmentOutcome::skipped(segment.id, err.to_string()),
        };
        let length_km = haversine_length(&line) / 1000.0;
        let collection = collection_from_features(&[segment_feature(segment, line)]);
        match self.store.save_segment_trace(segment.id, &collection) {
            Ok(()) => SegmentOutcome {
                segment_id: segment.id,
                status: SliceStatus::Ok,
                reason: None,
                length_km: Some(length_km),
            },
            Err(err) => SegmentOutcome::skipped(segment.id, err.to_string()),
        }
    }

    /// Map a km, in the marker scale of the source KML, to a coordinate on `highway_id`.
    pub fn locate_km(&self, highway_id: HighwayId, km: f64) -> Result<geo::Coord, IngestError> {
        let segments = self.store.list_segments(highway_id)?;
        let (reference, _) = self.slice_reference(highway_id, &segments)?;
        Ok(reference.locate(km)?)
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use crate::config::PipelineSettings;
    use crate::ingest::tests::route_kmz;
    use crate::store::memory::InMemoryStore;
    use crate::store::TraceStore;

    use super::*;

    fn ingested_store(line_points: usize, markers: usize) -> InMemoryStore {
        let store = InMemoryStore::default();
        Ingestor::new(&store, PipelineSettings::default())
            .ingest_upload(9, &route_kmz(line_points, markers))
            .unwrap();
        store
    }

    fn stored_line(store: &InMemoryStore, segment_id: SegmentId) -> geo::LineString {
        let collection = store.load_segment_trace(segment_id).unwrap().unwrap();
        let features = features_from_collection(&collection);
        match &features[0].geometry {
            Some(RouteGeometry::LineString(line)) => line.clone(),
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_reslice_with_markers() {
        let store = ingested_store(1500, 30);
        store.upsert_segment(9, SegmentRange::new(1, 5.0, 10.0)).unwrap();
        store
            .upsert_segment(9, SegmentRange::new(2, 105.0, 110.0).with_kml_range(10.0, 20.0))
            .unwrap();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());

        let report = ingestor.reslice_highway(9, &ProgressBar::hidden()).unwrap();

        assert_eq!(Some(KmScale::Markers), report.scale);
        assert_eq!(1, report.trace_version);
        assert_eq!(0, report.skipped_count());

        let total = store.load_highway_trace(9).unwrap().unwrap().length_km;
        let first = stored_line(&store, 1);
        assert_relative_eq!(
            total * 5.0 / 29.0,
            haversine_length(&first) / 1000.0,
            max_relative = 0.05
        );
        assert_abs_diff_eq!(0.05, first.0[0].x, epsilon = 1e-6);
        let second = stored_line(&store, 2);
        assert_abs_diff_eq!(0.10, second.0[0].x, epsilon = 1e-6);
        assert_abs_diff_eq!(0.20, second.0.last().unwrap().x, epsilon = 1e-6);

        let stored = store.load_segment_trace(2).unwrap().unwrap();
        let feature = &stored.features[0];
        assert_eq!(Some(&json!(2)), feature.property("segmentId"));
        assert_eq!(Some(&json!(105.0)), feature.property("kmInicial"));
        assert_eq!(Some(&json!(20.0)), feature.property("kmFinalKML"));
    }

    #[test]
    fn test_degenerate_segment_is_skipped() {
        let store = ingested_store(200, 30);
        store.upsert_segment(9, SegmentRange::new(1, 8.0, 8.0)).unwrap();
        store.upsert_segment(9, SegmentRange::new(2, 1.0, 3.0)).unwrap();
        store.upsert_segment(9, SegmentRange::new(3, 40.0, 50.0)).unwrap();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());

        let report = ingestor.reslice_highway(9, &ProgressBar::hidden()).unwrap();

        assert_eq!(2, report.skipped_count());
        let statuses: Vec<(SegmentId, SliceStatus)> = report
            .segments
            .iter()
            .map(|outcome| (outcome.segment_id, outcome.status))
            .collect();
        assert_eq!(
            vec![
                (1, SliceStatus::Skipped),
                (2, SliceStatus::Ok),
                (3, SliceStatus::Skipped)
            ],
            statuses
        );
        assert!(store.load_segment_trace(1).unwrap().is_none());
        assert!(store.load_segment_trace(2).unwrap().is_some());
    }

    #[test]
    fn test_declared_range_fallback() {
        let store = ingested_store(300, 1);
        store.upsert_segment(9, SegmentRange::new(1, 100.0, 150.0)).unwrap();
        store.upsert_segment(9, SegmentRange::new(2, 150.0, 200.0)).unwrap();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());

        let report = ingestor.reslice_highway(9, &ProgressBar::hidden()).unwrap();

        assert_eq!(Some(KmScale::DeclaredRange), report.scale);
        assert_eq!(0, report.skipped_count());
        let first = stored_line(&store, 1);
        assert_abs_diff_eq!(0.0, first.0[0].x, epsilon = 1e-6);
        assert_abs_diff_eq!(0.145, first.0.last().unwrap().x, epsilon = 1e-6);

        let coord = ingestor.locate_km(9, 175.0).unwrap();
        assert_abs_diff_eq!(0.2175, coord.x, epsilon = 1e-6);
    }

    #[test]
    fn test_non_finite_kms_are_rejected() {
        let store = ingested_store(200, 30);
        store.upsert_segment(9, SegmentRange::new(1, f64::NAN, 10.0)).unwrap();
        store.upsert_segment(9, SegmentRange::new(2, 2.0, 4.0)).unwrap();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());

        let report = ingestor.reslice_highway(9, &ProgressBar::hidden()).unwrap();

        assert_eq!(SliceStatus::Skipped, report.segments[0].status);
        assert_eq!(SliceStatus::Ok, report.segments[1].status);
        assert!(store.load_segment_trace(1).unwrap().is_none());
        assert!(matches!(
            ingestor.locate_km(9, f64::NAN),
            Err(IngestError::Slicing(SlicingError::DegenerateRange { .. }))
        ));
    }

    #[test]
    fn test_declared_range_ignores_non_finite_kms() {
        let segments = vec![
            SegmentRange::new(1, f64::NAN, 50.0),
            SegmentRange::new(2, 50.0, f64::INFINITY),
            SegmentRange::new(3, 10.0, 60.0),
        ];
        assert_eq!(Some(KmSpan::new(10.0, 60.0)), declared_span(&segments));
    }

    #[test]
    fn test_locate_with_markers() {
        let store = ingested_store(100, 30);
        let ingestor = Ingestor::new(&store, PipelineSettings::default());
        let coord = ingestor.locate_km(9, 12.5).unwrap();
        assert_abs_diff_eq!(0.125, coord.x, epsilon = 1e-6);
        assert_abs_diff_eq!(0.0, coord.y, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_trace() {
        let store = InMemoryStore::default();
        let ingestor = Ingestor::new(&store, PipelineSettings::default());
        assert!(matches!(
            ingestor.reslice_highway(1, &ProgressBar::hidden()),
            Err(IngestError::Store(StoreError::MissingHighwayTrace(1)))
        ));
    }
}
