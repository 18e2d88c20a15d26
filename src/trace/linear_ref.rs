use geo::{Distance, Haversine, Point};

use crate::error::SlicingError;

use super::km_markers::KmMarker;

/// The km interval covered by a master line, in the scale of its markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmSpan {
    pub first: f64,
    pub last: f64,
}

impl KmSpan {
    pub fn new(first: f64, last: f64) -> Self {
        Self { first, last }
    }

    /// Span between the lowest and highest marker. Needs at least two markers.
    pub fn from_markers(markers: &[KmMarker]) -> Result<Self, SlicingError> {
        match (markers.first(), markers.last()) {
            (Some(first), Some(last)) if markers.len() >= 2 => Ok(Self::new(first.km, last.km)),
            _ => Err(SlicingError::MarkerGap {
                found: markers.len(),
            }),
        }
    }

    fn ratio(&self, km: f64) -> f64 {
        (km - self.first) / (self.last - self.first)
    }

    fn is_degenerate(&self) -> bool {
        !self.first.is_finite() || !self.last.is_finite() || self.last == self.first
    }
}

/// Map a km to a coordinate by interpolating between the markers that bracket it.
///
/// `markers` must be sorted ascending by km. An exact marker match is returned as-is, and
/// kms outside the marker range clamp to the nearest boundary marker. Interpolation is planar.
/// Returns `None` when there are no markers or `km` is not finite.
pub fn km_to_coords(km: f64, markers: &[KmMarker]) -> Option<geo::Coord> {
    if !km.is_finite() {
        return None;
    }
    if let Some(exact) = markers.iter().find(|marker| marker.km == km) {
        return Some(exact.coord);
    }
    let first = markers.first()?;
    let last = markers.last()?;
    if km <= first.km {
        return Some(first.coord);
    }
    if km >= last.km {
        return Some(last.coord);
    }
    // first.km < km < last.km and no marker sits exactly on km, so before.km < km < after.km.
    let after_index = markers.partition_point(|marker| marker.km < km);
    let before = &markers[after_index - 1];
    let after = &markers[after_index];
    let ratio = (km - before.km) / (after.km - before.km);
    Some(lerp(&before.coord, &after.coord, ratio))
}

fn lerp(from: &geo::Coord, to: &geo::Coord, ratio: f64) -> geo::Coord {
    geo::Coord {
        x: from.x + ratio * (to.x - from.x),
        y: from.y + ratio * (to.y - from.y),
    }
}

fn haversine_distance(from: &geo::Coord, to: &geo::Coord) -> f64 {
    Haversine.distance(Point::from(*from), Point::from(*to))
}

/// A line string with its cumulative geodesic length at every vertex, in meters.
#[derive(Debug, Clone)]
pub struct MeasuredLine {
    line: geo::LineString,
    cumulative: Vec<f64>,
}

impl MeasuredLine {
    pub fn new(line: geo::LineString) -> Self {
        let mut cumulative = Vec::with_capacity(line.0.len());
        let mut total = 0.0;
        for (index, coord) in line.0.iter().enumerate() {
            if index > 0 {
                total += haversine_distance(&line.0[index - 1], coord);
            }
            cumulative.push(total);
        }
        Self { line, cumulative }
    }

    pub fn line(&self) -> &geo::LineString {
        &self.line
    }

    pub fn total_length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Point at `distance` meters from the start, clamped to the line ends.
    pub fn point_at_distance(&self, distance: f64) -> Option<geo::Coord> {
        let first = self.line.0.first()?;
        if distance <= 0.0 {
            return Some(*first);
        }
        let index = self.cumulative.partition_point(|walked| *walked < distance);
        if index >= self.cumulative.len() {
            return self.line.0.last().copied();
        }
        if index == 0 {
            return Some(*first);
        }
        let segment_start = self.cumulative[index - 1];
        let segment_length = self.cumulative[index] - segment_start;
        if segment_length <= 0.0 {
            return Some(self.line.0[index]);
        }
        let ratio = (distance - segment_start) / segment_length;
        Some(lerp(&self.line.0[index - 1], &self.line.0[index], ratio))
    }

    /// Sub-line between two distances along the line. `start` must be below `end`.
    fn slice_between(&self, start: f64, end: f64) -> geo::LineString {
        let mut coords: Vec<geo::Coord> = Vec::new();
        coords.extend(self.point_at_distance(start));
        for (coord, walked) in self.line.0.iter().zip(self.cumulative.iter()) {
            if *walked > start && *walked < end {
                coords.push(*coord);
            }
        }
        coords.extend(self.point_at_distance(end));
        coords.dedup();
        geo::LineString::new(coords)
    }

    /// Coordinate at `km`, assuming km grows linearly along the line over `span`.
    pub fn coord_at_km(&self, km: f64, span: KmSpan) -> Result<geo::Coord, SlicingError> {
        if !km.is_finite() || span.is_degenerate() || self.line.0.is_empty() {
            return Err(SlicingError::DegenerateRange {
                start: km,
                end: km,
                first: span.first,
                last: span.last,
            });
        }
        let distance = span.ratio(km).clamp(0.0, 1.0) * self.total_length();
        self.point_at_distance(distance)
            .ok_or(SlicingError::DegenerateRange {
                start: km,
                end: km,
                first: span.first,
                last: span.last,
            })
    }
}

/// Cut the part of `line` between `slice_start` and `slice_end`, both given in the km scale of
/// `span`. Kms are turned into distances by their relative position within `span`.
pub fn slice_segment(
    line: &MeasuredLine,
    span: KmSpan,
    slice_start: f64,
    slice_end: f64,
) -> Result<geo::LineString, SlicingError> {
    let degenerate = SlicingError::DegenerateRange {
        start: slice_start,
        end: slice_end,
        first: span.first,
        last: span.last,
    };
    if !slice_start.is_finite()
        || !slice_end.is_finite()
        || span.is_degenerate()
        || slice_start >= slice_end
    {
        return Err(degenerate);
    }
    let total = line.total_length();
    let start_distance = (span.ratio(slice_start) * total).clamp(0.0, total);
    let end_distance = (span.ratio(slice_end) * total).clamp(0.0, total);
    if end_distance <= start_distance {
        // The whole range falls outside the span of the master line.
        return Err(degenerate);
    }
    Ok(line.slice_between(start_distance, end_distance))
}

pub fn haversine_length(line: &geo::LineString) -> f64 {
    line.0
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}
