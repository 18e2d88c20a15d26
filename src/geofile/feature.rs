use geojson::JsonObject;

/// Geometry of a route feature. Only the shapes the pipeline reasons about get their own
/// variant, everything else is carried along untouched in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteGeometry {
    Point(geo::Coord),
    LineString(geo::LineString),
    MultiLineString(geo::MultiLineString),
    Collection(Vec<RouteGeometry>),
    Other(geojson::Value),
}

impl RouteGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            RouteGeometry::Point(_) => "Point",
            RouteGeometry::LineString(_) => "LineString",
            RouteGeometry::MultiLineString(_) => "MultiLineString",
            RouteGeometry::Collection(_) => "GeometryCollection",
            RouteGeometry::Other(value) => match value {
                geojson::Value::Point(_) => "Point",
                geojson::Value::MultiPoint(_) => "MultiPoint",
                geojson::Value::LineString(_) => "LineString",
                geojson::Value::MultiLineString(_) => "MultiLineString",
                geojson::Value::Polygon(_) => "Polygon",
                geojson::Value::MultiPolygon(_) => "MultiPolygon",
                geojson::Value::GeometryCollection(_) => "GeometryCollection",
            },
        }
    }

    /// Number of coordinates in the geometry, summed over all parts.
    pub fn point_count(&self) -> usize {
        match self {
            RouteGeometry::Point(_) => 1,
            RouteGeometry::LineString(line) => line.0.len(),
            RouteGeometry::MultiLineString(lines) => lines.iter().map(|line| line.0.len()).sum(),
            RouteGeometry::Collection(parts) => parts.iter().map(|part| part.point_count()).sum(),
            RouteGeometry::Other(_) => 0,
        }
    }
}

/// A geometry plus its property bag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteFeature {
    pub geometry: Option<RouteGeometry>,
    pub properties: JsonObject,
}

impl RouteFeature {
    pub fn new(geometry: RouteGeometry) -> Self {
        Self {
            geometry: Some(geometry),
            properties: JsonObject::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn name(&self) -> Option<String> {
        self.text_property("name")
    }

    pub fn description(&self) -> Option<String> {
        self.text_property("description")
    }

    /// Property value rendered as text. Numbers are accepted since some tools export labels
    /// such as km posts as numeric names.
    fn text_property(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

impl From<RouteGeometry> for RouteFeature {
    fn from(value: RouteGeometry) -> Self {
        Self::new(value)
    }
}
