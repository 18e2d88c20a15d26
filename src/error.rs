use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no KML inside archive")]
    NoKmlEntry,
    #[error("could not open KMZ archive: {0}")]
    Corrupt(String),
    #[error("KML document is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid KML/XML: {0}")]
    MalformedXml(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("O arquivo não contém um traçado válido.")]
    NoRouteTrace,
}

#[derive(Debug, Error)]
pub enum SizeError {
    #[error(
        "payload too large: optimized trace is {size} bytes, limit is {limit} bytes. Split the file into smaller routes"
    )]
    PayloadTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SlicingError {
    #[error("degenerate km range [{start}, {end}] over master span [{first}, {last}]")]
    DegenerateRange {
        start: f64,
        end: f64,
        first: f64,
        last: f64,
    },
    #[error("only {found} km markers available and no fallback range")]
    MarkerGap { found: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored document is unreadable: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("highway {0} has no stored trace")]
    MissingHighwayTrace(u64),
}

/// Failure of a whole upload or re-slice request.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Size(#[from] SizeError),
    #[error(transparent)]
    Slicing(#[from] SlicingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("processing exceeded the {0:?} deadline during {1}")]
    Timeout(std::time::Duration, &'static str),
    #[error("could not start worker pool: {0}")]
    WorkerPool(String),
}

impl IngestError {
    /// HTTP-equivalent status for surfacing the failure to a caller.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::Size(_) => 413,
            IngestError::Archive(_)
            | IngestError::Parse(_)
            | IngestError::Validation(_)
            | IngestError::Slicing(_) => 422,
            IngestError::Timeout(..) => 504,
            IngestError::Store(_) | IngestError::WorkerPool(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let too_large: IngestError = SizeError::PayloadTooLarge { size: 10, limit: 5 }.into();
        assert_eq!(413, too_large.status_code());
        let no_trace: IngestError = ValidationError::NoRouteTrace.into();
        assert_eq!(422, no_trace.status_code());
        assert_eq!(
            "O arquivo não contém um traçado válido.",
            no_trace.to_string()
        );
        let no_kml: IngestError = ArchiveError::NoKmlEntry.into();
        assert_eq!("no KML inside archive", no_kml.to_string());
    }
}
