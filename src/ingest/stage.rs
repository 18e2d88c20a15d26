use serde::Serialize;

use crate::error::IngestError;
use crate::store::HighwayId;

/// States an upload moves through. `Rejected` is terminal and can follow any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Received,
    Extracted,
    Converted,
    Optimized,
    LineValidated,
    Persisted,
    Rejected,
}

/// Tracks and logs the stage transitions of a single upload.
#[derive(Debug)]
pub struct UploadProgress {
    highway_id: HighwayId,
    history: Vec<UploadStage>,
}

impl UploadProgress {
    pub fn new(highway_id: HighwayId) -> Self {
        log::info!("Highway {}: upload received", highway_id);
        Self {
            highway_id,
            history: vec![UploadStage::Received],
        }
    }

    pub fn stage(&self) -> UploadStage {
        self.history
            .last()
            .copied()
            .unwrap_or(UploadStage::Received)
    }

    pub fn history(&self) -> &[UploadStage] {
        &self.history
    }

    pub fn advance(&mut self, next: UploadStage) {
        log::info!(
            "Highway {}: {:?} -> {:?}",
            self.highway_id,
            self.stage(),
            next
        );
        self.history.push(next);
    }

    /// Move to `Rejected` and hand the error back for propagation.
    pub fn reject(&mut self, error: IngestError) -> IngestError {
        log::warn!(
            "Highway {}: upload rejected after {:?}: {}",
            self.highway_id,
            self.stage(),
            error
        );
        self.history.push(UploadStage::Rejected);
        error
    }
}
