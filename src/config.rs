use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::trace::optimizer::OptimizeParams;

const DEFAULT_MAX_PAYLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Root directory of the file backed trace store.
    pub data_dir: PathBuf,
    /// Raw uploads are archived here after a successful ingestion when set.
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    #[serde(flatten)]
    pub optimize: OptimizeParams,
    /// Optimized GeoJSON above this size is rejected instead of persisted.
    pub max_payload_bytes: usize,
    /// Wall-clock budget for one upload or one re-slice batch.
    pub timeout_secs: u64,
    pub reslice_threads: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            optimize: OptimizeParams::default(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            timeout_secs: 120,
            reslice_threads: 4,
        }
    }
}

impl PipelineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn load_config(filepath: &Path) -> anyhow::Result<Config> {
    if !filepath.exists() {
        return Err(anyhow!("Config file {:?} not found", filepath));
    }
    let config_contents = read_to_string(filepath)?;
    serde_yaml::from_str(&config_contents)
        .with_context(|| format!("Parsing config file {:?}", filepath))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use testdir::testdir;

    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = serde_yaml::from_str("data_dir: /tmp/traces\n").unwrap();
        assert_eq!(PathBuf::from("/tmp/traces"), config.data_dir);
        assert_eq!(None, config.blob_dir);
        assert_eq!(PipelineSettings::default(), config.pipeline);
        assert_eq!(209_715_200, config.pipeline.max_payload_bytes);
        assert_eq!(6, config.pipeline.optimize.precision);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let dir = testdir!();
        let filepath = dir.join("config.yaml");
        fs::write(
            &filepath,
            "data_dir: ./data\nblob_dir: ./blobs\npipeline:\n  max_line_points: 500\n  timeout_secs: 5\n",
        )
        .unwrap();
        let config = load_config(&filepath).unwrap();
        assert_eq!(Some(PathBuf::from("./blobs")), config.blob_dir);
        assert_eq!(500, config.pipeline.optimize.max_line_points);
        assert_eq!(6, config.pipeline.optimize.precision);
        assert_eq!(Duration::from_secs(5), config.pipeline.timeout());
        assert_eq!(4, config.pipeline.reslice_threads);
    }

    #[test]
    fn test_missing_config_file() {
        let dir = testdir!();
        assert!(load_config(&dir.join("absent.yaml")).is_err());
    }
}
