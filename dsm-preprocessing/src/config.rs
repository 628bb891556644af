//! Run configuration, read from a JSON file keyed by the upper-case names the
//! registration tooling uses.
use crate::bandpass::BandpassFilters;
use crate::error::{PrepError, PrepResult};
use constants::registration::{DEFAULT_STRONG_FILTER, DEFAULT_WEAK_FILTER};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(rename = "FND_FILE")]
    pub fnd_file: PathBuf,
    #[serde(rename = "AOI_FILE")]
    pub aoi_file: PathBuf,
    /// Narrow bandpass kernel size (metres).
    #[serde(rename = "DSM_WEAK_FILTER", default = "default_weak_filter")]
    pub dsm_weak_filter: f64,
    /// Wide bandpass kernel size (metres).
    #[serde(rename = "DSM_STRONG_FILTER", default = "default_strong_filter")]
    pub dsm_strong_filter: f64,
    #[serde(rename = "TIGHT_SEARCH", default)]
    pub tight_search: bool,
    /// Floor for the working resolution (metres).
    #[serde(rename = "MIN_RESOLUTION", default)]
    pub min_resolution: f64,
    #[serde(rename = "OUTPUT_DIR", default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_weak_filter() -> f64 {
    DEFAULT_WEAK_FILTER
}

fn default_strong_filter() -> f64 {
    DEFAULT_STRONG_FILTER
}

impl RegistrationConfig {
    pub fn new(fnd_file: impl Into<PathBuf>, aoi_file: impl Into<PathBuf>) -> Self {
        Self {
            fnd_file: fnd_file.into(),
            aoi_file: aoi_file.into(),
            dsm_weak_filter: DEFAULT_WEAK_FILTER,
            dsm_strong_filter: DEFAULT_STRONG_FILTER,
            tight_search: false,
            min_resolution: 0.0,
            output_dir: None,
        }
    }

    pub fn from_json(json: &str) -> PrepResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PrepError::configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.fnd_file.as_os_str().is_empty() {
            return Err(PrepError::configuration("FND_FILE is empty"));
        }
        if self.aoi_file.as_os_str().is_empty() {
            return Err(PrepError::configuration("AOI_FILE is empty"));
        }
        for (key, value) in [
            ("DSM_WEAK_FILTER", self.dsm_weak_filter),
            ("DSM_STRONG_FILTER", self.dsm_strong_filter),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PrepError::configuration(format!(
                    "{key} must be a positive number, got {value}"
                )));
            }
        }
        if self.dsm_weak_filter >= self.dsm_strong_filter {
            return Err(PrepError::configuration(format!(
                "DSM_WEAK_FILTER ({}) must be smaller than DSM_STRONG_FILTER ({})",
                self.dsm_weak_filter, self.dsm_strong_filter
            )));
        }
        if !(self.min_resolution.is_finite() && self.min_resolution >= 0.0) {
            return Err(PrepError::configuration(format!(
                "MIN_RESOLUTION must be zero or positive, got {}",
                self.min_resolution
            )));
        }
        Ok(())
    }

    pub fn filters(&self) -> BandpassFilters {
        BandpassFilters {
            weak: self.dsm_weak_filter,
            strong: self.dsm_strong_filter,
        }
    }

    /// `OUTPUT_DIR`, or the directory holding the AOI file.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .aoi_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Read and validate a configuration file.
pub fn load_config(path: &Path) -> PrepResult<RegistrationConfig> {
    let json = fs::read_to_string(path)?;
    let config = RegistrationConfig::from_json(&json)?;
    log::debug!("loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_optional_keys() {
        let config =
            RegistrationConfig::from_json(r#"{"FND_FILE": "fnd.tif", "AOI_FILE": "data/aoi.laz"}"#)
                .unwrap();
        assert_eq!(config.dsm_weak_filter, 1.0);
        assert_eq!(config.dsm_strong_filter, 10.0);
        assert!(!config.tight_search);
        assert_eq!(config.min_resolution, 0.0);
        assert_eq!(config.output_dir(), PathBuf::from("data"));
        assert_eq!(config.filters(), BandpassFilters::default());
    }

    #[test]
    fn explicit_keys_are_honoured() {
        let config = RegistrationConfig::from_json(
            r#"{
                "FND_FILE": "fnd.tif",
                "AOI_FILE": "aoi.tif",
                "DSM_WEAK_FILTER": 2.0,
                "DSM_STRONG_FILTER": 20.0,
                "TIGHT_SEARCH": true,
                "MIN_RESOLUTION": 0.5,
                "OUTPUT_DIR": "/tmp/out"
            }"#,
        )
        .unwrap();
        assert!(config.tight_search);
        assert_eq!(config.filters().strong, 20.0);
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let mut config = RegistrationConfig::new("fnd.tif", "aoi.tif");
        config.dsm_weak_filter = 0.0;
        assert!(matches!(config.validate(), Err(PrepError::Configuration(_))));

        config.dsm_weak_filter = 12.0;
        assert!(matches!(config.validate(), Err(PrepError::Configuration(_))));

        config.dsm_weak_filter = 1.0;
        config.min_resolution = -1.0;
        assert!(matches!(config.validate(), Err(PrepError::Configuration(_))));

        config.min_resolution = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_required_key_is_a_configuration_error() {
        match RegistrationConfig::from_json(r#"{"FND_FILE": "fnd.tif"}"#) {
            Err(PrepError::Configuration(message)) => assert!(message.contains("AOI_FILE"), "{message}"),
            other => panic!("expected a configuration error, got {other:?}"),
        }
        assert!(matches!(
            RegistrationConfig::from_json(r#"{"FND_FILE": "fnd.tif", "AOI_FILE": 3}"#),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"FND_FILE": "a.tif", "AOI_FILE": "b.tif", "TIGHT_SEARCH": true}}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert!(config.tight_search);
        assert_eq!(config.fnd_file, PathBuf::from("a.tif"));
    }
}
