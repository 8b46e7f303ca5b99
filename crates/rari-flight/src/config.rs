use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FlightError;

pub const DEFAULT_MAX_ROW_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_CONTENT_TYPE: &str = "text/x-component";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Upper bound on a single row, including its id prefix.
    pub max_row_bytes: usize,
    pub content_type: String,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            max_row_bytes: DEFAULT_MAX_ROW_BYTES,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl FlightConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, FlightError> {
        let config: FlightConfig = toml::from_str(source)
            .map_err(|e| FlightError::configuration(format!("Invalid flight config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlightError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), FlightError> {
        if self.max_row_bytes == 0 {
            return Err(FlightError::configuration("max_row_bytes must be greater than zero"));
        }
        if self.content_type.trim().is_empty() {
            return Err(FlightError::configuration("content_type must not be empty"));
        }
        Ok(())
    }
}
