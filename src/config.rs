use crate::error::RunError;
use crate::params::TileParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Complete application configuration for export/import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version field for future compatibility
    pub version: u32,
    /// All tile and flow parameters
    pub params: TileParams,
    /// Target frames per second (app-level)
    pub fps: u64,
    /// Cells examined per tick while building the particle layer
    pub build_cells_per_tick: u32,
}

impl AppConfig {
    /// Export config to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), RunError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RunError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, json)
            .map_err(|e| RunError::Config(format!("failed to write config file: {e}")))
    }

    /// Import config from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, RunError> {
        let content = fs::read_to_string(path)
            .map_err(|e| RunError::Config(format!("failed to read config file: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| RunError::Config(format!("failed to parse config file: {e}")))
    }

    /// Per-user default config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tiledrift").join("config.json"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            params: TileParams::default(),
            fps: 30,
            build_cells_per_tick: crate::app::BUILD_CELLS_PER_TICK,
        }
    }
}
