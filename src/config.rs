use crate::error::{CullError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings for one culling run.
///
/// Missing fields in a config file fall back to the defaults below, so a file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullConfig {
    /// Image extension considered by the run, without the dot.
    pub extension: String,
    /// Width and height every image is brought to before comparison.
    pub comparison_size: [u32; 2],
    /// Same-hour pairs scoring below this are duplicates.
    pub intra_hour_threshold: f64,
    /// Near-hour pairs scoring below this are duplicates.
    pub cross_hour_threshold: f64,
    /// How many hours either side of a bucket the near-hour pass looks at.
    pub hour_window: u8,
    pub min_contour_area: f64,
    pub pixel_threshold: u8,
    pub dilate_iterations: u8,
    /// Gaussian kernel sizes applied in order during preprocessing.
    pub blur_radii: Vec<u32>,
    /// Percent of width/height blacked out at left, top, right, bottom.
    pub border_mask: [u32; 4],
    /// Resolve camera groups concurrently.
    pub parallel: bool,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            extension: "png".to_string(),
            comparison_size: [640, 480],
            intra_hour_threshold: 50_000.0,
            cross_hour_threshold: 1_000.0,
            hour_window: 2,
            min_contour_area: 100.0,
            pixel_threshold: 45,
            dilate_iterations: 2,
            blur_radii: Vec::new(),
            border_mask: [5, 10, 5, 0],
            parallel: false,
        }
    }
}

impl CullConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: CullConfig = serde_json::from_str(&raw).map_err(|e| {
            CullError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(CullError::InvalidConfig(format!(
                "extension must be given without a dot, got {:?}",
                self.extension
            )));
        }
        if self.comparison_size.contains(&0) {
            return Err(CullError::InvalidConfig(
                "comparison size must be non-zero".to_string(),
            ));
        }
        if self.intra_hour_threshold <= 0.0 || self.cross_hour_threshold <= 0.0 {
            return Err(CullError::InvalidConfig(
                "thresholds must be positive".to_string(),
            ));
        }
        if !(1..=23).contains(&self.hour_window) {
            return Err(CullError::InvalidConfig(format!(
                "hour window must be within 1..=23, got {}",
                self.hour_window
            )));
        }
        if let Some(radius) = self.blur_radii.iter().find(|r| **r == 0 || **r % 2 == 0) {
            return Err(CullError::InvalidConfig(format!(
                "blur radius must be odd, got {}",
                radius
            )));
        }
        let [left, top, right, bottom] = self.border_mask;
        if left + right >= 100 || top + bottom >= 100 {
            return Err(CullError::InvalidConfig(
                "border mask covers the whole frame".to_string(),
            ));
        }
        Ok(())
    }

    pub fn matches_extension(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}
