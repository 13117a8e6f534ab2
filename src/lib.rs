//! Culling of near-duplicate frames from fixed cameras.
//!
//! Images are grouped by camera and hour of capture (taken from the file
//! name) and compared with a pixel change score. Frames that barely changed
//! within an hour, or that are near-identical across neighbouring hours, are
//! deleted; survivors keep their original resolution.

pub mod config;
pub mod core;
pub mod error;

pub use config::CullConfig;
pub use crate::core::resolver::{CameraResolution, DuplicateResolver, Thresholds};
pub use crate::core::runner::{BatchRunner, ProgressCallback, RunPhase, RunProgress, RunReport};
pub use crate::core::scoring::{ChangeDetectionScorer, Comparison, SimilarityScorer};
pub use error::{CullError, Result};
