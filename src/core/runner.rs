use crate::config::CullConfig;
use crate::core::filename::{NormalizedName, apply_renames, parse_file_names};
use crate::core::grouping::{CameraGroup, group_by_camera_and_hour};
use crate::core::history::{CullHistoryRecord, append_record};
use crate::core::removal::RemovalSet;
use crate::core::resize::ComparisonResizer;
use crate::core::resolver::{CameraResolution, DuplicateResolver, Thresholds};
use crate::core::scoring::{ChangeDetectionScorer, SimilarityScorer};
use crate::error::{CullError, Result};
use chrono::Local;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RunPhase {
    Listing,
    Normalizing,
    Resizing,
    Resolving,
    Deleting,
    Restoring,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    pub phase: RunPhase,
    pub message: String,
}

pub type ProgressCallback = Box<dyn Fn(RunProgress) + Send + Sync>;

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub directory: PathBuf,
    pub dry_run: bool,
    pub images: usize,
    pub cameras: Vec<CameraResolution>,
    /// Every path judged duplicate, in path order.
    pub duplicates: Vec<PathBuf>,
    pub deleted: usize,
    pub already_absent: usize,
    pub restored: usize,
    /// Files whose names could not be read as camera and capture time.
    pub malformed: Vec<String>,
    /// Per-file problems that were skipped over.
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn record_errors(&mut self, errors: Vec<CullError>) {
        for error in errors {
            if let CullError::MalformedFilename { file, .. } = &error {
                self.malformed.push(file.clone());
            }
            self.errors.push(error.to_string());
        }
    }
}

/// Drives a whole culling run over one directory.
pub struct BatchRunner<S> {
    config: CullConfig,
    scorer: S,
    record_history: bool,
    progress: Option<ProgressCallback>,
}

impl BatchRunner<ChangeDetectionScorer> {
    pub fn with_change_detection(config: CullConfig) -> Self {
        let [width, height] = config.comparison_size;
        let scorer = ChangeDetectionScorer::new(&config).with_comparison_size(width, height);
        Self::new(config, scorer)
    }
}

impl<S: SimilarityScorer + Sync> BatchRunner<S> {
    pub fn new(config: CullConfig, scorer: S) -> Self {
        Self {
            config,
            scorer,
            record_history: false,
            progress: None,
        }
    }

    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Rename, shrink, resolve, delete duplicates and restore survivors.
    pub fn run(&self, dir: &Path) -> Result<RunReport> {
        self.config.validate()?;
        let start = Instant::now();
        let mut report = RunReport {
            directory: dir.to_path_buf(),
            ..Default::default()
        };

        self.report(RunPhase::Listing, format!("Listing {}", dir.display()));
        let listing = list_images(dir, &self.config)?;

        self.report(
            RunPhase::Normalizing,
            format!("Normalizing {} file names", listing.len()),
        );
        let (parsed, errors) = parse_file_names(&listing, &Local);
        report.record_errors(errors);
        let (mut names, errors) = apply_renames(dir, parsed);
        report.record_errors(errors);
        sort_chronologically(&mut names);
        let (mut groups, errors) = group_by_camera_and_hour(&names);
        report.record_errors(errors);

        self.report(
            RunPhase::Resizing,
            format!("Resizing {} images for comparison", names.len()),
        );
        let [width, height] = self.config.comparison_size;
        let resizer = ComparisonResizer::new(width, height);
        let grouped: Vec<String> = groups
            .values()
            .flat_map(|group| group.survivors().map(|record| record.file_name.clone()))
            .collect();
        let (sizes, failures) = resizer.shrink_all(dir, &grouped);
        if !failures.is_empty() {
            report.record_errors(failures);
            names.retain(|name| sizes.get(&name.file_name).is_some());
            groups = group_by_camera_and_hour(&names).0;
        }
        report.images = sizes.len();

        let removals = self.resolve(dir, &mut groups, &mut report);

        self.report(
            RunPhase::Deleting,
            format!("Deleting {} duplicates", removals.len()),
        );
        let deletion = removals.delete_all();
        report.deleted = deletion.deleted.len();
        report.already_absent = deletion.already_absent;
        report.record_errors(deletion.failures);

        if self.record_history {
            let record = CullHistoryRecord::deleted_now(dir, &deletion.deleted);
            if let Err(e) = append_record(dir, &record) {
                log::warn!("Failed to record history: {}", e);
                report.errors.push(e.to_string());
            }
        }

        self.report(
            RunPhase::Restoring,
            format!("Restoring {} images", sizes.len()),
        );
        let restore = resizer.restore_all(dir, &sizes);
        report.restored = restore.restored;
        report.record_errors(restore.failures);

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        self.report(RunPhase::Complete, "Run complete".to_string());
        log::info!(
            "Deleted {} of {} images in {:.2?}",
            report.deleted,
            report.images,
            start.elapsed()
        );
        Ok(report)
    }

    /// Work out what `run` would delete without renaming, resizing or
    /// deleting anything.
    pub fn scan(&self, dir: &Path) -> Result<RunReport> {
        self.config.validate()?;
        let start = Instant::now();
        let mut report = RunReport {
            directory: dir.to_path_buf(),
            dry_run: true,
            ..Default::default()
        };

        self.report(RunPhase::Listing, format!("Listing {}", dir.display()));
        let listing = list_images(dir, &self.config)?;

        self.report(
            RunPhase::Normalizing,
            format!("Parsing {} file names", listing.len()),
        );
        let (mut names, errors) = parse_file_names(&listing, &Local);
        report.record_errors(errors);
        sort_chronologically(&mut names);
        let (mut groups, errors) = group_by_camera_and_hour(&names);
        report.record_errors(errors);
        report.images = groups.values().map(CameraGroup::image_count).sum();

        self.resolve(dir, &mut groups, &mut report);

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        self.report(RunPhase::Complete, "Scan complete".to_string());
        Ok(report)
    }

    fn resolve(
        &self,
        dir: &Path,
        groups: &mut BTreeMap<String, CameraGroup>,
        report: &mut RunReport,
    ) -> RemovalSet {
        self.report(
            RunPhase::Resolving,
            format!("Comparing images from {} cameras", groups.len()),
        );

        let resolver = DuplicateResolver::new(&self.scorer, dir, Thresholds::from(&self.config));
        let resolutions: Vec<CameraResolution> = if self.config.parallel {
            groups
                .par_iter_mut()
                .map(|(_, group)| resolver.resolve(group))
                .collect()
        } else {
            groups
                .values_mut()
                .map(|group| resolver.resolve(group))
                .collect()
        };

        let mut removals = RemovalSet::default();
        for resolution in &resolutions {
            removals.extend(resolution.removed.iter().cloned());
        }
        report.duplicates = removals.iter().cloned().collect();
        report.cameras = resolutions;
        removals
    }

    fn report(&self, phase: RunPhase, message: String) {
        log::debug!("{:?}: {}", phase, message);
        if let Some(callback) = &self.progress {
            callback(RunProgress { phase, message });
        }
    }
}

/// Order names by canonical name so buckets run from earliest to latest
/// capture, whichever encoding a file arrived in.
fn sort_chronologically(names: &mut [NormalizedName]) {
    names.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
}

/// Sorted names of the files in `dir` carrying the configured extension.
pub fn list_images(dir: &Path, config: &CullConfig) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(CullError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(CullError::Io(e.into())),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if config.matches_extension(&name) {
            names.push(name.into_owned());
        }
    }

    Ok(names)
}
