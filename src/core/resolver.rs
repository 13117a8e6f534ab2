//! Two-pass duplicate resolution over one camera's hour buckets.
//!
//! Pass one compares every pair inside an hour bucket and removes the later
//! image of any pair scoring under the same-hour threshold. Pass two compares
//! each hour against its neighbours within the hour window and removes the
//! neighbour-hour image of any pair scoring under the much stricter
//! cross-hour threshold. Removed slots become tombstones and are never
//! compared again.

use crate::config::CullConfig;
use crate::core::grouping::{CameraGroup, HourBucket};
use crate::core::scoring::SimilarityScorer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub intra_hour: f64,
    pub cross_hour: f64,
    pub hour_window: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&CullConfig::default())
    }
}

impl From<&CullConfig> for Thresholds {
    fn from(config: &CullConfig) -> Self {
        Self {
            intra_hour: config.intra_hour_threshold,
            cross_hour: config.cross_hour_threshold,
            hour_window: config.hour_window,
        }
    }
}

/// Scores seen for one hour bucket. Diagnostic only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketScores {
    pub intra_hour: Vec<f64>,
    pub cross_hour: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CameraResolution {
    pub camera_id: String,
    pub images: usize,
    pub buckets: usize,
    pub comparisons: usize,
    /// Comparisons dropped because a frame failed to load or score.
    pub skipped: usize,
    pub removed: Vec<PathBuf>,
    pub scores: BTreeMap<u8, BucketScores>,
}

pub struct DuplicateResolver<'a, S: SimilarityScorer + ?Sized> {
    scorer: &'a S,
    dir: &'a Path,
    thresholds: Thresholds,
}

impl<'a, S: SimilarityScorer + ?Sized> DuplicateResolver<'a, S> {
    pub fn new(scorer: &'a S, dir: &'a Path, thresholds: Thresholds) -> Self {
        Self {
            scorer,
            dir,
            thresholds,
        }
    }

    /// Run both passes over `group`, tombstoning duplicates in place.
    pub fn resolve(&self, group: &mut CameraGroup) -> CameraResolution {
        let mut resolution = CameraResolution {
            camera_id: group.camera_id.clone(),
            images: group.image_count(),
            buckets: group.buckets.len(),
            ..Default::default()
        };

        self.intra_hour_pass(group, &mut resolution);
        self.cross_hour_pass(group, &mut resolution);

        log::info!(
            "Camera {}: {} images, {} comparisons, {} duplicates",
            group.camera_id,
            group.image_count(),
            resolution.comparisons,
            resolution.removed.len()
        );
        resolution
    }

    fn intra_hour_pass(&self, group: &mut CameraGroup, resolution: &mut CameraResolution) {
        for (&hour, bucket) in group.buckets.iter_mut() {
            if bucket.live_count() < 2 {
                continue;
            }

            let mut scores = Vec::new();
            for i in 0..bucket.len() - 1 {
                let Some(left_path) = self.live_path(bucket, i) else {
                    continue;
                };
                let Some(left) = self.prepare(&left_path, resolution) else {
                    continue;
                };

                for j in i + 1..bucket.len() {
                    let Some(right_path) = self.live_path(bucket, j) else {
                        continue;
                    };
                    let Some(score) = self.score_against(&left, &right_path, resolution) else {
                        continue;
                    };
                    scores.push(score);

                    if score < self.thresholds.intra_hour {
                        log::debug!(
                            "{} duplicates {} within hour {} (score {})",
                            right_path.display(),
                            left_path.display(),
                            hour,
                            score
                        );
                        bucket.tombstone(j);
                        resolution.removed.push(right_path);
                    }
                }
            }

            resolution.scores.entry(hour).or_default().intra_hour = scores;
        }
    }

    fn cross_hour_pass(&self, group: &mut CameraGroup, resolution: &mut CameraResolution) {
        let hours: Vec<u8> = group.buckets.keys().copied().collect();

        for &hour in &hours {
            let mut scores = Vec::new();

            for near_hour in neighbour_hours(hour, self.thresholds.hour_window) {
                let Some(left_paths) = group.buckets.get(&hour).map(|bucket| {
                    bucket
                        .live_records()
                        .map(|record| self.dir.join(&record.file_name))
                        .collect::<Vec<_>>()
                }) else {
                    continue;
                };
                let Some(near_bucket) = group.buckets.get_mut(&near_hour) else {
                    continue;
                };

                for left_path in left_paths {
                    let Some(left) = self.prepare(&left_path, resolution) else {
                        continue;
                    };

                    for j in 0..near_bucket.len() {
                        let Some(right_path) = self.live_path(near_bucket, j) else {
                            continue;
                        };
                        let Some(score) = self.score_against(&left, &right_path, resolution)
                        else {
                            continue;
                        };
                        scores.push(score);

                        if score < self.thresholds.cross_hour {
                            log::debug!(
                                "{} (hour {}) duplicates {} (hour {}) (score {})",
                                right_path.display(),
                                near_hour,
                                left_path.display(),
                                hour,
                                score
                            );
                            near_bucket.tombstone(j);
                            resolution.removed.push(right_path);
                        }
                    }
                }
            }

            if !scores.is_empty() {
                resolution.scores.entry(hour).or_default().cross_hour = scores;
            }
        }
    }

    fn live_path(&self, bucket: &HourBucket, index: usize) -> Option<PathBuf> {
        bucket
            .slot(index)
            .live()
            .map(|record| self.dir.join(&record.file_name))
    }

    fn prepare(&self, path: &Path, resolution: &mut CameraResolution) -> Option<S::Frame> {
        match self.scorer.prepare(path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::debug!("Skipping comparisons with {}: {}", path.display(), e);
                resolution.skipped += 1;
                None
            }
        }
    }

    fn score_against(
        &self,
        left: &S::Frame,
        right_path: &Path,
        resolution: &mut CameraResolution,
    ) -> Option<f64> {
        let right = self.prepare(right_path, resolution)?;
        match self.scorer.score(left, &right) {
            Ok(score) => {
                resolution.comparisons += 1;
                Some(score)
            }
            Err(e) => {
                log::debug!("Skipping comparison with {}: {}", right_path.display(), e);
                resolution.skipped += 1;
                None
            }
        }
    }
}

/// Hours within `window` of `hour`, excluding `hour` itself. No wrap past midnight.
pub fn neighbour_hours(hour: u8, window: u8) -> impl Iterator<Item = u8> {
    let low = hour.saturating_sub(window);
    let high = hour.saturating_add(window).min(23);
    (low..=high).filter(move |&near| near != hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filename::{NameEncoding, NormalizedName};
    use crate::core::grouping::group_by_camera_and_hour;
    use crate::error::{CullError, Result};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Scorer driven by a table of pair scores keyed on file names.
    #[derive(Default)]
    struct ScriptedScorer {
        pairs: HashMap<(String, String), f64>,
        unreadable: HashSet<String>,
        compared: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedScorer {
        fn pair(mut self, a: &str, b: &str, score: f64) -> Self {
            self.pairs.insert((a.to_string(), b.to_string()), score);
            self.pairs.insert((b.to_string(), a.to_string()), score);
            self
        }

        fn unreadable(mut self, name: &str) -> Self {
            self.unreadable.insert(name.to_string());
            self
        }

        fn compared(&self) -> Vec<(String, String)> {
            self.compared.lock().unwrap().clone()
        }

        fn was_compared(&self, a: &str, b: &str) -> bool {
            self.compared()
                .iter()
                .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
        }
    }

    impl SimilarityScorer for ScriptedScorer {
        type Frame = String;

        fn prepare(&self, path: &Path) -> Result<String> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if self.unreadable.contains(&name) {
                return Err(CullError::UnreadableImage {
                    path: path.to_path_buf(),
                    source: image::ImageError::IoError(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt",
                    )),
                });
            }
            Ok(name)
        }

        fn score(&self, left: &String, right: &String) -> Result<f64> {
            self.compared
                .lock()
                .unwrap()
                .push((left.clone(), right.clone()));
            Ok(*self
                .pairs
                .get(&(left.clone(), right.clone()))
                .unwrap_or(&1e9))
        }
    }

    fn name(camera: &str, hour: u8, minute: u8) -> String {
        format!("{}_2023_11_14__{:02}_{:02}_00.png", camera, hour, minute)
    }

    fn camera(names: &[String]) -> CameraGroup {
        let normalized: Vec<NormalizedName> = names
            .iter()
            .map(|n| NormalizedName {
                camera_id: n.split('_').next().unwrap().to_string(),
                file_name: n.clone(),
                canonical_name: n.clone(),
                encoding: NameEncoding::Canonical,
            })
            .collect();
        let (mut groups, errors) = group_by_camera_and_hour(&normalized);
        assert!(errors.is_empty());
        assert_eq!(groups.len(), 1);
        groups.pop_first().unwrap().1
    }

    fn survivors(group: &CameraGroup) -> Vec<String> {
        group.survivors().map(|r| r.file_name.clone()).collect()
    }

    fn resolve(scorer: &ScriptedScorer, group: &mut CameraGroup) -> CameraResolution {
        DuplicateResolver::new(scorer, Path::new("/shots"), Thresholds::default()).resolve(group)
    }

    #[test]
    fn test_later_image_of_same_hour_pair_is_removed() {
        let (a, b, c) = (name("cam1", 10, 0), name("cam1", 10, 20), name("cam1", 10, 40));
        let scorer = ScriptedScorer::default().pair(&a, &b, 10.0);
        let mut group = camera(&[a.clone(), b.clone(), c.clone()]);

        let resolution = resolve(&scorer, &mut group);

        assert_eq!(resolution.removed, vec![Path::new("/shots").join(&b)]);
        assert_eq!(survivors(&group), vec![a, c]);
        assert_eq!(resolution.comparisons, 2);
        assert_eq!(resolution.scores[&10].intra_hour, vec![10.0, 1e9]);
        assert_eq!(resolution.images, 3);
        assert_eq!(resolution.buckets, 1);
    }

    #[test]
    fn test_removed_image_is_not_compared_again() {
        let (a, b, c) = (name("cam1", 10, 0), name("cam1", 10, 20), name("cam1", 10, 40));
        let scorer = ScriptedScorer::default()
            .pair(&a, &b, 10.0)
            .pair(&b, &c, 10.0);
        let mut group = camera(&[a.clone(), b.clone(), c.clone()]);

        let resolution = resolve(&scorer, &mut group);

        assert!(!scorer.was_compared(&b, &c));
        assert_eq!(survivors(&group), vec![a, c]);
        assert_eq!(resolution.removed.len(), 1);
    }

    #[test]
    fn test_earliest_survives_a_run_of_duplicates() {
        let names: Vec<String> = (0..4).map(|m| name("cam1", 7, m * 10)).collect();
        let mut scorer = ScriptedScorer::default();
        for i in 0..names.len() {
            for j in i + 1..names.len() {
                scorer = scorer.pair(&names[i], &names[j], 0.0);
            }
        }
        let mut group = camera(&names);

        let resolution = resolve(&scorer, &mut group);

        assert_eq!(survivors(&group), vec![names[0].clone()]);
        assert_eq!(resolution.removed.len(), 3);
        // Only the first image ever acts as the left operand.
        assert_eq!(resolution.comparisons, 3);
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let names: Vec<String> = (0..5).map(|m| name("cam1", 12, m * 7)).collect();
        let scorer = ScriptedScorer::default()
            .pair(&names[0], &names[2], 40_000.0)
            .pair(&names[1], &names[3], 100.0)
            .pair(&names[2], &names[4], 5.0);
        let initial = camera(&names);

        let mut first = initial.clone();
        let mut second = initial.clone();
        resolve(&scorer, &mut first);
        resolve(&scorer, &mut second);

        assert_eq!(survivors(&first), survivors(&second));
        assert_eq!(
            survivors(&first),
            vec![names[0].clone(), names[1].clone(), names[4].clone()]
        );
    }

    #[test]
    fn test_single_image_bucket_does_nothing() {
        let only = name("cam1", 3, 0);
        let scorer = ScriptedScorer::default();
        let mut group = camera(&[only.clone()]);

        let resolution = resolve(&scorer, &mut group);

        assert_eq!(resolution.comparisons, 0);
        assert!(resolution.removed.is_empty());
        assert!(scorer.compared().is_empty());
        assert_eq!(survivors(&group), vec![only]);
    }

    #[test]
    fn test_cross_hour_window_is_two_hours() {
        let (h2, h5, h7, h8) = (
            name("cam1", 2, 0),
            name("cam1", 5, 0),
            name("cam1", 7, 0),
            name("cam1", 8, 0),
        );
        let scorer = ScriptedScorer::default();
        let mut group = camera(&[h2.clone(), h5.clone(), h7.clone(), h8.clone()]);

        let resolution = resolve(&scorer, &mut group);

        assert_eq!(resolution.images, 4);
        assert_eq!(resolution.buckets, 4);
        assert!(!scorer.was_compared(&h5, &h8));
        assert!(!scorer.was_compared(&h5, &h2));
        assert!(!scorer.was_compared(&h2, &h7));
        assert!(scorer.was_compared(&h5, &h7));
        assert!(scorer.was_compared(&h7, &h8));
    }

    #[test]
    fn test_each_pass_uses_its_own_threshold() {
        let (a, b) = (name("cam1", 10, 0), name("cam1", 10, 30));
        let (c, d) = (name("cam1", 11, 0), name("cam1", 12, 0));
        let scorer = ScriptedScorer::default()
            .pair(&a, &b, 2_000.0)
            .pair(&a, &c, 2_000.0)
            .pair(&a, &d, 999.0);
        let mut group = camera(&[a.clone(), b.clone(), c.clone(), d.clone()]);

        let resolution = resolve(&scorer, &mut group);

        // 2000 is a duplicate within the hour but not across hours.
        assert_eq!(survivors(&group), vec![a, c]);
        assert_eq!(
            resolution.removed,
            vec![Path::new("/shots").join(&b), Path::new("/shots").join(&d)]
        );
    }

    #[test]
    fn test_cross_hour_removes_neighbour_hour_image() {
        let (early, late) = (name("cam1", 9, 0), name("cam1", 10, 0));
        let scorer = ScriptedScorer::default().pair(&early, &late, 0.0);
        let mut group = camera(&[late.clone(), early.clone()]);

        resolve(&scorer, &mut group);

        assert_eq!(survivors(&group), vec![early]);
    }

    #[test]
    fn test_tombstoned_images_skip_cross_hour_pass() {
        let (a, b, c) = (name("cam1", 10, 0), name("cam1", 10, 30), name("cam1", 11, 0));
        let scorer = ScriptedScorer::default().pair(&a, &b, 10.0);
        let mut group = camera(&[a.clone(), b.clone(), c.clone()]);

        resolve(&scorer, &mut group);

        assert!(!scorer.was_compared(&b, &c));
        assert!(scorer.was_compared(&a, &c));
    }

    #[test]
    fn test_image_removed_from_one_neighbour_is_skipped_by_the_next() {
        let (h10, h11, h12) = (name("cam1", 10, 0), name("cam1", 11, 0), name("cam1", 12, 0));
        let scorer = ScriptedScorer::default().pair(&h10, &h11, 0.0);
        let mut group = camera(&[h10.clone(), h11.clone(), h12.clone()]);

        let resolution = resolve(&scorer, &mut group);

        assert!(!scorer.was_compared(&h12, &h11));
        assert_eq!(resolution.removed, vec![Path::new("/shots").join(&h11)]);
        assert_eq!(survivors(&group), vec![h10, h12]);
    }

    #[test]
    fn test_unreadable_frame_only_skips_its_comparisons() {
        let (a, b, c) = (name("cam1", 10, 0), name("cam1", 10, 20), name("cam1", 10, 40));
        let scorer = ScriptedScorer::default()
            .pair(&a, &b, 0.0)
            .pair(&a, &c, 0.0)
            .unreadable(&b);
        let mut group = camera(&[a.clone(), b.clone(), c.clone()]);

        let resolution = resolve(&scorer, &mut group);

        assert_eq!(survivors(&group), vec![a, b]);
        assert_eq!(resolution.removed, vec![Path::new("/shots").join(&c)]);
        assert!(resolution.skipped >= 2);
    }

    #[test]
    fn test_neighbour_hours_clamp_at_day_edges() {
        assert_eq!(neighbour_hours(0, 2).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(neighbour_hours(23, 2).collect::<Vec<_>>(), vec![21, 22]);
        assert_eq!(neighbour_hours(5, 2).collect::<Vec<_>>(), vec![3, 4, 6, 7]);
    }
}
