use crate::error::{CullError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Pixel dimensions of each file before it was brought to comparison size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalSizes {
    sizes: HashMap<String, (u32, u32)>,
}

impl OriginalSizes {
    pub fn get(&self, file_name: &str) -> Option<(u32, u32)> {
        self.sizes.get(file_name).copied()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RestoreOutcome {
    pub restored: usize,
    /// Files no longer on disk, usually because they were culled.
    pub missing: usize,
    pub failures: Vec<CullError>,
}

pub struct ComparisonResizer {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl ComparisonResizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: FilterType::Triangle,
        }
    }

    /// Overwrite every file with a copy at comparison size, remembering the
    /// original dimensions. Files that fail are left out of the map.
    pub fn shrink_all(
        &self,
        dir: &Path,
        file_names: &[String],
    ) -> (OriginalSizes, Vec<CullError>) {
        let mut sizes = OriginalSizes::default();
        let mut failures = Vec::new();

        for file_name in file_names {
            let path = dir.join(file_name);
            match self.resize_in_place(&path, self.width, self.height) {
                Ok(original) => {
                    sizes.sizes.insert(file_name.clone(), original);
                }
                Err(e) => {
                    log::warn!("Leaving {} out of comparison: {}", file_name, e);
                    failures.push(e);
                }
            }
        }

        (sizes, failures)
    }

    /// Bring every surviving file back to its recorded size.
    pub fn restore_all(&self, dir: &Path, sizes: &OriginalSizes) -> RestoreOutcome {
        let mut outcome = RestoreOutcome::default();

        let mut entries: Vec<(&String, &(u32, u32))> = sizes.sizes.iter().collect();
        entries.sort();

        for (file_name, &(width, height)) in entries {
            let path = dir.join(file_name);
            if !path.exists() {
                outcome.missing += 1;
                continue;
            }

            match self.resize_in_place(&path, width, height) {
                Ok(_) => outcome.restored += 1,
                Err(e) => {
                    let failure = CullError::RestoreFailure {
                        path: path.clone(),
                        reason: e.to_string(),
                    };
                    log::warn!("{}", failure);
                    outcome.failures.push(failure);
                }
            }
        }

        outcome
    }

    fn resize_in_place(&self, path: &Path, width: u32, height: u32) -> Result<(u32, u32)> {
        let img = load(path)?;
        let original = img.dimensions();
        if original != (width, height) {
            img.resize_exact(width, height, self.filter)
                .save(path)
                .map_err(|e| CullError::ResizeFailure {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }
        Ok(original)
    }
}

fn load(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| CullError::UnreadableImage {
        path: PathBuf::from(path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_image(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_shrink_then_restore_round_trips_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let names = vec!["a.png".to_string(), "b.png".to_string()];
        create_test_image(&temp_dir.path().join("a.png"), 1280, 720);
        create_test_image(&temp_dir.path().join("b.png"), 320, 200);

        let resizer = ComparisonResizer::new(64, 48);
        let (sizes, failures) = resizer.shrink_all(temp_dir.path(), &names);

        assert!(failures.is_empty());
        assert_eq!(sizes.get("a.png"), Some((1280, 720)));
        assert_eq!(sizes.get("b.png"), Some((320, 200)));
        for name in &names {
            assert_eq!(
                image::image_dimensions(temp_dir.path().join(name)).unwrap(),
                (64, 48)
            );
        }

        let outcome = resizer.restore_all(temp_dir.path(), &sizes);
        assert_eq!(outcome.restored, 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(
            image::image_dimensions(temp_dir.path().join("a.png")).unwrap(),
            (1280, 720)
        );
        assert_eq!(
            image::image_dimensions(temp_dir.path().join("b.png")).unwrap(),
            (320, 200)
        );
    }

    #[test]
    fn test_restore_skips_deleted_files() {
        let temp_dir = TempDir::new().unwrap();
        let names = vec!["gone.png".to_string(), "kept.png".to_string()];
        create_test_image(&temp_dir.path().join("gone.png"), 100, 100);
        create_test_image(&temp_dir.path().join("kept.png"), 100, 100);

        let resizer = ComparisonResizer::new(50, 50);
        let (sizes, _) = resizer.shrink_all(temp_dir.path(), &names);
        fs::remove_file(temp_dir.path().join("gone.png")).unwrap();

        let outcome = resizer.restore_all(temp_dir.path(), &sizes);
        assert_eq!(outcome.missing, 1);
        assert_eq!(outcome.restored, 1);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_unreadable_file_is_left_out() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("broken.png"), b"nope").unwrap();
        create_test_image(&temp_dir.path().join("fine.png"), 80, 60);

        let names = vec!["broken.png".to_string(), "fine.png".to_string()];
        let (sizes, failures) = ComparisonResizer::new(40, 30).shrink_all(temp_dir.path(), &names);

        assert_eq!(sizes.len(), 1);
        assert!(sizes.get("broken.png").is_none());
        assert!(matches!(failures[0], CullError::UnreadableImage { .. }));
    }
}
