use crate::error::CullError;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Paths judged duplicate during resolution. Adding a path twice is harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSet {
    paths: BTreeSet<PathBuf>,
}

impl RemovalSet {
    pub fn insert(&mut self, path: PathBuf) {
        self.paths.insert(path);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    /// Delete every path, continuing past failures.
    pub fn delete_all(self) -> DeletionOutcome {
        let mut outcome = DeletionOutcome::default();

        for path in self.paths {
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::debug!("Deleted {}", path.display());
                    outcome.deleted.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::debug!("{} already gone", path.display());
                    outcome.already_absent += 1;
                }
                Err(source) => {
                    let failure = CullError::DeletionFailure { path, source };
                    log::warn!("{}", failure);
                    outcome.failures.push(failure);
                }
            }
        }

        outcome
    }
}

impl Extend<PathBuf> for RemovalSet {
    fn extend<I: IntoIterator<Item = PathBuf>>(&mut self, iter: I) {
        self.paths.extend(iter);
    }
}

#[derive(Debug, Default)]
pub struct DeletionOutcome {
    pub deleted: Vec<PathBuf>,
    pub already_absent: usize,
    pub failures: Vec<CullError>,
}
