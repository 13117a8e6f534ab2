//! Camera/timestamp filename handling.
//!
//! Two naming schemes exist in camera dumps:
//! - `camera-epochmillis.ext`, written by older capture boxes
//! - `camera_YYYY_MM_DD__HH_MM_SS.ext`, the canonical form
//!
//! Older names are renamed on disk to the canonical form before grouping.

use crate::error::{CullError, Result};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::fmt::Display;
use std::fs;
use std::path::Path;

pub const CANONICAL_STAMP_FORMAT: &str = "%Y_%m_%d__%H_%M_%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NameEncoding {
    EpochMillis,
    Canonical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    pub camera_id: String,
    /// Name of the file as it currently sits on disk.
    pub file_name: String,
    pub canonical_name: String,
    pub encoding: NameEncoding,
}

impl NormalizedName {
    pub fn needs_rename(&self) -> bool {
        self.file_name != self.canonical_name
    }
}

/// Work out the camera id and canonical name of `file_name`.
///
/// Epoch timestamps are rendered in `tz`; callers pass `chrono::Local` in a
/// real run and a fixed zone in tests.
pub fn parse_file_name<Tz>(file_name: &str, tz: &Tz) -> Result<NormalizedName>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let (stem, ext) = file_name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .ok_or_else(|| CullError::malformed(file_name, "missing extension"))?;

    if let Some((camera, millis)) = stem.split_once('-') {
        if camera.is_empty() {
            return Err(CullError::malformed(file_name, "empty camera id"));
        }
        let millis: i64 = millis.parse().map_err(|_| {
            CullError::malformed(file_name, format!("epoch {:?} is not a number", millis))
        })?;
        let captured = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CullError::malformed(file_name, "epoch out of range"))?
            .with_timezone(tz);

        return Ok(NormalizedName {
            camera_id: camera.to_string(),
            file_name: file_name.to_string(),
            canonical_name: format!(
                "{}_{}.{}",
                camera,
                captured.format(CANONICAL_STAMP_FORMAT),
                ext
            ),
            encoding: NameEncoding::EpochMillis,
        });
    }

    match stem.split_once('_') {
        Some((camera, rest)) if !camera.is_empty() && rest.contains("__") => Ok(NormalizedName {
            camera_id: camera.to_string(),
            file_name: file_name.to_string(),
            canonical_name: file_name.to_string(),
            encoding: NameEncoding::Canonical,
        }),
        _ => Err(CullError::malformed(
            file_name,
            "expected camera-epochmillis or camera_YYYY_MM_DD__HH_MM_SS",
        )),
    }
}

/// Parse every name, splitting the listing into usable names and per-file errors.
pub fn parse_file_names<Tz>(
    file_names: &[String],
    tz: &Tz,
) -> (Vec<NormalizedName>, Vec<CullError>)
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut parsed = Vec::with_capacity(file_names.len());
    let mut errors = Vec::new();

    for file_name in file_names {
        match parse_file_name(file_name, tz) {
            Ok(name) => parsed.push(name),
            Err(e) => {
                log::warn!("Skipping {}: {}", file_name, e);
                errors.push(e);
            }
        }
    }

    (parsed, errors)
}

/// Rename epoch-encoded files in `dir` to their canonical names.
///
/// A rename whose target already exists is not performed; that file is
/// reported and left out of the run.
pub fn apply_renames(
    dir: &Path,
    names: Vec<NormalizedName>,
) -> (Vec<NormalizedName>, Vec<CullError>) {
    let mut renamed = Vec::with_capacity(names.len());
    let mut errors = Vec::new();

    for mut name in names {
        if !name.needs_rename() {
            renamed.push(name);
            continue;
        }

        let from = dir.join(&name.file_name);
        let to = dir.join(&name.canonical_name);
        let outcome = if to.exists() {
            Err("target already exists".to_string())
        } else {
            fs::rename(&from, &to).map_err(|e| e.to_string())
        };

        match outcome {
            Ok(()) => {
                log::debug!("Renamed {} -> {}", name.file_name, name.canonical_name);
                name.file_name = name.canonical_name.clone();
                renamed.push(name);
            }
            Err(reason) => {
                let error = CullError::RenameFailure {
                    from: name.file_name,
                    to: name.canonical_name,
                    reason,
                };
                log::warn!("{}", error);
                errors.push(error);
            }
        }
    }

    (renamed, errors)
}
