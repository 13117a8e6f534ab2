//! Per-camera, per-hour bucketing of canonical names.

use crate::core::filename::NormalizedName;
use crate::error::{CullError, Result};
use chrono::{NaiveTime, Timelike};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub camera_id: String,
    /// Name on disk, used to build paths.
    pub file_name: String,
    pub canonical_name: String,
    pub captured_time: NaiveTime,
}

impl ImageRecord {
    pub fn hour(&self) -> u8 {
        self.captured_time.hour() as u8
    }
}

/// A bucket position: either the image or the marker left after removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Live(ImageRecord),
    Removed,
}

impl Slot {
    pub fn live(&self) -> Option<&ImageRecord> {
        match self {
            Slot::Live(record) => Some(record),
            Slot::Removed => None,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Slot::Removed)
    }
}

/// Images of one camera sharing an hour of day, in listing order.
///
/// Slots are only ever overwritten with [`Slot::Removed`]; indices never shift.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HourBucket {
    slots: Vec<Slot>,
}

impl HourBucket {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_removed()).count()
    }

    pub fn live_records(&self) -> impl Iterator<Item = &ImageRecord> {
        self.slots.iter().filter_map(Slot::live)
    }

    /// Replace the slot with a tombstone, handing back what was there.
    pub fn tombstone(&mut self, index: usize) -> Option<ImageRecord> {
        match std::mem::replace(&mut self.slots[index], Slot::Removed) {
            Slot::Live(record) => Some(record),
            Slot::Removed => None,
        }
    }

    fn push(&mut self, record: ImageRecord) {
        self.slots.push(Slot::Live(record));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraGroup {
    pub camera_id: String,
    pub buckets: BTreeMap<u8, HourBucket>,
}

impl CameraGroup {
    pub fn image_count(&self) -> usize {
        self.buckets.values().map(HourBucket::len).sum()
    }

    pub fn survivors(&self) -> impl Iterator<Item = &ImageRecord> {
        self.buckets.values().flat_map(HourBucket::live_records)
    }
}

/// Extract the `HH_MM_SS` part after the final `__` of a canonical name.
pub fn parse_capture_time(canonical_name: &str) -> Result<NaiveTime> {
    let (_, tail) = canonical_name
        .rsplit_once("__")
        .ok_or_else(|| CullError::malformed(canonical_name, "no time component"))?;
    let time = tail.split('.').next().unwrap_or(tail);
    NaiveTime::parse_from_str(time, "%H_%M_%S").map_err(|e| {
        CullError::malformed(canonical_name, format!("bad time {:?}: {}", time, e))
    })
}

/// Build camera groups from normalized names, keeping the given order inside
/// each bucket. Names whose time component does not parse are returned as errors.
pub fn group_by_camera_and_hour(
    names: &[NormalizedName],
) -> (BTreeMap<String, CameraGroup>, Vec<CullError>) {
    let mut groups: BTreeMap<String, CameraGroup> = BTreeMap::new();
    let mut errors = Vec::new();

    for name in names {
        let captured_time = match parse_capture_time(&name.canonical_name) {
            Ok(time) => time,
            Err(e) => {
                log::warn!("Skipping {}: {}", name.file_name, e);
                errors.push(e);
                continue;
            }
        };

        let record = ImageRecord {
            camera_id: name.camera_id.clone(),
            file_name: name.file_name.clone(),
            canonical_name: name.canonical_name.clone(),
            captured_time,
        };

        groups
            .entry(name.camera_id.clone())
            .or_insert_with(|| CameraGroup {
                camera_id: name.camera_id.clone(),
                buckets: BTreeMap::new(),
            })
            .buckets
            .entry(record.hour())
            .or_default()
            .push(record);
    }

    (groups, errors)
}
