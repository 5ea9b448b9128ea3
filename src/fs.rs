//! Filesystem modification-time probing.

use std::path::Path;
use std::time::SystemTime;

/// MTime info gathered for a file.  This also models "file is absent".
/// It's not using an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MTime {
    Missing,
    Stamp(SystemTime),
}

impl MTime {
    /// Whether `self` should invalidate an artifact stamped `other`.
    /// A missing file on either side counts as newer, so planners treat a
    /// missing input as "must rebuild" rather than an error.
    pub fn newer_than(&self, other: &MTime) -> bool {
        match (self, other) {
            (MTime::Stamp(a), MTime::Stamp(b)) => a > b,
            _ => true,
        }
    }
}

/// stat() an on-disk path, producing its MTime.
pub fn mtime(path: &Path) -> std::io::Result<MTime> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(MTime::Stamp(meta.modified()?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(MTime::Missing),
        Err(err) => Err(err),
    }
}
