//! Photo-set bookkeeping and upload admission policy.
//!
//! The set holds server-confirmed upload paths plus the user's original
//! file names for display. Admission is decided up front with
//! [`UploadPlan::plan`] so a failed transfer never leaves the set
//! half-updated.

use thiserror::Error;

/// Why an upload wave was refused before any network activity.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PhotoPolicyError {
    /// The picker produced no files.
    #[error("no files selected")]
    EmptyUpload,

    /// The wave would push the set past the scene's photo limit.
    #[error("at most {max} photo(s) allowed for this scene")]
    CapacityExceeded { max: usize },
}

/// Pre-computed admission decision for one upload wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    /// The set was already full, so confirmed paths replace it instead of
    /// appending to it.
    pub replace_existing: bool,
    /// How many confirmed paths may enter the set.
    pub capacity_left: usize,
}

impl UploadPlan {
    /// Decide whether a wave of `incoming` files may join a set currently
    /// holding `existing` photos under a ceiling of `max`.
    ///
    /// - An empty wave is refused outright.
    /// - A full set is treated as a replacement request: the plan admits
    ///   the wave against an empty set and the old photos are dropped
    ///   only once the upload succeeds.
    /// - A wave that would overflow the ceiling is refused and the set
    ///   stays as it was.
    pub fn plan(existing: usize, incoming: usize, max: usize) -> Result<Self, PhotoPolicyError> {
        if incoming == 0 {
            return Err(PhotoPolicyError::EmptyUpload);
        }
        let replace_existing = existing >= max;
        let effective = if replace_existing { 0 } else { existing };
        if effective + incoming > max {
            return Err(PhotoPolicyError::CapacityExceeded { max });
        }
        Ok(Self {
            replace_existing,
            capacity_left: max - effective,
        })
    }
}

/// Uploaded photos in selection order.
///
/// `urls` are backend paths returned by the upload endpoint; `names` are
/// the matching file names, kept index-aligned for display. The two
/// vectors always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoSet {
    urls: Vec<String>,
    names: Vec<String>,
}

impl PhotoSet {
    /// Number of photos in the set.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether the set holds no photos.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Backend paths, in selection order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Display names, index-aligned with [`PhotoSet::urls`].
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Drop every photo.
    pub fn clear(&mut self) {
        self.urls.clear();
        self.names.clear();
    }

    /// Drop photos from the tail until at most `max` remain. Used when a
    /// scene change lowers the ceiling below the current count.
    pub fn shrink_to(&mut self, max: usize) {
        self.urls.truncate(max);
        self.names.truncate(max);
    }

    /// Admit server-confirmed `(url, name)` pairs under `plan`.
    ///
    /// Replacement clears the old photos first. Pairs beyond the plan's
    /// capacity are dropped silently; the upload endpoint may echo more
    /// paths than the wave has room for.
    pub fn admit(&mut self, plan: UploadPlan, confirmed: impl IntoIterator<Item = (String, String)>) {
        if plan.replace_existing {
            self.clear();
        }
        for (url, name) in confirmed.into_iter().take(plan.capacity_left) {
            self.urls.push(url);
            self.names.push(name);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
