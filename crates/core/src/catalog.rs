//! Option catalog for the rendering service.
//!
//! The catalog is fetched wholesale from the backend and drives every
//! client-side validation: which scenes, formats, backgrounds, and music
//! tracks exist, how many photos a scene needs, and what a render costs.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Photo rules
// ---------------------------------------------------------------------------

/// Photo-count requirement derived from the selected scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoRule {
    /// Photos needed before a start frame can be generated.
    pub required: usize,
    /// Hard ceiling on the photo set size.
    pub max: usize,
}

/// Rule applied when the selected scene key is not in the catalog.
///
/// The only rule where `required != max`: one photo is enough to proceed
/// and a second is tolerated until the catalog says otherwise.
pub const FALLBACK_PHOTO_RULE: PhotoRule = PhotoRule { required: 1, max: 2 };

// ---------------------------------------------------------------------------
// Catalog entries
// ---------------------------------------------------------------------------

/// A selectable scene with its casting and pricing metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    /// Stable identifier used in every API payload.
    pub key: String,
    /// Human-readable name.
    pub title: String,
    /// Number of people featured in the scene. `1` puts the scene in
    /// single-photo mode, anything higher requires a pair.
    #[serde(default = "default_people")]
    pub people: u32,
    /// Price in whole roubles. `0` means the render is free.
    #[serde(default)]
    pub price_rub: u32,
    /// Target clip length in seconds, when the backend advertises it.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Backend-side scene family tag. Informational only.
    #[serde(default)]
    pub kind: Option<String>,
}

fn default_people() -> u32 {
    1
}

/// A selectable format, background, or music track. Only the key and the
/// display title matter on this side of the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    pub key: String,
    pub title: String,
}

/// The full option catalog as returned by `GET /catalog`.
///
/// Installed atomically: callers replace their previous catalog with a
/// freshly parsed one or keep what they had. Partial updates do not exist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub formats: Vec<CatalogItem>,
    #[serde(default)]
    pub backgrounds: Vec<CatalogItem>,
    #[serde(default)]
    pub music: Vec<CatalogItem>,
}

impl Catalog {
    /// Look up a scene by key.
    pub fn scene(&self, key: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.key == key)
    }

    /// Photo rule for the given scene key.
    ///
    /// Single-person scenes demand exactly one photo, everything else
    /// exactly two. Unknown keys fall back to [`FALLBACK_PHOTO_RULE`]
    /// instead of failing: the catalog may still be loading, or the scene
    /// may have been retired server-side.
    pub fn rule_for(&self, scene_key: &str) -> PhotoRule {
        match self.scene(scene_key) {
            Some(scene) if scene.people <= 1 => PhotoRule { required: 1, max: 1 },
            Some(_) => PhotoRule { required: 2, max: 2 },
            None => FALLBACK_PHOTO_RULE,
        }
    }

    /// Price in roubles for the given scene key. Unknown keys price at 0.
    pub fn price_for(&self, scene_key: &str) -> u32 {
        self.scene(scene_key).map(|s| s.price_rub).unwrap_or(0)
    }

    /// Whether `key` names a format present in the catalog.
    pub fn has_format(&self, key: &str) -> bool {
        self.formats.iter().any(|f| f.key == key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
