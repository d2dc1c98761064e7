//! Selection state and the rules pass.
//!
//! Every selection edit is followed by one rules pass that recomputes the
//! allowed formats and the photo requirement from the catalog. The pass
//! itself is pure; applying its consequences (format reverts, photo-set
//! truncation) is the workflow session's job.

use crate::catalog::{Catalog, PhotoRule};

/// The user's current picks, one key per catalog axis.
///
/// `music_key` may be empty: the service offers a silent render and the
/// backend accepts `""` as "no track".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub scene_key: String,
    pub format_key: String,
    pub background_key: String,
    pub music_key: String,
}

impl Selection {
    /// Default picks for a freshly installed catalog: the first entry of
    /// each list. Empty lists yield empty keys, which for music means the
    /// silent render.
    pub fn default_for(catalog: &Catalog) -> Self {
        Self {
            scene_key: catalog.scenes.first().map(|s| s.key.clone()).unwrap_or_default(),
            format_key: catalog.formats.first().map(|f| f.key.clone()).unwrap_or_default(),
            background_key: catalog
                .backgrounds
                .first()
                .map(|b| b.key.clone())
                .unwrap_or_default(),
            music_key: catalog.music.first().map(|m| m.key.clone()).unwrap_or_default(),
        }
    }
}

/// Scene-to-format coupling.
///
/// Some scenes only render correctly in one format (the sky scene is shot
/// vertically and needs the tall format). The coupling is deployment
/// configuration, not catalog data. An empty scene key disables it.
#[derive(Debug, Clone, Default)]
pub struct ScenePolicy {
    pub sky_scene_key: String,
    pub tall_format_key: String,
}

impl ScenePolicy {
    /// Format key the given scene is pinned to, if any.
    fn lock_for(&self, scene_key: &str) -> Option<&str> {
        if !self.sky_scene_key.is_empty() && scene_key == self.sky_scene_key {
            Some(self.tall_format_key.as_str())
        } else {
            None
        }
    }
}

/// Output of the rules pass for one selection against one catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRules {
    /// Format keys selectable under the current scene.
    pub allowed_formats: Vec<String>,
    /// Photo requirement for the current scene.
    pub photo_rule: PhotoRule,
    /// Format the scene pins the selection to, when the policy applies.
    pub locked_format: Option<String>,
}

impl SelectionRules {
    /// Recompute the rules for `selection`.
    ///
    /// A policy lock only takes effect when the pinned format actually
    /// exists in the catalog; pinning to a missing format would leave no
    /// valid pick at all.
    pub fn derive(selection: &Selection, catalog: &Catalog, policy: &ScenePolicy) -> Self {
        let photo_rule = catalog.rule_for(&selection.scene_key);
        let lock = policy
            .lock_for(&selection.scene_key)
            .filter(|key| catalog.has_format(key));

        match lock {
            Some(key) => Self {
                allowed_formats: vec![key.to_string()],
                photo_rule,
                locked_format: Some(key.to_string()),
            },
            None => Self {
                allowed_formats: catalog.formats.iter().map(|f| f.key.clone()).collect(),
                photo_rule,
                locked_format: None,
            },
        }
    }

    /// Whether `key` is a permitted format under these rules.
    pub fn is_format_allowed(&self, key: &str) -> bool {
        self.allowed_formats.iter().any(|k| k == key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        serde_json::from_str(
            r#"{
                "scenes": [
                    {"key": "sky", "title": "Sky", "people": 2},
                    {"key": "portrait", "title": "Portrait", "people": 1}
                ],
                "formats": [
                    {"key": "wide", "title": "16:9"},
                    {"key": "tall", "title": "9:16"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn sky_policy() -> ScenePolicy {
        ScenePolicy {
            sky_scene_key: "sky".into(),
            tall_format_key: "tall".into(),
        }
    }

    #[test]
    fn default_selection_takes_first_entries() {
        let selection = Selection::default_for(&catalog());
        assert_eq!(selection.scene_key, "sky");
        assert_eq!(selection.format_key, "wide");
        assert_eq!(selection.background_key, "");
        assert_eq!(selection.music_key, "");

        let empty = Selection::default_for(&Catalog::default());
        assert_eq!(empty.scene_key, "");
    }

    #[test]
    fn sky_scene_pins_tall_format() {
        let selection = Selection {
            scene_key: "sky".into(),
            format_key: "wide".into(),
            background_key: String::new(),
            music_key: String::new(),
        };
        let rules = SelectionRules::derive(&selection, &catalog(), &sky_policy());
        assert_eq!(rules.locked_format.as_deref(), Some("tall"));
        assert_eq!(rules.allowed_formats, vec!["tall".to_string()]);
        assert!(!rules.is_format_allowed("wide"));
    }

    #[test]
    fn other_scenes_allow_every_format() {
        let selection = Selection {
            scene_key: "portrait".into(),
            format_key: "wide".into(),
            background_key: String::new(),
            music_key: String::new(),
        };
        let rules = SelectionRules::derive(&selection, &catalog(), &sky_policy());
        assert_eq!(rules.locked_format, None);
        assert!(rules.is_format_allowed("wide"));
        assert!(rules.is_format_allowed("tall"));
    }

    #[test]
    fn empty_policy_never_locks() {
        let selection = Selection {
            scene_key: "sky".into(),
            format_key: "wide".into(),
            background_key: String::new(),
            music_key: String::new(),
        };
        let rules = SelectionRules::derive(&selection, &catalog(), &ScenePolicy::default());
        assert_eq!(rules.locked_format, None);
        assert_eq!(rules.allowed_formats.len(), 2);
    }

    #[test]
    fn lock_to_missing_format_is_ignored() {
        let selection = Selection {
            scene_key: "sky".into(),
            format_key: "wide".into(),
            background_key: String::new(),
            music_key: String::new(),
        };
        let policy = ScenePolicy {
            sky_scene_key: "sky".into(),
            tall_format_key: "cinema".into(),
        };
        let rules = SelectionRules::derive(&selection, &catalog(), &policy);
        assert_eq!(rules.locked_format, None);
        assert_eq!(rules.allowed_formats.len(), 2);
    }

    #[test]
    fn photo_rule_follows_scene() {
        let mut selection = Selection {
            scene_key: "portrait".into(),
            format_key: "wide".into(),
            background_key: String::new(),
            music_key: String::new(),
        };
        let rules = SelectionRules::derive(&selection, &catalog(), &sky_policy());
        assert_eq!(rules.photo_rule.required, 1);

        selection.scene_key = "sky".into();
        let rules = SelectionRules::derive(&selection, &catalog(), &sky_policy());
        assert_eq!(rules.photo_rule.required, 2);
    }
}
