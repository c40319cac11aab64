//! Guider equipment-profile file
//!
//! The guider keeps all of its settings in one flat text file:
//!
//! ```text
//! PHD Config 1
//! /currentProfile	1	1	2
//! /profile/2/name	1	1	Refractor
//! /profile/2/camera/binning	1	1	2
//! ```
//!
//! Each settings line has four tab-separated fields: path, scope,
//! type tag and value. Profiles own every path under `/profile/<n>/`.
//! The guider reads the file only at startup, so it can be edited while
//! the guider is not running.

use std::sync::OnceLock;

use regex::Regex;

mod document;
mod store;
mod value;

pub use document::{ProfileDocument, ProfileLine, ProfileSetting};
pub use store::ProfileStore;
pub use value::SettingValue;

/// Literal first line of the file
pub const HEADER: &str = "PHD Config 1";

/// Scope written for settings that do not specify one
pub const DEFAULT_SCOPE: i32 = 1;

/// Type tag written on every line we emit
pub const TYPE_TAG: i32 = 1;

/// Path of the active profile number
pub const CURRENT_PROFILE_PATH: &str = "/currentProfile";

/// Leaf under a profile prefix naming its camera driver
pub const CAMERA_CHOICE_LEAF: &str = "camera/LastMenuChoice";

/// Leaf under a profile prefix naming its mount driver
pub const MOUNT_CHOICE_LEAF: &str = "scope/LastMenuChoice";

/// `/profile/<n>/`, the namespace owned by profile `n`
pub fn profile_prefix(n: u32) -> String {
    format!("/profile/{}/", n)
}

/// Path of profile `n`'s name leaf
pub fn name_path(n: u32) -> String {
    format!("/profile/{}/name", n)
}

fn profile_segment() -> Option<&'static Regex> {
    static SEGMENT: OnceLock<Option<Regex>> = OnceLock::new();
    SEGMENT
        .get_or_init(|| Regex::new(r"/profile/(\d+)/").ok())
        .as_ref()
}

/// First profile number embedded in `path` as `/profile/<digits>/`
pub fn profile_number(path: &str) -> Option<u32> {
    profile_segment()?
        .captures_iter(path)
        .find_map(|caps| caps[1].parse().ok())
}

/// Settings synthesized for a new profile when no template is given
pub(crate) fn default_profile_block(n: u32, name: &str) -> Vec<(String, String)> {
    let prefix = profile_prefix(n);
    let leaf = |key: &str| format!("{}{}", prefix, key);

    vec![
        (name_path(n), name.to_string()),
        (leaf("camera/binning"), "1".to_string()),
        (leaf("camera/pixelsize"), "3.75".to_string()),
        (leaf("camera/TimeoutMs"), "15000".to_string()),
        (leaf("guider/StarMinSNR"), "6".to_string()),
        (leaf("guider/StarMinHFD"), "1.5".to_string()),
        (leaf("guider/FastRecenter"), "1".to_string()),
        (leaf("scope/CalibrationDistance"), "25".to_string()),
        (leaf("scope/MaxRaDuration"), "2500".to_string()),
        (leaf("scope/MaxDecDuration"), "2500".to_string()),
        (leaf("ExposureDurationMs"), "1000".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_number() {
        assert_eq!(profile_number("/profile/2/camera/binning"), Some(2));
        assert_eq!(profile_number("/profile/20/name"), Some(20));
        assert_eq!(profile_number("/currentProfile"), None);
        assert_eq!(profile_number("/profile/abc/name"), None);
        // Needs a trailing segment separator
        assert_eq!(profile_number("/profile/3"), None);
        // A later occurrence still counts
        assert_eq!(profile_number("/x/profile/y/profile/7/k"), Some(7));
        // Too large for a profile number
        assert_eq!(profile_number("/profile/99999999999/name"), None);
    }

    #[test]
    fn test_default_block_lives_under_prefix() {
        let block = default_profile_block(4, "Guide scope");
        assert_eq!(block[0], ("/profile/4/name".to_string(), "Guide scope".to_string()));
        assert!(block.iter().all(|(path, _)| path.starts_with("/profile/4/")));
    }
}
