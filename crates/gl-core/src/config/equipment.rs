//! Equipment lists used when no publishing process is available

use serde::{Deserialize, Serialize};

/// Cameras and mounts offered to `guidelink equipment`, with the
/// initially selected entry of each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentConfig {
    pub cameras: Vec<String>,
    pub mounts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_equipment_section() {
        let config: EquipmentConfig = toml::from_str(
            "cameras = [\"Simulator\", \"ZWO ASI120MM\"]\nmounts = [\"EQMOD\"]\ncamera = \"Simulator\"\n",
        )
        .unwrap();
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.camera.as_deref(), Some("Simulator"));
        assert_eq!(config.mount, None);
    }
}
