//! gl-core: Core abstractions and configuration for guidelink
//!
//! This crate provides the error taxonomy, configuration structures, the
//! guider profile store and the equipment directory contract shared by
//! the session layer and the CLI.

pub mod config;
pub mod equipment;
pub mod error;
pub mod profile;

pub use equipment::{EquipmentDirectory, MemoryEquipmentDirectory};
pub use error::{ErrorKind, GlError, ProfileError, SessionError};
pub use profile::{ProfileSetting, ProfileStore, SettingValue};
