//! Equipment command implementations
//!
//! The device lists come from the `[equipment]` config section. Selections
//! made here last for one command; `apply` records them in a profile.

use anyhow::Result;

use gl_core::config::EquipmentConfig;
use gl_core::{EquipmentDirectory, GlError, MemoryEquipmentDirectory, ProfileError, ProfileStore};

use crate::output::{format_equipment, print_error, print_success};

/// Show the configured cameras and mounts
pub fn equipment_list(config: &EquipmentConfig) -> Result<()> {
    let directory = MemoryEquipmentDirectory::from_config(config);
    print_directory(&directory);
    Ok(())
}

fn print_directory(directory: &dyn EquipmentDirectory) {
    println!("Cameras:");
    println!(
        "{}",
        format_equipment("cameras", &directory.list_cameras(), directory.selected_camera_index())
    );
    println!("Mounts:");
    println!(
        "{}",
        format_equipment("mounts", &directory.list_mounts(), directory.selected_mount_index())
    );
}

/// Select devices by name and record them as profile `n`'s choices
pub fn equipment_apply(
    config: &EquipmentConfig,
    store: &ProfileStore,
    n: u32,
    camera: Option<&str>,
    mount: Option<&str>,
) -> Result<()> {
    let directory = MemoryEquipmentDirectory::from_config(config);

    match assign(&directory, store, n, camera, mount) {
        Ok(written) => {
            print_success(&format!(
                "Recorded {} device choice(s) in profile {}",
                written, n
            ));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to record equipment: {} [{}]", e, e.kind().tag()));
            Err(e.into())
        }
    }
}

fn assign(
    directory: &dyn EquipmentDirectory,
    store: &ProfileStore,
    n: u32,
    camera: Option<&str>,
    mount: Option<&str>,
) -> Result<usize, GlError> {
    if let Some(name) = camera {
        if !directory.select_camera_by_name(name) {
            return Err(ProfileError::InvalidArgument(format!("unknown camera {:?}", name)).into());
        }
    }
    if let Some(name) = mount {
        if !directory.select_mount_by_name(name) {
            return Err(ProfileError::InvalidArgument(format!("unknown mount {:?}", name)).into());
        }
    }
    Ok(store.record_equipment(n, directory)?)
}
