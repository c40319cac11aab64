//! Equipment directory contract
//!
//! The list of available cameras and mounts, the selected entry of each,
//! and per-camera integer options are published by a separate process.
//! guidelink only consumes that view through [`EquipmentDirectory`].
//! [`MemoryEquipmentDirectory`] is a process-local implementation used for
//! tests and for running without the publishing process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::EquipmentConfig;

/// Read/write view of the equipment lists and selections
pub trait EquipmentDirectory: Send + Sync {
    /// Camera names in display order
    fn list_cameras(&self) -> Vec<String>;

    /// Index of the selected camera, if any
    fn selected_camera_index(&self) -> Option<usize>;

    /// Select a camera; `false` if the index is out of range
    fn set_selected_camera_index(&self, index: usize) -> bool;

    /// Mount names in display order
    fn list_mounts(&self) -> Vec<String>;

    /// Index of the selected mount, if any
    fn selected_mount_index(&self) -> Option<usize>;

    /// Select a mount; `false` if the index is out of range
    fn set_selected_mount_index(&self, index: usize) -> bool;

    /// Integer option of the selected camera
    fn camera_option(&self, name: &str) -> Option<i64>;

    /// Set an integer option on the selected camera; `false` if no camera is selected
    fn set_camera_option(&self, name: &str, value: i64) -> bool;

    /// Name of the selected camera
    fn selected_camera(&self) -> Option<String> {
        let index = self.selected_camera_index()?;
        self.list_cameras().into_iter().nth(index)
    }

    /// Name of the selected mount
    fn selected_mount(&self) -> Option<String> {
        let index = self.selected_mount_index()?;
        self.list_mounts().into_iter().nth(index)
    }

    /// Select the camera with this exact name; `false` if there is none
    fn select_camera_by_name(&self, name: &str) -> bool {
        match self.list_cameras().iter().position(|c| c == name) {
            Some(index) => self.set_selected_camera_index(index),
            None => false,
        }
    }

    /// Select the mount with this exact name; `false` if there is none
    fn select_mount_by_name(&self, name: &str) -> bool {
        match self.list_mounts().iter().position(|m| m == name) {
            Some(index) => self.set_selected_mount_index(index),
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    cameras: Vec<String>,
    selected_camera: Option<usize>,
    mounts: Vec<String>,
    selected_mount: Option<usize>,
    /// (camera index, option name) → value
    camera_options: HashMap<(usize, String), i64>,
}

/// In-memory [`EquipmentDirectory`]
#[derive(Debug, Default)]
pub struct MemoryEquipmentDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryEquipmentDirectory {
    /// Create a directory with the given device lists and nothing selected
    pub fn new(cameras: Vec<String>, mounts: Vec<String>) -> Self {
        Self {
            state: Mutex::new(DirectoryState {
                cameras,
                mounts,
                ..DirectoryState::default()
            }),
        }
    }

    /// Directory holding the configured lists and selections. A configured
    /// selection that names no listed device is ignored.
    pub fn from_config(config: &EquipmentConfig) -> Self {
        let directory = Self::new(config.cameras.clone(), config.mounts.clone());
        if let Some(camera) = &config.camera {
            if !directory.select_camera_by_name(camera) {
                tracing::warn!("Configured camera {:?} is not in the camera list", camera);
            }
        }
        if let Some(mount) = &config.mount {
            if !directory.select_mount_by_name(mount) {
                tracing::warn!("Configured mount {:?} is not in the mount list", mount);
            }
        }
        directory
    }

    /// Replace the camera list. A selection that no longer fits is cleared.
    pub fn replace_cameras(&self, cameras: Vec<String>) {
        let mut state = self.state();
        if state.selected_camera.map_or(false, |i| i >= cameras.len()) {
            state.selected_camera = None;
        }
        state.cameras = cameras;
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EquipmentDirectory for MemoryEquipmentDirectory {
    fn list_cameras(&self) -> Vec<String> {
        self.state().cameras.clone()
    }

    fn selected_camera_index(&self) -> Option<usize> {
        self.state().selected_camera
    }

    fn set_selected_camera_index(&self, index: usize) -> bool {
        let mut state = self.state();
        if index >= state.cameras.len() {
            return false;
        }
        state.selected_camera = Some(index);
        true
    }

    fn list_mounts(&self) -> Vec<String> {
        self.state().mounts.clone()
    }

    fn selected_mount_index(&self) -> Option<usize> {
        self.state().selected_mount
    }

    fn set_selected_mount_index(&self, index: usize) -> bool {
        let mut state = self.state();
        if index >= state.mounts.len() {
            return false;
        }
        state.selected_mount = Some(index);
        true
    }

    fn camera_option(&self, name: &str) -> Option<i64> {
        let state = self.state();
        let camera = state.selected_camera?;
        state.camera_options.get(&(camera, name.to_string())).copied()
    }

    fn set_camera_option(&self, name: &str, value: i64) -> bool {
        let mut state = self.state();
        match state.selected_camera {
            Some(camera) => {
                state.camera_options.insert((camera, name.to_string()), value);
                true
            }
            None => false,
        }
    }
}
