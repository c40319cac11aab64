//! File-backed profile store
//!
//! There is no OS-level locking on the profile file, so every
//! read-modify-write cycle goes through the store's own mutex. Use one
//! store per file path. Updates rebuild the whole document in memory and
//! replace the file with a single write (temp file + rename), so readers
//! never observe a partially written line.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::document::{ProfileDocument, ProfileSetting};
use super::value::SettingValue;
use super::{
    default_profile_block, name_path, profile_number, profile_prefix, CAMERA_CHOICE_LEAF,
    CURRENT_PROFILE_PATH, DEFAULT_SCOPE, MOUNT_CHOICE_LEAF,
};
use crate::equipment::EquipmentDirectory;
use crate::error::ProfileError;

/// Profile number used when `/currentProfile` is missing or unreadable
const FALLBACK_PROFILE: i64 = 1;

/// CRUD and queries over one profile file
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProfileStore {
    /// Create a store for the file at `path`. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All settings as path → value. Empty if the file does not exist.
    pub fn read(&self) -> Result<BTreeMap<String, String>, ProfileError> {
        self.inspect(|doc| {
            let mut map = BTreeMap::new();
            for setting in doc.settings() {
                map.entry(setting.path.clone())
                    .or_insert_with(|| setting.value.clone());
            }
            map
        })
    }

    /// Value at `path`, if present
    pub fn get(&self, path: &str) -> Result<Option<String>, ProfileError> {
        self.inspect(|doc| doc.get(path).map(|s| s.value.clone()))
    }

    /// Set `path` to `value` with the default scope
    pub fn set(&self, path: &str, value: &str) -> Result<(), ProfileError> {
        self.set_with_scope(path, value, DEFAULT_SCOPE)
    }

    /// Set `path` to `value`, replacing an existing line in place or
    /// appending a new one. Creates the file (and its directory) if needed.
    ///
    /// Paths must start with `/` and hold no tab or line break; values
    /// must hold no line break.
    pub fn set_with_scope(&self, path: &str, value: &str, scope: i32) -> Result<(), ProfileError> {
        validate_path(path)?;
        validate_value(path, value)?;
        self.modify(|doc| {
            doc.set(path, value, scope);
            Ok(())
        })?;
        tracing::debug!("Set profile setting {} = {:?}", path, value);
        Ok(())
    }

    /// Remove the line with exactly this path. Returns whether one was removed.
    pub fn delete(&self, path: &str) -> Result<bool, ProfileError> {
        let removed = self.modify_existing(|doc| Ok(doc.remove(path)))?;
        Ok(removed > 0)
    }

    /// Settings whose path starts with `prefix`.
    ///
    /// This is a plain string prefix match: `/profile/2` also matches
    /// `/profile/20/...`. Use [`ProfileStore::profile_settings`] for an
    /// exact profile namespace.
    pub fn get_section(&self, prefix: &str) -> Result<BTreeMap<String, String>, ProfileError> {
        Ok(self
            .read()?
            .into_iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .collect())
    }

    /// Settings owned by profile `n` (paths containing `/profile/<n>/`)
    pub fn profile_settings(&self, n: u32) -> Result<BTreeMap<String, String>, ProfileError> {
        let prefix = profile_prefix(n);
        Ok(self
            .read()?
            .into_iter()
            .filter(|(path, _)| path.contains(&prefix))
            .collect())
    }

    /// Every profile number that owns at least one setting
    pub fn list_profiles(&self) -> Result<BTreeSet<u32>, ProfileError> {
        self.inspect(|doc| {
            doc.settings()
                .filter_map(|s| profile_number(&s.path))
                .collect()
        })
    }

    /// Profile number → name, for profiles that have a name leaf
    pub fn profile_names(&self) -> Result<BTreeMap<u32, String>, ProfileError> {
        self.inspect(|doc| {
            doc.settings()
                .filter_map(|s| {
                    let n = profile_number(&s.path)?;
                    (s.path == name_path(n)).then(|| (n, s.value.clone()))
                })
                .collect()
        })
    }

    /// Create profile `n`.
    ///
    /// With a template, only template entries inside `/profile/<n>/` are
    /// written; the rest are dropped. Without one, the default settings
    /// block is written. A supplied `name` always sets the name leaf.
    pub fn create_profile(
        &self,
        n: u32,
        name: Option<&str>,
        template: Option<&BTreeMap<String, String>>,
    ) -> Result<(), ProfileError> {
        validate_number(n)?;
        if let Some(name) = name {
            validate_name(name)?;
        }
        for (path, value) in template.into_iter().flatten() {
            validate_path(path)?;
            validate_value(path, value)?;
        }

        let prefix = profile_prefix(n);
        self.modify(|doc| {
            match template {
                Some(template) => {
                    for (path, value) in template {
                        if path.contains(&prefix) {
                            doc.set(path, value, DEFAULT_SCOPE);
                        } else {
                            tracing::debug!("Dropping template key {} outside profile {}", path, n);
                        }
                    }
                    if let Some(name) = name {
                        doc.set(&name_path(n), name, DEFAULT_SCOPE);
                    }
                }
                None => {
                    let name = name
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Profile {}", n));
                    for (path, value) in default_profile_block(n, &name) {
                        doc.set(&path, &value, DEFAULT_SCOPE);
                    }
                }
            }
            Ok(())
        })?;

        tracing::info!("Created profile {}", n);
        Ok(())
    }

    /// Copy profile `src` to `dst`.
    ///
    /// Every setting under `/profile/<src>/` is copied to the same relative
    /// path under `/profile/<dst>/` with its scope, type tag and value.
    /// Settings previously under `dst` are replaced. `new_name` overrides
    /// the copied name leaf. Returns the number of settings copied.
    pub fn duplicate_profile(
        &self,
        src: u32,
        dst: u32,
        new_name: Option<&str>,
    ) -> Result<usize, ProfileError> {
        if src == dst {
            return Err(ProfileError::InvalidArgument(format!(
                "source and destination are both profile {}",
                src
            )));
        }
        validate_number(src)?;
        validate_number(dst)?;
        if let Some(name) = new_name {
            validate_name(name)?;
        }

        let _guard = self.guard();
        let mut doc = self
            .load()?
            .ok_or_else(|| ProfileError::NotFound(format!("profile file {:?}", self.path)))?;

        let src_prefix = profile_prefix(src);
        let dst_prefix = profile_prefix(dst);

        let copies: Vec<ProfileSetting> = doc
            .settings()
            .filter(|s| s.path.contains(&src_prefix))
            .map(|s| ProfileSetting {
                path: s.path.replacen(&src_prefix, &dst_prefix, 1),
                ..s.clone()
            })
            .collect();

        if copies.is_empty() {
            return Err(ProfileError::NotFound(format!("profile {}", src)));
        }

        let copied = copies.len();
        doc.remove_where(|s| s.path.contains(&dst_prefix));
        for setting in copies {
            doc.upsert(setting);
        }

        if let Some(name) = new_name {
            let leaf = name_path(dst);
            let renamed = match doc.get(&leaf) {
                Some(existing) => ProfileSetting {
                    value: name.to_string(),
                    ..existing.clone()
                },
                None => ProfileSetting::new(leaf, name, DEFAULT_SCOPE),
            };
            doc.upsert(renamed);
        }

        self.save(&doc)?;
        tracing::info!("Duplicated profile {} to {} ({} settings)", src, dst, copied);
        Ok(copied)
    }

    /// Set the name leaf of an existing profile
    pub fn rename_profile(&self, n: u32, name: &str) -> Result<(), ProfileError> {
        validate_number(n)?;
        validate_name(name)?;

        let prefix = profile_prefix(n);
        let written = self.modify_existing(|doc| {
            if !doc.settings().any(|s| s.path.contains(&prefix)) {
                return Ok(0);
            }
            doc.set(&name_path(n), name, DEFAULT_SCOPE);
            Ok(1)
        })?;

        if written == 0 {
            return Err(ProfileError::NotFound(format!("profile {}", n)));
        }
        tracing::info!("Renamed profile {} to {:?}", n, name);
        Ok(())
    }

    /// Remove every setting under `/profile/<n>/`. Returns how many were removed.
    pub fn delete_profile(&self, n: u32) -> Result<usize, ProfileError> {
        let prefix = profile_prefix(n);
        let removed = self.modify_existing(|doc| Ok(doc.remove_where(|s| s.path.contains(&prefix))))?;
        if removed > 0 {
            tracing::info!("Deleted profile {} ({} settings)", n, removed);
        }
        Ok(removed)
    }

    /// Active profile number as stored; 1 when unset or not an integer
    pub fn get_current_profile(&self) -> Result<i64, ProfileError> {
        let value = self.get(CURRENT_PROFILE_PATH)?;
        Ok(value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(FALLBACK_PROFILE))
    }

    /// Record `n` as the active profile
    pub fn set_current_profile(&self, n: u32) -> Result<(), ProfileError> {
        validate_number(n)?;
        self.set(CURRENT_PROFILE_PATH, &n.to_string())
    }

    /// Record the directory's selected camera and mount as the device
    /// choices of existing profile `n`. Returns how many settings were written.
    pub fn record_equipment(
        &self,
        n: u32,
        directory: &dyn EquipmentDirectory,
    ) -> Result<usize, ProfileError> {
        validate_number(n)?;

        let prefix = profile_prefix(n);
        let choices: Vec<(String, String)> = [
            (CAMERA_CHOICE_LEAF, directory.selected_camera()),
            (MOUNT_CHOICE_LEAF, directory.selected_mount()),
        ]
        .into_iter()
        .filter_map(|(leaf, device)| Some((format!("{}{}", prefix, leaf), device?)))
        .collect();

        if choices.is_empty() {
            return Err(ProfileError::InvalidArgument(
                "no camera or mount selected".to_string(),
            ));
        }
        for (path, device) in &choices {
            validate_value(path, device)?;
        }

        let written = self.modify_existing(|doc| {
            if !doc.settings().any(|s| s.path.contains(&prefix)) {
                return Ok(0);
            }
            for (path, device) in &choices {
                doc.set(path, device, DEFAULT_SCOPE);
            }
            Ok(choices.len())
        })?;

        if written == 0 {
            return Err(ProfileError::NotFound(format!("profile {}", n)));
        }
        tracing::info!("Recorded equipment for profile {}", n);
        Ok(written)
    }

    /// All settings with guessed value types
    pub fn export_profile(&self) -> Result<BTreeMap<String, SettingValue>, ProfileError> {
        Ok(self
            .read()?
            .into_iter()
            .map(|(path, value)| {
                let typed = SettingValue::coerce(&value);
                (path, typed)
            })
            .collect())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read-only query under the lock
    fn inspect<T>(&self, query: impl FnOnce(&ProfileDocument) -> T) -> Result<T, ProfileError> {
        let _guard = self.guard();
        let doc = self.load()?.unwrap_or_default();
        Ok(query(&doc))
    }

    /// Read-modify-write under the lock, creating the file if needed
    fn modify<T>(
        &self,
        change: impl FnOnce(&mut ProfileDocument) -> Result<T, ProfileError>,
    ) -> Result<T, ProfileError> {
        let _guard = self.guard();
        let mut doc = self.load()?.unwrap_or_default();
        let out = change(&mut doc)?;
        self.save(&doc)?;
        Ok(out)
    }

    /// Read-modify-write of an existing file. A missing file, or a change
    /// that touched nothing, writes nothing and yields 0.
    fn modify_existing(
        &self,
        change: impl FnOnce(&mut ProfileDocument) -> Result<usize, ProfileError>,
    ) -> Result<usize, ProfileError> {
        let _guard = self.guard();
        let Some(mut doc) = self.load()? else {
            return Ok(0);
        };
        let changed = change(&mut doc)?;
        if changed > 0 {
            self.save(&doc)?;
        }
        Ok(changed)
    }

    fn load(&self) -> Result<Option<ProfileDocument>, ProfileError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(ProfileDocument::parse(&text))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                tracing::error!("Failed to read profile file {:?}: {}", self.path, e);
                Err(self.io_error(e))
            }
        }
    }

    fn save(&self, doc: &ProfileDocument) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                tracing::error!("Failed to create directory {:?}: {}", parent, e);
                self.io_error(e)
            })?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, doc.render())
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                tracing::error!("Failed to write profile file {:?}: {}", self.path, e);
                let _ = fs::remove_file(&tmp);
                self.io_error(e)
            })
    }

    fn io_error(&self, source: io::Error) -> ProfileError {
        ProfileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn validate_number(n: u32) -> Result<(), ProfileError> {
    if n < 1 {
        return Err(ProfileError::InvalidArgument(format!(
            "profile number must be at least 1, got {}",
            n
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ProfileError> {
    if name.trim().is_empty() {
        return Err(ProfileError::InvalidArgument(
            "profile name must not be empty".to_string(),
        ));
    }
    validate_value("profile name", name)
}

fn validate_path(path: &str) -> Result<(), ProfileError> {
    if !path.starts_with('/') {
        return Err(ProfileError::InvalidArgument(format!(
            "setting path must start with '/', got {:?}",
            path
        )));
    }
    if path.contains(|c| matches!(c, '\t' | '\n' | '\r')) {
        return Err(ProfileError::InvalidArgument(format!(
            "setting path must not contain tabs or line breaks: {:?}",
            path
        )));
    }
    Ok(())
}

/// Values may hold tabs (everything after the third field is the value)
/// but never a line break
fn validate_value(what: &str, value: &str) -> Result<(), ProfileError> {
    if value.contains(|c| matches!(c, '\n' | '\r')) {
        return Err(ProfileError::InvalidArgument(format!(
            "value for {} must not contain line breaks",
            what
        )));
    }
    Ok(())
}
