//! Profile file command implementations
//!
//! These work directly on the guider's profile file and need no guider
//! connection. The guider only re-reads the file at startup.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use gl_core::ProfileStore;

use crate::output::{format_profiles, format_settings, print_info, print_success, print_warning};

/// List profile numbers with their names
pub fn profile_list(store: &ProfileStore) -> Result<()> {
    let numbers = store.list_profiles()?;
    let names = store.profile_names()?;
    let current = store.get_current_profile()?;

    println!("{}", format_profiles(&numbers, &names, current));
    Ok(())
}

/// Print one setting
pub fn profile_get(store: &ProfileStore, path: &str) -> Result<()> {
    match store.get(path)? {
        Some(value) => println!("{}", value),
        None => anyhow::bail!("Setting not found: {}", path),
    }
    Ok(())
}

pub fn profile_set(store: &ProfileStore, path: &str, value: &str, scope: i32) -> Result<()> {
    store.set_with_scope(path, value, scope)?;
    print_success(&format!("Set {} = {}", path, value));
    Ok(())
}

pub fn profile_delete(store: &ProfileStore, path: &str) -> Result<()> {
    if store.delete(path)? {
        print_success(&format!("Deleted {}", path));
    } else {
        print_warning(&format!("No setting at {}", path));
    }
    Ok(())
}

/// Show settings by raw path prefix
pub fn profile_section(store: &ProfileStore, prefix: &str) -> Result<()> {
    println!("{}", format_settings(&store.get_section(prefix)?));
    Ok(())
}

/// Show every setting of profile `n`
pub fn profile_show(store: &ProfileStore, n: u32) -> Result<()> {
    let settings = store.profile_settings(n)?;
    if settings.is_empty() {
        anyhow::bail!("Profile {} not found", n);
    }
    println!("{}", format_settings(&settings));
    Ok(())
}

/// Create profile `n` from defaults or from a JSON template file
pub fn profile_create(
    store: &ProfileStore,
    n: u32,
    name: Option<&str>,
    template: Option<&Path>,
) -> Result<()> {
    let template = match template {
        Some(path) => Some(read_template(path)?),
        None => None,
    };

    store.create_profile(n, name, template.as_ref())?;
    print_success(&format!("Created profile {}", n));
    Ok(())
}

/// Read a template: a JSON object of path to value. Non-string values
/// are written in their JSON text form.
fn read_template(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file: {:?}", path))?;
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("Template {:?} is not a JSON object", path))?;

    Ok(raw
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            serde_json::Value::Bool(b) => (key, if b { "1" } else { "0" }.to_string()),
            other => (key, other.to_string()),
        })
        .collect())
}

pub fn profile_duplicate(
    store: &ProfileStore,
    src: u32,
    dst: u32,
    name: Option<&str>,
) -> Result<()> {
    let copied = store.duplicate_profile(src, dst, name)?;
    print_success(&format!(
        "Copied {} setting(s) from profile {} to profile {}",
        copied, src, dst
    ));
    Ok(())
}

pub fn profile_rename(store: &ProfileStore, n: u32, name: &str) -> Result<()> {
    store.rename_profile(n, name)?;
    print_success(&format!("Renamed profile {} to '{}'", n, name));
    Ok(())
}

pub fn profile_remove(store: &ProfileStore, n: u32) -> Result<()> {
    let removed = store.delete_profile(n)?;
    if removed == 0 {
        print_warning(&format!("Profile {} had no settings", n));
    } else {
        print_success(&format!("Removed profile {} ({} setting(s))", n, removed));
    }
    Ok(())
}

/// Print the current profile, or set it when `n` is given
pub fn profile_current(store: &ProfileStore, n: Option<u32>) -> Result<()> {
    match n {
        Some(n) => {
            if !store.list_profiles()?.contains(&n) {
                print_warning(&format!("Profile {} has no settings yet", n));
            }
            store.set_current_profile(n)?;
            print_success(&format!("Current profile set to {}", n));
            print_info("The guider picks this up on its next start");
        }
        None => println!("{}", store.get_current_profile()?),
    }
    Ok(())
}

/// Export every setting as typed JSON, to stdout or a file
pub fn profile_export(store: &ProfileStore, output: Option<&Path>) -> Result<()> {
    let exported = store.export_profile()?;
    let json = serde_json::to_string_pretty(&exported)?;

    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            print_success(&format!(
                "Exported {} setting(s) to {:?}",
                exported.len(),
                path
            ));
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_template_stringifies_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(
            &path,
            r#"{"/profile/3/name": "Rig", "/profile/3/camera/binning": 2, "/profile/3/guider/FastRecenter": true}"#,
        )
        .unwrap();

        let template = read_template(&path).unwrap();
        assert_eq!(template["/profile/3/name"], "Rig");
        assert_eq!(template["/profile/3/camera/binning"], "2");
        assert_eq!(template["/profile/3/guider/FastRecenter"], "1");
    }

    #[test]
    fn test_read_template_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(read_template(&path).is_err());
    }
}
