//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use gl_core::config::{self, Config};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Show the configuration file, or the defaults when there is none
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults. Run 'guidelink config init' to write them out");
        println!();
        println!("{}", toml::to_string_pretty(&Config::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Get a config value by dotted key, e.g. `guider.retry.max_attempts`
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = resolve(config_path);
    let effective = config::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    let mut current = toml::Value::try_from(&effective)?;
    for part in key.split('.') {
        current = match current {
            toml::Value::Table(mut table) => match table.remove(part) {
                Some(value) => value,
                None => anyhow::bail!("Key not found: {}", key),
            },
            _ => anyhow::bail!("Key not found: {}", key),
        };
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(&current)?),
        other => println!("{}", other),
    }
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        anyhow::bail!("Refusing to overwrite {:?}", path);
    }

    write_default(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &Config::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        let loaded: Config = config::load_config(&path).unwrap();
        assert_eq!(loaded.guider.port(), 4400);
        assert_eq!(loaded.guider.retry.max_attempts, 3);
    }

    #[test]
    fn test_init_keeps_existing_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[guider]\nhost = \"obs\"\n").unwrap();

        assert!(config_init(Some(&path), false).is_err());
        assert!(std::fs::read_to_string(&path).unwrap().contains("obs"));

        config_init(Some(&path), true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("localhost"));
    }
}
