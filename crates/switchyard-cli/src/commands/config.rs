use std::path::Path;

use anyhow::{Context, bail};
use switchyard_core::SwitchyardConfig;

pub const CONFIG_FILE: &str = "switchyard.toml";

pub fn check(config_path: &str) -> anyhow::Result<()> {
    let config = SwitchyardConfig::from_file(Path::new(config_path))
        .with_context(|| format!("loading {config_path}"))?;
    config.validate()?;

    println!("✓ {config_path} is valid");
    println!("  project:  {}", config.project.name);
    println!("  switch:   {}", config.switch.switch_type);
    println!("  rules:    {}", config.validation_rules.len());
    match &config.environment {
        Some(env) => println!(
            "  template: {} in {}",
            env.kind,
            env.namespaces.first().map(String::as_str).unwrap_or("-")
        ),
        None => println!("  template: none (runs need an [environment] section)"),
    }
    Ok(())
}

/// Write a scaffold config into `dir`.
pub fn init(name: &str, dir: &str, force: bool) -> anyhow::Result<()> {
    let path = write_scaffold(name, Path::new(dir), force)?;
    println!("✓ Generated {}", path.display());
    Ok(())
}

fn write_scaffold(name: &str, dir: &Path, force: bool) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let toml = SwitchyardConfig::scaffold(name).to_toml_string()?;
    std::fs::write(&path, toml).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_round_trips_through_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scaffold("shop", dir.path(), false).unwrap();
        let config = SwitchyardConfig::from_file(&path).unwrap();
        assert_eq!(config.project.name, "shop");
        config.validate().unwrap();
        check(path.to_str().unwrap()).unwrap();
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        write_scaffold("shop", dir.path(), false).unwrap();
        assert!(write_scaffold("shop", dir.path(), false).is_err());
        assert!(write_scaffold("shop", dir.path(), true).is_ok());
    }
}
