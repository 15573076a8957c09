use crate::{
    HarvestError, Result,
    config::{Config, PROJECT_CONFIG_FILE, default_config_path},
    output::{self, text},
};
use serde::Serialize;
use std::path::PathBuf;

/// A config file location and whether `load()` would pick it up.
#[derive(Debug, Serialize)]
pub struct ConfigLocation {
    pub scope: &'static str,
    pub path: PathBuf,
    pub exists: bool,
}

impl ConfigLocation {
    fn locate(scope: &'static str, path: PathBuf) -> Self {
        let exists = path.is_file();
        Self { scope, path, exists }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigPaths {
    /// In load order: later entries override earlier ones.
    pub locations: Vec<ConfigLocation>,
}

#[derive(Debug, Serialize)]
pub struct ConfigCreated {
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub config: Config,
}

impl output::OutputFormatter for ConfigPaths {
    fn format_text(&self) -> String {
        self.locations
            .iter()
            .map(|loc| {
                let state = if loc.exists { "found" } else { "absent" };
                text::key_value(loc.scope, &format!("{} ({})", loc.path.display(), state))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

impl output::OutputFormatter for ConfigCreated {
    fn format_text(&self) -> String {
        text::success(&format!("Wrote default config to {}", self.path.display()))
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

impl output::OutputFormatter for ConfigShowResult {
    fn format_text(&self) -> String {
        self.config.show_masked()
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(&self.config, pretty)
    }
}

/// Writes the defaults to the global config path. Refuses to overwrite.
pub fn handle_config_init() -> Result<ConfigCreated> {
    let path = default_config_path()?;
    if path.exists() {
        return Err(HarvestError::ConfigError(format!(
            "Config file already exists at {}",
            path.display()
        )));
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    std::fs::write(&path, toml::to_string_pretty(&Config::default())?)?;
    tracing::debug!("created {}", path.display());

    Ok(ConfigCreated { path })
}

pub fn handle_config_show(config: &Config) -> ConfigShowResult {
    ConfigShowResult {
        config: config.clone(),
    }
}

pub fn handle_config_path() -> Result<ConfigPaths> {
    Ok(ConfigPaths {
        locations: vec![
            ConfigLocation::locate("Global", default_config_path()?),
            ConfigLocation::locate("Project", PathBuf::from(PROJECT_CONFIG_FILE)),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormatter;

    #[test]
    fn test_paths_text_marks_missing_files() {
        let paths = ConfigPaths {
            locations: vec![ConfigLocation::locate(
                "Project",
                PathBuf::from("/nonexistent/.listing-harvest.toml"),
            )],
        };
        let text = paths.format_text();
        assert!(text.contains("absent"));
        assert!(!paths.locations[0].exists);
    }

    #[test]
    fn test_show_json_is_the_config() {
        let result = handle_config_show(&Config::default());
        let json: serde_json::Value =
            serde_json::from_str(&result.format_json(false).unwrap()).unwrap();
        assert_eq!(json["run"]["page_cap"], 150);
    }
}
