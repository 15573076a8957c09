use crate::timeouts::{ms, secs};
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub policy: UrlPolicy,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_disable_notifications")]
    pub disable_notifications: bool,
}

/// Immutable per-run settings handed to the orchestrator.
///
/// Nothing here changes while a run is in progress; a new run gets a new
/// value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Pages visited per category unless the category sets its own cap.
    #[serde(default = "default_page_cap")]
    pub page_cap: u32,
    #[serde(default)]
    pub continue_on_obstacle_failure: bool,
    #[serde(default = "default_delay_min")]
    pub delay_min_ms: u64,
    #[serde(default = "default_delay_max")]
    pub delay_max_ms: u64,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_seconds: u64,
    /// Extra attempts after the first failed navigation.
    #[serde(default = "default_navigation_retries")]
    pub navigation_retries: u32,
    #[serde(default = "default_obstacle_attempts")]
    pub max_obstacle_attempts: u32,
    #[serde(default = "default_obstacle_backoff")]
    pub obstacle_backoff_ms: u64,
    #[serde(default = "default_next_control_timeout")]
    pub next_control_timeout_ms: u64,
    #[serde(default = "default_advance_timeout")]
    pub advance_timeout_ms: u64,
    #[serde(default = "default_content_timeout")]
    pub content_timeout_ms: u64,
    #[serde(default)]
    pub recheck_obstacles_per_page: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_diagnostics_enabled")]
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
}

/// Simple allow-list check applied before every navigation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct UrlPolicy {
    /// Hosts (and their subdomains) that may be visited. Empty allows any host.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Path prefixes that must never be visited.
    #[serde(default)]
    pub disallowed_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_json_pretty")]
    pub json_pretty: bool,
}

fn default_headless() -> bool {
    true
}
fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    800
}
fn default_disable_notifications() -> bool {
    true
}
fn default_page_cap() -> u32 {
    150
}
fn default_delay_min() -> u64 {
    ms::DELAY_MIN
}
fn default_delay_max() -> u64 {
    ms::DELAY_MAX
}
fn default_navigation_timeout() -> u64 {
    secs::NAVIGATION
}
fn default_navigation_retries() -> u32 {
    2
}
fn default_obstacle_attempts() -> u32 {
    3
}
fn default_obstacle_backoff() -> u64 {
    ms::OBSTACLE_BACKOFF
}
fn default_next_control_timeout() -> u64 {
    ms::NEXT_CONTROL
}
fn default_advance_timeout() -> u64 {
    ms::ADVANCE
}
fn default_content_timeout() -> u64 {
    ms::CONTENT_WAIT
}
fn default_diagnostics_enabled() -> bool {
    true
}
fn default_json_pretty() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: default_headless(),
            user_data_dir: None,
            user_agent: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            disable_notifications: default_disable_notifications(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            page_cap: default_page_cap(),
            continue_on_obstacle_failure: false,
            delay_min_ms: default_delay_min(),
            delay_max_ms: default_delay_max(),
            navigation_timeout_seconds: default_navigation_timeout(),
            navigation_retries: default_navigation_retries(),
            max_obstacle_attempts: default_obstacle_attempts(),
            obstacle_backoff_ms: default_obstacle_backoff(),
            next_control_timeout_ms: default_next_control_timeout(),
            advance_timeout_ms: default_advance_timeout(),
            content_timeout_ms: default_content_timeout(),
            recheck_obstacles_per_page: false,
        }
    }
}

impl RunConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_seconds)
    }

    pub fn next_control_timeout(&self) -> Duration {
        Duration::from_millis(self.next_control_timeout_ms)
    }

    pub fn advance_timeout(&self) -> Duration {
        Duration::from_millis(self.advance_timeout_ms)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }

    /// Uniformly jittered politeness delay within the configured range.
    pub fn politeness_delay(&self) -> Duration {
        let (lo, hi) = (self.delay_min_ms, self.delay_max_ms.max(self.delay_min_ms));
        Duration::from_millis(fastrand::u64(lo..=hi))
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_diagnostics_enabled(),
            dir: None,
            ledger_path: None,
        }
    }
}

impl DiagnosticsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("debug_snapshots"))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_pretty: default_json_pretty(),
        }
    }
}

/// Merged over the global file when present in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".listing-harvest.toml";

pub fn default_config_path() -> Result<PathBuf> {
    default_config_dir().map(|p| p.join("config.toml"))
}

pub fn default_config_dir() -> Result<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|p| p.join("listing-harvest"))
        .ok_or_else(|| HarvestError::ConfigError("Could not determine config directory".into()))
}

impl Config {
    pub fn load() -> Result<Self> {
        let global_path = default_config_path()?;
        let global = if global_path.exists() {
            Some(std::fs::read_to_string(&global_path)?)
        } else {
            None
        };

        let project_path = PathBuf::from(PROJECT_CONFIG_FILE);
        let project = if project_path.exists() {
            Some(std::fs::read_to_string(&project_path)?)
        } else {
            None
        };

        let mut config = Self::from_layers(global.as_deref(), project.as_deref())?;
        config.load_from_env();

        Ok(config)
    }

    /// Builds a config from the global file overlaid by the project file.
    /// Only keys the project file sets replace global ones; absent keys fall
    /// back to the global value, then to the default.
    pub fn from_layers(global: Option<&str>, project: Option<&str>) -> Result<Self> {
        let mut merged = match global {
            Some(content) => toml::from_str::<toml::Table>(content)?,
            None => toml::Table::new(),
        };
        if let Some(content) = project {
            overlay(&mut merged, toml::from_str::<toml::Table>(content)?);
        }
        Ok(toml::Value::Table(merged).try_into::<Self>()?)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.load_from_env();
        Ok(config)
    }

    pub fn load_with_overrides(&self, cli_overrides: ConfigOverrides) -> Self {
        let mut config = self.clone();

        if let Some(headless) = cli_overrides.headless {
            config.browser.headless = headless;
        }
        if let Some(chrome_path) = cli_overrides.chrome_path {
            config.browser.chrome_path = Some(chrome_path);
        }
        if let Some(timeout) = cli_overrides.timeout {
            config.run.navigation_timeout_seconds = timeout;
        }
        if let Some(page_cap) = cli_overrides.page_cap {
            config.run.page_cap = page_cap;
        }
        if let Some(continue_on_obstacle_failure) = cli_overrides.continue_on_obstacle_failure {
            config.run.continue_on_obstacle_failure = continue_on_obstacle_failure;
        }
        if let Some(dir) = cli_overrides.diagnostics_dir {
            config.diagnostics.dir = Some(dir);
        }

        config
    }

    fn load_from_env(&mut self) {
        if let Ok(path) = std::env::var("HARVEST_CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(path));
        }
        if let Ok(headless) = std::env::var("HARVEST_HEADLESS") {
            self.browser.headless = headless == "true" || headless == "1";
        }
        if let Ok(timeout) = std::env::var("HARVEST_TIMEOUT")
            && let Ok(timeout) = timeout.parse()
        {
            self.run.navigation_timeout_seconds = timeout;
        }
        if let Ok(cap) = std::env::var("HARVEST_PAGE_CAP")
            && let Ok(cap) = cap.parse()
        {
            self.run.page_cap = cap;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.navigation_timeout_seconds == 0 {
            return Err(HarvestError::ConfigError(
                "navigation_timeout_seconds must be greater than 0".into(),
            ));
        }

        if self.run.page_cap == 0 {
            return Err(HarvestError::ConfigError(
                "page_cap must be greater than 0".into(),
            ));
        }

        if self.run.max_obstacle_attempts == 0 {
            return Err(HarvestError::ConfigError(
                "max_obstacle_attempts must be greater than 0".into(),
            ));
        }

        if self.run.delay_min_ms > self.run.delay_max_ms {
            return Err(HarvestError::ConfigError(format!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                self.run.delay_min_ms, self.run.delay_max_ms
            )));
        }

        if self.run.advance_timeout_ms == 0 || self.run.next_control_timeout_ms == 0 {
            return Err(HarvestError::ConfigError(
                "pagination timeouts must be greater than 0".into(),
            ));
        }

        if let Some(ref path) = self.browser.chrome_path
            && !path.exists()
        {
            return Err(HarvestError::ConfigError(format!(
                "Chrome path does not exist: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn show_masked(&self) -> String {
        format!(
            r#"Browser:
  Chrome Path: {}
  Headless: {}
  User Agent: {}

Run:
  Page Cap: {}
  Continue On Obstacle Failure: {}
  Delay: {}-{}ms
  Navigation Timeout: {}s
  Navigation Retries: {}
  Obstacle Attempts: {}

Diagnostics:
  Enabled: {}
  Directory: {}

Policy:
  Allowed Domains: {}
  Disallowed Paths: {}
"#,
            self.browser
                .chrome_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "auto-detect".into()),
            self.browser.headless,
            self.browser.user_agent.as_deref().unwrap_or("default"),
            self.run.page_cap,
            self.run.continue_on_obstacle_failure,
            self.run.delay_min_ms,
            self.run.delay_max_ms,
            self.run.navigation_timeout_seconds,
            self.run.navigation_retries,
            self.run.max_obstacle_attempts,
            self.diagnostics.enabled,
            self.diagnostics.resolved_dir().display(),
            list_or_any(&self.policy.allowed_domains),
            list_or_none(&self.policy.disallowed_paths),
        )
    }
}

fn list_or_any(items: &[String]) -> String {
    if items.is_empty() {
        "any".into()
    } else {
        items.join(", ")
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".into()
    } else {
        items.join(", ")
    }
}

/// Recursively copies `layer` into `base`. Nested tables merge; any other
/// value (arrays included) replaces the base value.
fn overlay(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        if let toml::Value::Table(nested) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                overlay(existing, nested);
                continue;
            }
            base.insert(key, toml::Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub headless: Option<bool>,
    pub chrome_path: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub page_cap: Option<u32>,
    pub continue_on_obstacle_failure: Option<bool>,
    pub diagnostics_dir: Option<PathBuf>,
}
