//! User configuration model and loading.
//!
//! Every field has a default, so a partial `config.yml` only needs to name
//! the values it changes. Keys are camelCase.

use std::path::{Path, PathBuf};

use gitdeck_core::{DeckError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "GITDECK_CONFIG";

/// Default config path (`<config dir>/gitdeck/config.yml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gitdeck").join("config.yml"))
}

/// Root of the user configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default)]
    pub gui: GuiConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub refresher: RefresherConfig,
}

/// How the main and secondary panels share the main section.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MainPanelSplitMode {
    /// Side by side on wide terminals, stacked otherwise
    #[default]
    Flexible,
    /// Always side by side
    Horizontal,
    /// Always stacked
    Vertical,
}

/// Layout and scrolling behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuiConfig {
    /// Fraction of the width given to the side panels, in (0, 1).
    #[serde(default = "default_side_panel_width")]
    pub side_panel_width: f64,

    #[serde(default)]
    pub main_panel_split_mode: MainPanelSplitMode,

    /// Lines moved per scroll step.
    #[serde(default = "default_scroll_height")]
    pub scroll_height: u16,

    /// Allow scrolling until only a one-line margin remains.
    #[serde(default = "default_true")]
    pub scroll_past_bottom: bool,

    /// Give the focused side panel a larger share (accordion mode).
    #[serde(default)]
    pub expand_focused_side_panel: bool,

    /// Keep the newest streamed output in view until the user scrolls.
    #[serde(default = "default_true")]
    pub follow_streaming_output: bool,

    #[serde(default)]
    pub theme: ThemeConfig,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            side_panel_width: default_side_panel_width(),
            main_panel_split_mode: MainPanelSplitMode::default(),
            scroll_height: default_scroll_height(),
            scroll_past_bottom: true,
            expand_focused_side_panel: false,
            follow_streaming_output: true,
            theme: ThemeConfig::default(),
        }
    }
}

/// Panel colors. Values are color names (`green`, `lightblue`), indexed
/// colors (`208`) or hex (`#ff8800`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    #[serde(default = "default_active_border_color")]
    pub active_border_color: String,

    #[serde(default = "default_inactive_border_color")]
    pub inactive_border_color: String,

    #[serde(default = "default_selected_line_bg_color")]
    pub selected_line_bg_color: String,

    #[serde(default = "default_options_text_color")]
    pub options_text_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            active_border_color: default_active_border_color(),
            inactive_border_color: default_inactive_border_color(),
            selected_line_bg_color: default_selected_line_bg_color(),
            options_text_color: default_options_text_color(),
        }
    }
}

fn default_active_border_color() -> String {
    "green".to_string()
}

fn default_inactive_border_color() -> String {
    "reset".to_string()
}

fn default_selected_line_bg_color() -> String {
    "blue".to_string()
}

fn default_options_text_color() -> String {
    "blue".to_string()
}

fn default_side_panel_width() -> f64 {
    0.3333
}

fn default_scroll_height() -> u16 {
    2
}

fn default_true() -> bool {
    true
}

/// Git invocation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    #[serde(default)]
    pub paging: PagingConfig,
}

/// Pager used for diff-like output in the main panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PagingConfig {
    /// Value passed as `--color=<colorArg>`.
    #[serde(default = "default_color_arg")]
    pub color_arg: String,

    /// Pager command template; `{{columnWidth}}` is substituted.
    #[serde(default)]
    pub pager: String,

    /// Use GIT_PAGER / PAGER / core.pager instead of `pager`.
    #[serde(default)]
    pub use_config: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            color_arg: default_color_arg(),
            pager: String::new(),
            use_config: false,
        }
    }
}

fn default_color_arg() -> String {
    "always".to_string()
}

/// Background refresh timers, in seconds. Zero disables a timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefresherConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    #[serde(default = "default_fetch_interval")]
    pub fetch_interval: u64,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            fetch_interval: default_fetch_interval(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_fetch_interval() -> u64 {
    60
}

impl UserConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Otherwise `$GITDECK_CONFIG` is tried,
    /// then [`default_config_path`]; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        if let Some(env_path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load_from(Path::new(&env_path));
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeckError::config_not_found_with_source(path, e))?;
        let config = Self::parse(&content, path)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        // An empty file deserializes to `null`, which means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(content).map_err(|e| DeckError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let width = self.gui.side_panel_width;
        if !(width > 0.0 && width < 1.0) {
            return Err(DeckError::ConfigValidation {
                message: format!("gui.sidePanelWidth must be in (0, 1), got {width}"),
            });
        }

        if self.gui.scroll_height == 0 {
            return Err(DeckError::ConfigValidation {
                message: "gui.scrollHeight must be at least 1".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Result<UserConfig> {
        UserConfig::parse(yaml, Path::new("config.yml"))
    }

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert_eq!(config.gui.scroll_height, 2);
        assert!(config.gui.scroll_past_bottom);
        assert!(!config.gui.expand_focused_side_panel);
        assert_eq!(config.gui.main_panel_split_mode, MainPanelSplitMode::Flexible);
        assert_eq!(config.git.paging.color_arg, "always");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r##"
gui:
  sidePanelWidth: 0.2
  mainPanelSplitMode: horizontal
  scrollHeight: 5
  scrollPastBottom: false
  expandFocusedSidePanel: true
  followStreamingOutput: false
  theme:
    activeBorderColor: yellow
    selectedLineBgColor: "#303030"
git:
  paging:
    colorArg: never
    pager: "delta --width={{columnWidth}}"
    useConfig: false
refresher:
  refreshInterval: 0
  fetchInterval: 300
"##;
        let config = parse(yaml).unwrap();
        assert_eq!(config.gui.side_panel_width, 0.2);
        assert_eq!(config.gui.main_panel_split_mode, MainPanelSplitMode::Horizontal);
        assert_eq!(config.gui.scroll_height, 5);
        assert!(!config.gui.scroll_past_bottom);
        assert!(config.gui.expand_focused_side_panel);
        assert!(!config.gui.follow_streaming_output);
        assert_eq!(config.gui.theme.active_border_color, "yellow");
        assert_eq!(config.gui.theme.selected_line_bg_color, "#303030");
        assert_eq!(config.gui.theme.inactive_border_color, "reset");
        assert_eq!(config.git.paging.color_arg, "never");
        assert_eq!(config.git.paging.pager, "delta --width={{columnWidth}}");
        assert_eq!(config.refresher.refresh_interval, 0);
        assert_eq!(config.refresher.fetch_interval, 300);
    }

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let config = parse("gui:\n  scrollHeight: 7\n").unwrap();
        assert_eq!(config.gui.scroll_height, 7);
        assert_eq!(config.gui.side_panel_width, 0.3333);
        assert_eq!(config.refresher.fetch_interval, 60);
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(parse("   \n").unwrap(), UserConfig::default());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse("gui: [unterminated").unwrap_err();
        assert!(matches!(err, DeckError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_validate_side_panel_width_bounds() {
        for width in [0.0, 1.0, -0.5, 1.5] {
            let mut config = UserConfig::default();
            config.gui.side_panel_width = width;
            assert!(config.validate().is_err(), "width {width} should be rejected");
        }
    }

    #[test]
    fn test_validate_scroll_height() {
        let err = parse("gui:\n  scrollHeight: 0\n").unwrap_err();
        assert!(matches!(err, DeckError::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "gui:\n  mainPanelSplitMode: vertical").unwrap();

        let config = UserConfig::load(Some(&path)).unwrap();
        assert_eq!(config.gui.main_panel_split_mode, MainPanelSplitMode::Vertical);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let err = UserConfig::load(Some(&dir.path().join("nope.yml"))).unwrap_err();
        assert!(matches!(err, DeckError::ConfigNotFound { .. }));
    }

    #[test]
    #[serial]
    fn test_load_from_env_var() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.yml");
        std::fs::write(&path, "gui:\n  scrollHeight: 9\n").unwrap();

        // SAFETY: serialized with the other environment-touching tests
        unsafe { std::env::set_var(CONFIG_ENV_VAR, &path) };
        let config = UserConfig::load(None);
        unsafe { std::env::remove_var(CONFIG_ENV_VAR) };

        assert_eq!(config.unwrap().gui.scroll_height, 9);
    }
}
