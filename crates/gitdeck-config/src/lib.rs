//! Configuration for gitdeck.
//!
//! The configuration is read once at startup from a YAML file; see
//! [`UserConfig::load`] for the lookup order.

pub mod user_config;

pub use user_config::{
    CONFIG_ENV_VAR, GitConfig, GuiConfig, MainPanelSplitMode, PagingConfig, RefresherConfig,
    ThemeConfig, UserConfig, default_config_path,
};
