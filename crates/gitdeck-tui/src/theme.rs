//! Colors used by the dashboard.

use std::str::FromStr;

use gitdeck_config::ThemeConfig;
use ratatui::style::{Color, Modifier, Style};
use tracing::warn;

/// Resolved color palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    /// Border of the focused window
    pub active_border: Color,
    pub inactive_border: Color,
    /// Background of the selected list line
    pub selected_line_bg: Color,
    /// Key hints in the info bar
    pub options_text: Color,
    pub information: Color,
    pub app_status: Color,
    pub search_prefix: Color,
    /// Secondary columns (author, upstream) in enlarged modes
    pub detail: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            active_border: Color::Green,
            inactive_border: Color::Reset,
            selected_line_bg: Color::Blue,
            options_text: Color::Blue,
            information: Color::Cyan,
            app_status: Color::Cyan,
            search_prefix: Color::Green,
            detail: Color::DarkGray,
        }
    }
}

impl Theme {
    /// Build from config, keeping the default for any color that fails to parse.
    pub fn from_config(config: &ThemeConfig) -> Self {
        let defaults = Self::default();
        Self {
            active_border: parse_color(
                "activeBorderColor",
                &config.active_border_color,
                defaults.active_border,
            ),
            inactive_border: parse_color(
                "inactiveBorderColor",
                &config.inactive_border_color,
                defaults.inactive_border,
            ),
            selected_line_bg: parse_color(
                "selectedLineBgColor",
                &config.selected_line_bg_color,
                defaults.selected_line_bg,
            ),
            options_text: parse_color(
                "optionsTextColor",
                &config.options_text_color,
                defaults.options_text,
            ),
            ..defaults
        }
    }

    pub fn border(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.active_border)
        } else {
            Style::default().fg(self.inactive_border)
        }
    }

    pub fn title(&self, focused: bool) -> Style {
        if focused {
            Style::default()
                .fg(self.active_border)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    }

    pub fn selected_line(&self) -> Style {
        Style::default()
            .bg(self.selected_line_bg)
            .add_modifier(Modifier::BOLD)
    }
}

fn parse_color(key: &str, value: &str, fallback: Color) -> Color {
    match Color::from_str(value.trim()) {
        Ok(color) => color,
        Err(_) => {
            warn!(key, value, "unknown color, using default");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_default_theme() {
        assert_eq!(Theme::from_config(&ThemeConfig::default()), Theme::default());
    }

    #[test]
    fn test_named_hex_and_indexed_colors() {
        let config = ThemeConfig {
            active_border_color: "yellow".into(),
            inactive_border_color: "8".into(),
            selected_line_bg_color: "#303030".into(),
            options_text_color: "magenta".into(),
        };
        let theme = Theme::from_config(&config);
        assert_eq!(theme.active_border, Color::Yellow);
        assert_eq!(theme.inactive_border, Color::Indexed(8));
        assert_eq!(theme.selected_line_bg, Color::Rgb(0x30, 0x30, 0x30));
        assert_eq!(theme.options_text, Color::Magenta);
    }

    #[test]
    fn test_invalid_color_falls_back() {
        let config = ThemeConfig {
            active_border_color: "not-a-color".into(),
            ..ThemeConfig::default()
        };
        assert_eq!(Theme::from_config(&config).active_border, Color::Green);
    }

    #[test]
    fn test_border_styles() {
        let theme = Theme::default();
        assert_eq!(theme.border(true).fg, Some(Color::Green));
        assert_eq!(theme.border(false).fg, Some(Color::Reset));
    }
}
