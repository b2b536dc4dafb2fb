use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::geometry::{Padding, Tightness};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPolarity {
    First,
    #[default]
    Second,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomaticScheme {
    #[default]
    LongestSide,
    Alternate,
    Spiral,
}

pub fn data_dir() -> PathBuf { dirs::home_dir().unwrap().join(".arbor") }
pub fn restore_file() -> PathBuf { data_dir().join("layout.json") }
pub fn config_file() -> PathBuf { dirs::home_dir().unwrap().join(".arbor.toml") }

fn yes() -> bool { true }
fn default_split_ratio() -> f64 { 0.5 }
fn default_border_width() -> u16 { 1 }
fn default_window_gap() -> u16 { 6 }
fn default_normal_border_color() -> u32 { 0x30302F }
fn default_active_border_color() -> u32 { 0x474645 }
fn default_focused_border_color() -> u32 { 0x817F7F }
fn default_presel_feedback_color() -> u32 { 0xF4D775 }

/// Process-wide settings. Per-monitor and per-desktop fields (padding,
/// gap, border width) seed new monitors and desktops and can then be
/// overridden on each one individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f64,
    #[serde(default = "default_border_width")]
    pub border_width: u16,
    #[serde(default = "default_window_gap")]
    pub window_gap: u16,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub monocle_padding: Padding,

    #[serde(default)]
    pub initial_polarity: InitialPolarity,
    #[serde(default)]
    pub automatic_scheme: AutomaticScheme,
    #[serde(default = "yes")]
    pub removal_adjustment: bool,

    #[serde(default)]
    pub single_monocle: bool,
    #[serde(default)]
    pub borderless_monocle: bool,
    #[serde(default)]
    pub borderless_singleton: bool,
    #[serde(default)]
    pub gapless_monocle: bool,
    #[serde(default)]
    pub center_pseudo_tiled: bool,
    #[serde(default)]
    pub honor_size_hints: bool,

    #[serde(default)]
    pub focus_follows_pointer: bool,
    #[serde(default)]
    pub pointer_follows_focus: bool,
    #[serde(default)]
    pub pointer_follows_monitor: bool,
    #[serde(default)]
    pub directional_focus_tightness: Tightness,

    #[serde(default)]
    pub remove_disabled_monitors: bool,
    #[serde(default)]
    pub remove_unplugged_monitors: bool,
    #[serde(default)]
    pub merge_overlapping_monitors: bool,

    #[serde(default = "yes")]
    pub hide_sticky: bool,
    #[serde(default = "yes")]
    pub presel_feedback: bool,
    #[serde(default = "yes")]
    pub auto_raise: bool,

    #[serde(default = "default_normal_border_color")]
    pub normal_border_color: u32,
    #[serde(default = "default_active_border_color")]
    pub active_border_color: u32,
    #[serde(default = "default_focused_border_color")]
    pub focused_border_color: u32,
    #[serde(default = "default_presel_feedback_color")]
    pub presel_feedback_color: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            split_ratio: default_split_ratio(),
            border_width: default_border_width(),
            window_gap: default_window_gap(),
            padding: Padding::default(),
            monocle_padding: Padding::default(),
            initial_polarity: InitialPolarity::default(),
            automatic_scheme: AutomaticScheme::default(),
            removal_adjustment: true,
            single_monocle: false,
            borderless_monocle: false,
            borderless_singleton: false,
            gapless_monocle: false,
            center_pseudo_tiled: false,
            honor_size_hints: false,
            focus_follows_pointer: false,
            pointer_follows_focus: false,
            pointer_follows_monitor: false,
            directional_focus_tightness: Tightness::default(),
            remove_disabled_monitors: false,
            remove_unplugged_monitors: false,
            merge_overlapping_monitors: false,
            hide_sticky: true,
            presel_feedback: true,
            auto_raise: true,
            normal_border_color: default_normal_border_color(),
            active_border_color: default_active_border_color(),
            focused_border_color: default_focused_border_color(),
            presel_feedback_color: default_presel_feedback_color(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Settings =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let issues = settings.validate();
        if !issues.is_empty() {
            bail!("invalid settings in {}: {}", path.display(), issues.join("; "));
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = toml::to_string_pretty(self).context("serializing settings")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(0.0..=1.0).contains(&self.split_ratio) {
            issues.push(format!("split_ratio {} is outside [0, 1]", self.split_ratio));
        } else if self.split_ratio == 0.0 || self.split_ratio == 1.0 {
            issues.push("split_ratio of 0 or 1 leaves one child without area".to_string());
        }
        for color in [
            self.normal_border_color,
            self.active_border_color,
            self.focused_border_color,
            self.presel_feedback_color,
        ] {
            if color > 0xFF_FF_FF {
                issues.push(format!("border color {color:#x} is not a 24-bit RGB value"));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Settings::default().validate().is_empty());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            window_gap = 10
            automatic_scheme = "spiral"
            [padding]
            top = 20
            "#,
        )
        .unwrap();
        assert_eq!(settings.window_gap, 10);
        assert_eq!(settings.automatic_scheme, AutomaticScheme::Spiral);
        assert_eq!(settings.padding.top, 20);
        assert_eq!(settings.padding.left, 0);
        assert_eq!(settings.split_ratio, 0.5);
        assert!(settings.removal_adjustment);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Settings>("no_such_setting = true").is_err());
    }

    #[test]
    fn out_of_range_ratio_is_reported() {
        let mut settings = Settings::default();
        settings.split_ratio = 1.5;
        assert!(!settings.validate().is_empty());
    }
}
