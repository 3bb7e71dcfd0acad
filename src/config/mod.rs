//! Configuration (spec §6): a TOML file under `<config_dir>/openmux/` with a
//! `[ui]` table of tunables and a `[keybindings.<mode>]` table per input
//! mode. Replaces the teacher's JSON `Config`; the load/default/save shape
//! (`load()` falls back to `Default`, `save()` creates the parent dir then
//! writes) is kept as-is.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::LayoutMode;

/// `action → [key-combo…]` bindings for one input mode.
pub type ModeBindings = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ui: UiConfig,
    pub keybindings: HashMap<String, ModeBindings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub prefix_key: String,
    pub prefix_timeout_ms: u64,
    pub main_pane_ratio: f64,
    pub default_layout_mode: String,
    pub autosave_interval_ms: u64,
    pub scrollback_limit: usize,
    pub min_pane_width: u16,
    pub min_pane_height: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            prefix_key: "ctrl+b".to_string(),
            prefix_timeout_ms: 2000,
            main_pane_ratio: 0.5,
            default_layout_mode: "vertical".to_string(),
            autosave_interval_ms: 30_000,
            scrollback_limit: 2000,
            min_pane_width: 10,
            min_pane_height: 5,
        }
    }
}

impl UiConfig {
    /// Parses `default_layout_mode`, falling back to `vertical` for an
    /// unrecognized value rather than failing config load outright.
    pub fn parsed_default_layout_mode(&self) -> LayoutMode {
        match self.default_layout_mode.as_str() {
            "horizontal" => LayoutMode::Horizontal,
            "stacked" => LayoutMode::Stacked,
            _ => LayoutMode::Vertical,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ui: UiConfig::default(),
            keybindings: default_keybindings(),
        }
    }
}

fn mode_bindings(pairs: &[(&str, &[&str])]) -> ModeBindings {
    pairs
        .iter()
        .map(|(action, combos)| {
            (
                action.to_string(),
                combos.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}

fn default_keybindings() -> HashMap<String, ModeBindings> {
    let mut modes = HashMap::new();

    modes.insert("normal".to_string(), ModeBindings::new());

    modes.insert(
        "prefix".to_string(),
        mode_bindings(&[
            ("pane.new", &["c"]),
            ("pane.close", &["x"]),
            ("pane.zoom", &["z"]),
            ("pane.focus.north", &["k"]),
            ("pane.focus.south", &["j"]),
            ("pane.focus.east", &["l"]),
            ("pane.focus.west", &["h"]),
            ("layout.mode.vertical", &["v"]),
            ("layout.mode.horizontal", &["b"]),
            ("layout.mode.stacked", &["s"]),
            ("layout.cycle.next", &["tab"]),
            ("layout.cycle.prev", &["shift+tab"]),
            ("workspace.switch.1", &["1"]),
            ("workspace.switch.2", &["2"]),
            ("workspace.switch.3", &["3"]),
            ("workspace.switch.4", &["4"]),
            ("workspace.switch.5", &["5"]),
            ("workspace.switch.6", &["6"]),
            ("workspace.switch.7", &["7"]),
            ("workspace.switch.8", &["8"]),
            ("workspace.switch.9", &["9"]),
            ("session.picker.toggle", &["w"]),
            ("aggregate.toggle", &["a"]),
            ("search.open", &["/"]),
            ("clipboard.paste", &["]"]),
            ("console.toggle", &["`"]),
            ("app.quit", &["q"]),
            ("hints.toggle", &["?"]),
            ("mode.move", &["r"]),
            ("mode.cancel", &["escape"]),
        ]),
    );

    modes.insert(
        "move".to_string(),
        mode_bindings(&[
            ("pane.move.north", &["k", "up"]),
            ("pane.move.south", &["j", "down"]),
            ("pane.move.east", &["l", "right"]),
            ("pane.move.west", &["h", "left"]),
            ("mode.cancel", &["escape", "r"]),
        ]),
    );

    modes.insert(
        "search".to_string(),
        mode_bindings(&[
            ("search.next", &["ctrl+n"]),
            ("search.prev", &["ctrl+p"]),
            ("search.confirm", &["enter"]),
            ("search.cancel", &["escape"]),
            ("search.delete", &["backspace"]),
        ]),
    );

    modes
}

impl Config {
    /// Loads `config.toml`, returning `Default` when the file is absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("openmux"))
    }

    pub fn sessions_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("sessions"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.ui.prefix_key, "ctrl+b");
        assert_eq!(config.ui.prefix_timeout_ms, 2000);
        assert_eq!(config.ui.main_pane_ratio, 0.5);
        assert_eq!(config.ui.autosave_interval_ms, 30_000);
        assert_eq!(config.ui.scrollback_limit, 2000);
        assert_eq!(config.ui.min_pane_width, 10);
        assert_eq!(config.ui.min_pane_height, 5);
        assert!(matches!(
            config.ui.parsed_default_layout_mode(),
            LayoutMode::Vertical
        ));
    }

    #[test]
    fn default_keybindings_cover_every_mode() {
        let config = Config::default();
        for mode in ["normal", "prefix", "move", "search"] {
            assert!(config.keybindings.contains_key(mode));
        }
        assert_eq!(
            config.keybindings["prefix"]["pane.new"],
            vec!["c".to_string()]
        );
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.ui.prefix_key, config.ui.prefix_key);
        assert_eq!(
            parsed.keybindings["move"]["pane.move.north"],
            config.keybindings["move"]["pane.move.north"]
        );
    }

    #[test]
    fn unrecognized_layout_mode_falls_back_to_vertical() {
        let ui = UiConfig {
            default_layout_mode: "nonsense".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ui.parsed_default_layout_mode(),
            LayoutMode::Vertical
        ));
    }

    #[test]
    fn sessions_dir_is_nested_under_config_dir() {
        let config_dir = Config::config_dir().unwrap();
        let sessions_dir = Config::sessions_dir().unwrap();
        assert_eq!(sessions_dir, config_dir.join("sessions"));
    }
}
