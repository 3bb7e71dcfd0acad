//! Key-combo grammar and binding resolution (spec §4.G, §6).
//!
//! Grounded on the teacher's `handlers/keyboard.rs`, which matches
//! `(KeyCode, KeyModifiers)` tuples directly against hardcoded patterns; this
//! module generalizes that into data — combos parsed from `config.toml` are
//! canonicalized into the same string shape a runtime `KeyEvent` encodes to,
//! so both sides compare as plain strings instead of nested match arms.

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::ModeBindings;

/// `(ctrl|alt|shift|super)+<key>`, modifiers canonicalized to this fixed
/// order on parse (spec §6 "Key-combo grammar").
const MODIFIER_ORDER: [&str; 4] = ["ctrl", "alt", "shift", "super"];

fn key_name(code: KeyCode) -> Option<String> {
    Some(match code {
        KeyCode::Char(c) => c.to_ascii_lowercase().to_string(),
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Esc => "escape".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::BackTab => "backtab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Delete => "delete".to_string(),
        KeyCode::Insert => "insert".to_string(),
        KeyCode::Home => "home".to_string(),
        KeyCode::End => "end".to_string(),
        KeyCode::PageUp => "pageup".to_string(),
        KeyCode::PageDown => "pagedown".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::F(n) => format!("f{n}"),
        _ => return None,
    })
}

/// Encodes a runtime key event into the same canonical string a configured
/// combo parses to, e.g. `ctrl+shift+b`.
pub fn encode_key_event(key: KeyEvent) -> Option<String> {
    let name = key_name(key.code)?;
    let mut parts = Vec::new();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        parts.push("ctrl");
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        parts.push("alt");
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        parts.push("shift");
    }
    if key.modifiers.contains(KeyModifiers::SUPER) {
        parts.push("super");
    }
    parts.push(name.as_str());
    Some(parts.join("+"))
}

/// Parses a raw combo from `config.toml` (e.g. `"Shift+Ctrl+A"`) into the
/// canonical lowercase, fixed-modifier-order string used for lookups.
pub fn canonicalize_combo(raw: &str) -> String {
    let mut modifiers: Vec<&str> = Vec::new();
    let mut key = "";
    for token in raw.split('+') {
        let lower_owned = token.to_ascii_lowercase();
        if MODIFIER_ORDER.contains(&lower_owned.as_str()) {
            modifiers.push(match lower_owned.as_str() {
                "ctrl" => "ctrl",
                "alt" => "alt",
                "shift" => "shift",
                _ => "super",
            });
        } else {
            key = token;
        }
    }
    modifiers.sort_by_key(|m| MODIFIER_ORDER.iter().position(|o| o == m).unwrap());
    let key_lower = key.to_ascii_lowercase();
    let mut result = modifiers.join("+");
    if !result.is_empty() {
        result.push('+');
    }
    result.push_str(&key_lower);
    result
}

/// Resolves `(mode, key event) -> action identifier` against the bindings
/// loaded from `config.toml` (spec §6 "Action identifiers").
pub struct Bindings {
    lookup: HashMap<(String, String), String>,
}

impl Bindings {
    pub fn from_config(modes: &HashMap<String, ModeBindings>) -> Self {
        let mut lookup = HashMap::new();
        for (mode, actions) in modes {
            for (action, combos) in actions {
                for combo in combos {
                    lookup.insert((mode.clone(), canonicalize_combo(combo)), action.clone());
                }
            }
        }
        Self { lookup }
    }

    pub fn resolve(&self, mode: &str, key: KeyEvent) -> Option<&str> {
        let combo = encode_key_event(key)?;
        self.lookup.get(&(mode.to_string(), combo)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_reorders_modifiers_into_fixed_order() {
        assert_eq!(canonicalize_combo("Shift+Ctrl+a"), "ctrl+shift+a");
        assert_eq!(canonicalize_combo("ctrl+b"), "ctrl+b");
        assert_eq!(canonicalize_combo("q"), "q");
    }

    #[test]
    fn encode_key_event_matches_canonicalized_config_combo() {
        let key = KeyEvent::new(KeyCode::Char('b'), KeyModifiers::CONTROL);
        let encoded = encode_key_event(key).unwrap();
        assert_eq!(encoded, canonicalize_combo("ctrl+b"));
    }

    #[test]
    fn resolve_finds_the_action_bound_in_the_given_mode() {
        let mut prefix = ModeBindings::new();
        prefix.insert("pane.new".to_string(), vec!["c".to_string()]);
        let mut modes = HashMap::new();
        modes.insert("prefix".to_string(), prefix);
        let bindings = Bindings::from_config(&modes);

        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(bindings.resolve("prefix", key), Some("pane.new"));
        assert_eq!(bindings.resolve("normal", key), None);
    }

    #[test]
    fn unbound_key_resolves_to_none() {
        let bindings = Bindings::from_config(&HashMap::new());
        let key = KeyEvent::new(KeyCode::Char('z'), KeyModifiers::NONE);
        assert_eq!(bindings.resolve("normal", key), None);
    }
}
