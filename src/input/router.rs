//! Overlay-priority key dispatch and PTY byte encoding (spec §4.G).
//!
//! `key_to_bytes` is adapted directly from the teacher's
//! `handlers/keyboard.rs::key_to_bytes`, extended with cursor-key-mode
//! awareness for arrow keys (CSI `O` in application mode, CSI `[`
//! otherwise) since the teacher never tracked that emulator mode. The
//! overlay registry has no teacher counterpart — claudatui has a single
//! fixed modal stack rather than a priority-ordered handler chain — and is
//! grounded directly on the "small keyboard router" paragraph of spec §4.G.

use std::collections::BTreeMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::emulator::CursorKeyMode;

/// Encodes a key event into the bytes written to a focused PTY when no
/// binding claims it in `normal` mode (spec §4.G "Binding resolution").
pub fn key_to_bytes(key: KeyEvent, cursor_key_mode: CursorKeyMode) -> Vec<u8> {
    let arrow = |final_byte: u8| -> Vec<u8> {
        match cursor_key_mode {
            CursorKeyMode::Application => vec![0x1b, b'O', final_byte],
            CursorKeyMode::Normal => vec![0x1b, b'[', final_byte],
        }
    };

    match (key.code, key.modifiers) {
        (KeyCode::Char(c), KeyModifiers::NONE) => vec![c as u8],
        (KeyCode::Char(c), KeyModifiers::SHIFT) => vec![c.to_ascii_uppercase() as u8],
        (KeyCode::Char(c), KeyModifiers::CONTROL) => {
            let ctrl = (c.to_ascii_lowercase() as u8).wrapping_sub(b'a').wrapping_add(1);
            vec![ctrl]
        }
        (KeyCode::Enter, _) => vec![b'\r'],
        (KeyCode::Backspace, _) => vec![0x7f],
        (KeyCode::Tab, _) => vec![b'\t'],
        (KeyCode::BackTab, _) => vec![0x1b, b'[', b'Z'],
        (KeyCode::Esc, _) => vec![0x1b],
        (KeyCode::Up, _) => arrow(b'A'),
        (KeyCode::Down, _) => arrow(b'B'),
        (KeyCode::Right, _) => arrow(b'C'),
        (KeyCode::Left, _) => arrow(b'D'),
        (KeyCode::Home, _) => vec![0x1b, b'[', b'H'],
        (KeyCode::End, _) => vec![0x1b, b'[', b'F'],
        (KeyCode::PageUp, _) => vec![0x1b, b'[', b'5', b'~'],
        (KeyCode::PageDown, _) => vec![0x1b, b'[', b'6', b'~'],
        (KeyCode::Delete, _) => vec![0x1b, b'[', b'3', b'~'],
        _ => vec![],
    }
}

/// Wraps pasted text in bracketed-paste markers before writing it to the
/// focused PTY (spec §4.G "Bracketed paste").
pub fn wrap_bracketed_paste(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 12);
    out.extend_from_slice(b"\x1b[200~");
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\x1b[201~");
    out
}

/// Whether an overlay's handler claimed the key (spec §4.G "stopping at the
/// first one that returns handled").
pub type Handled = bool;

struct Overlay {
    priority: i32,
    handler: Box<dyn FnMut(KeyEvent) -> Handled>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OverlayHandle(u64);

/// Routes a key through registered modal overlays highest-priority-first;
/// the core mode machine is not itself an overlay and sits below all of
/// them (spec §4.G "Overlay priority").
pub struct KeyRouter {
    overlays: BTreeMap<u64, Overlay>,
    next_id: u64,
}

impl KeyRouter {
    pub fn new() -> Self {
        Self { overlays: BTreeMap::new(), next_id: 0 }
    }

    pub fn register(
        &mut self,
        priority: i32,
        handler: impl FnMut(KeyEvent) -> Handled + 'static,
    ) -> OverlayHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.overlays.insert(id, Overlay { priority, handler: Box::new(handler) });
        OverlayHandle(id)
    }

    pub fn unregister(&mut self, handle: OverlayHandle) {
        self.overlays.remove(&handle.0);
    }

    /// Tries every registered overlay highest-priority-first, returning
    /// `true` on the first one that claims the key. Ties broken by
    /// registration order (earlier registrations tried first).
    pub fn dispatch(&mut self, key: KeyEvent) -> Handled {
        let mut ids: Vec<u64> = self.overlays.keys().copied().collect();
        ids.sort_by(|a, b| {
            let pa = self.overlays[a].priority;
            let pb = self.overlays[b].priority;
            pb.cmp(&pa).then(a.cmp(b))
        });
        for id in ids {
            if let Some(overlay) = self.overlays.get_mut(&id) {
                if (overlay.handler)(key) {
                    return true;
                }
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}

impl Default for KeyRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn arrow_keys_switch_csi_final_byte_by_cursor_key_mode() {
        assert_eq!(
            key_to_bytes(KeyEvent::new(KeyCode::Up, KeyModifiers::NONE), CursorKeyMode::Normal),
            vec![0x1b, b'[', b'A']
        );
        assert_eq!(
            key_to_bytes(KeyEvent::new(KeyCode::Up, KeyModifiers::NONE), CursorKeyMode::Application),
            vec![0x1b, b'O', b'A']
        );
    }

    #[test]
    fn wrap_bracketed_paste_surrounds_text_with_markers() {
        let wrapped = wrap_bracketed_paste("hi");
        assert_eq!(wrapped, b"\x1b[200~hi\x1b[201~");
    }

    #[test]
    fn higher_priority_overlay_is_tried_first_and_stops_dispatch() {
        let mut router = KeyRouter::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let low_calls = calls.clone();
        router.register(1, move |_k| {
            low_calls.borrow_mut().push("low");
            false
        });
        let high_calls = calls.clone();
        router.register(10, move |_k| {
            high_calls.borrow_mut().push("high");
            true
        });

        assert!(router.dispatch(key('x')));
        assert_eq!(*calls.borrow(), vec!["high"], "low-priority handler must not run once high claims it");
    }

    #[test]
    fn unregistered_overlay_no_longer_receives_dispatch() {
        let mut router = KeyRouter::new();
        let handle = router.register(0, |_k| true);
        router.unregister(handle);
        assert!(!router.dispatch(key('x')));
    }
}
