//! Mouse handling (spec §4.G "Mouse"): click-to-focus, mouse-tracking
//! passthrough, drag-selection, and scrollback-cache scrolling.
//!
//! Grounded on the teacher's `handlers/mouse.rs` control flow (Down starts a
//! selection, Drag updates it, Up completes it, wheel scrolls), generalized
//! to hit-test against the layout engine's pane rects instead of a single
//! terminal pane, and to check the focused PTY's mouse-tracking mode before
//! falling back to selection at all.

use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};

use crate::emulator::MouseTrackingMode;
use crate::layout::{PaneId, Rect, Workspace};

const SCROLL_LINES: i32 = 3;

fn rect_contains(rect: Rect, col: u16, row: u16) -> bool {
    col >= rect.x && col < rect.x + rect.width && row >= rect.y && row < rect.y + rect.height
}

/// Finds the pane whose computed rect contains the given screen cell.
pub fn hit_test(ws: &Workspace, col: u16, row: u16) -> Option<(PaneId, Rect)> {
    ws.main
        .iter()
        .chain(ws.stack.iter())
        .find(|pane| rect_contains(pane.rect, col, row))
        .map(|pane| (pane.id.clone(), pane.rect))
}

/// Encodes a mouse event for a PTY with tracking enabled, in pane-local
/// 1-based coordinates. `None` for event kinds the protocol doesn't cover.
pub fn encode_mouse_event(mouse: MouseEvent, mode: MouseTrackingMode, pane_rect: Rect) -> Option<Vec<u8>> {
    let col = mouse.column.checked_sub(pane_rect.x)?.saturating_add(1);
    let row = mouse.row.checked_sub(pane_rect.y)?.saturating_add(1);

    let (button_code, is_release) = match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => (0, false),
        MouseEventKind::Down(MouseButton::Middle) => (1, false),
        MouseEventKind::Down(MouseButton::Right) => (2, false),
        MouseEventKind::Up(_) => (0, true),
        MouseEventKind::Drag(MouseButton::Left) => (32, false),
        MouseEventKind::ScrollUp => (64, false),
        MouseEventKind::ScrollDown => (65, false),
        _ => return None,
    };

    match mode {
        MouseTrackingMode::Sgr => {
            let suffix = if is_release { 'm' } else { 'M' };
            Some(format!("\x1b[<{button_code};{col};{row}{suffix}").into_bytes())
        }
        MouseTrackingMode::X10 => {
            let cb = u8::try_from(button_code + if is_release { 3 } else { 0 } + 32).ok()?;
            let cx = u8::try_from(col).ok()?.saturating_add(32);
            let cy = u8::try_from(row).ok()?.saturating_add(32);
            Some(vec![0x1b, b'[', b'M', cb, cx, cy])
        }
    }
}

/// What the main loop should do in response to a routed mouse event.
#[derive(Debug, Clone, PartialEq)]
pub enum MouseAction {
    ForwardBytes(Vec<u8>),
    SelectionStart { col: usize, row: usize },
    SelectionUpdate { col: usize, row: usize },
    SelectionComplete,
    ScrollLines(i32),
    None,
}

pub struct MouseRouting {
    /// Set whenever the click lands on a pane, regardless of what the rest
    /// of the event does (spec §4.G "Click focuses the pane under the cursor").
    pub focus: Option<PaneId>,
    pub action: MouseAction,
}

/// Routes one mouse event against the active workspace's current layout.
/// `tracking` and `alt_screen`/`scrollback_forwarding_active` describe the
/// state of the PTY under the cursor, fetched by the caller via
/// `PtyRegistry::with_emulator`.
pub fn route_mouse_event(
    mouse: MouseEvent,
    ws: &Workspace,
    tracking: Option<MouseTrackingMode>,
    alt_screen: bool,
    scrollback_forwarding_active: bool,
) -> MouseRouting {
    let Some((pane_id, pane_rect)) = hit_test(ws, mouse.column, mouse.row) else {
        return MouseRouting { focus: None, action: MouseAction::None };
    };

    let focus_on_click = matches!(mouse.kind, MouseEventKind::Down(_)).then(|| pane_id.clone());

    if matches!(mouse.kind, MouseEventKind::ScrollUp | MouseEventKind::ScrollDown) {
        if alt_screen && scrollback_forwarding_active {
            if let Some(bytes) = tracking.and_then(|mode| encode_mouse_event(mouse, mode, pane_rect)) {
                return MouseRouting { focus: focus_on_click, action: MouseAction::ForwardBytes(bytes) };
            }
        }
        let delta = if matches!(mouse.kind, MouseEventKind::ScrollUp) { -SCROLL_LINES } else { SCROLL_LINES };
        return MouseRouting { focus: focus_on_click, action: MouseAction::ScrollLines(delta) };
    }

    if let Some(bytes) = tracking.and_then(|mode| encode_mouse_event(mouse, mode, pane_rect)) {
        return MouseRouting { focus: focus_on_click, action: MouseAction::ForwardBytes(bytes) };
    }

    let local = |col: u16, row: u16| {
        (col.saturating_sub(pane_rect.x) as usize, row.saturating_sub(pane_rect.y) as usize)
    };

    let action = match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let (col, row) = local(mouse.column, mouse.row);
            MouseAction::SelectionStart { col, row }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            let (col, row) = local(mouse.column, mouse.row);
            MouseAction::SelectionUpdate { col, row }
        }
        MouseEventKind::Up(MouseButton::Left) => MouseAction::SelectionComplete,
        _ => MouseAction::None,
    };

    MouseRouting { focus: focus_on_click, action }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutEngine, LayoutMode};

    fn workspace() -> Workspace {
        let mut engine = LayoutEngine::new(10, 5, LayoutMode::Vertical, 0.5);
        engine.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        engine.new_pane(1, None, None);
        engine.new_pane(1, None, None);
        engine.workspace(1).unwrap().clone()
    }

    #[test]
    fn click_inside_a_pane_reports_focus_and_starts_selection_when_untracked() {
        let ws = workspace();
        let mouse = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 1,
            row: 1,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };
        let routing = route_mouse_event(mouse, &ws, None, false, false);
        assert!(routing.focus.is_some());
        assert!(matches!(routing.action, MouseAction::SelectionStart { .. }));
    }

    #[test]
    fn click_with_mouse_tracking_enabled_forwards_bytes_instead_of_selecting() {
        let ws = workspace();
        let mouse = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 1,
            row: 1,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };
        let routing = route_mouse_event(mouse, &ws, Some(MouseTrackingMode::Sgr), false, false);
        assert!(matches!(routing.action, MouseAction::ForwardBytes(_)));
    }

    #[test]
    fn scroll_without_alt_screen_scrolls_the_scrollback_cache_not_the_pty() {
        let ws = workspace();
        let mouse = MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 1,
            row: 1,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };
        let routing = route_mouse_event(mouse, &ws, Some(MouseTrackingMode::Sgr), false, true);
        assert_eq!(routing.action, MouseAction::ScrollLines(-SCROLL_LINES));
    }

    #[test]
    fn scroll_in_alt_screen_with_forwarding_active_forwards_to_pty() {
        let ws = workspace();
        let mouse = MouseEvent {
            kind: MouseEventKind::ScrollDown,
            column: 1,
            row: 1,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };
        let routing = route_mouse_event(mouse, &ws, Some(MouseTrackingMode::Sgr), true, true);
        assert!(matches!(routing.action, MouseAction::ForwardBytes(_)));
    }

    #[test]
    fn click_outside_every_pane_yields_no_action() {
        let ws = workspace();
        let mouse = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 200,
            row: 200,
            modifiers: crossterm::event::KeyModifiers::NONE,
        };
        let routing = route_mouse_event(mouse, &ws, None, false, false);
        assert!(routing.focus.is_none());
        assert_eq!(routing.action, MouseAction::None);
    }
}
