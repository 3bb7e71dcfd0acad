//! Emulator surface (spec §4.B): abstracts VT parsing behind a polymorphic
//! contract so the core never implements its own parser. Grounded on the
//! teacher's `session::manager::ManagedSession`, which already wraps a
//! `vt100::Parser` and tracks scroll offset/lock the same way; generalized
//! here into a trait with one worker-thread-backed implementation, per the
//! "tagged variant, not open subclassing" guidance in spec §9.

mod osc;
mod vt100_emulator;

pub use osc::{OscEvent, OscFilter};
pub use vt100_emulator::Vt100Emulator;

use crate::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKeyMode {
    Normal,
    Application,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseTrackingMode {
    X10,
    Sgr,
}

/// Mode flags tracked per spec §4.B; a transition in any of these fires a
/// mode-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub alternate_screen: bool,
    pub cursor_key_mode: Option<CursorKeyMode>,
    pub mouse_tracking: Option<MouseTrackingMode>,
    pub in_band_resize: bool,
}

/// Where a consumer wants dirty rows measured from: the live viewport or an
/// absolute scrollback offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    Live,
    Scrollback(usize),
}

/// Either a full grid snapshot or an incremental set of dirty rows (spec §3).
#[derive(Debug, Clone)]
pub enum DirtyUpdate {
    Full {
        rows: Vec<crate::cell::PackedRow>,
        cursor: Cursor,
        modes: ModeFlags,
        scrollback_len: usize,
        at_retention_limit: bool,
    },
    Incremental {
        rows: Vec<(usize, crate::cell::PackedRow)>,
        cursor: Cursor,
        modes: ModeFlags,
        scrollback_len: usize,
        at_retention_limit: bool,
    },
}

impl DirtyUpdate {
    pub fn scrollback_len(&self) -> usize {
        match self {
            DirtyUpdate::Full { scrollback_len, .. }
            | DirtyUpdate::Incremental { scrollback_len, .. } => *scrollback_len,
        }
    }

    pub fn at_retention_limit(&self) -> bool {
        match self {
            DirtyUpdate::Full {
                at_retention_limit, ..
            }
            | DirtyUpdate::Incremental {
                at_retention_limit, ..
            } => *at_retention_limit,
        }
    }

    pub fn cursor(&self) -> Cursor {
        match self {
            DirtyUpdate::Full { cursor, .. } | DirtyUpdate::Incremental { cursor, .. } => *cursor,
        }
    }

    pub fn modes(&self) -> ModeFlags {
        match self {
            DirtyUpdate::Full { modes, .. } | DirtyUpdate::Incremental { modes, .. } => *modes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchOutcome {
    pub matches: Vec<SearchMatch>,
    pub has_more: bool,
}

/// The emulator capability set named in spec §4.B. One worker-backed
/// implementation ([`Vt100Emulator`]) exists; tests may swap in a stub.
pub trait Emulator: Send {
    fn write(&mut self, bytes: &[u8]);
    fn resize(&mut self, cols: u16, rows: u16);
    fn reset(&mut self);

    fn cursor(&self) -> Cursor;
    fn is_alternate_screen(&self) -> bool;
    fn cursor_key_mode(&self) -> CursorKeyMode;
    fn is_mouse_tracking(&self) -> Option<MouseTrackingMode>;
    fn in_band_resize(&self) -> bool;

    fn get_line(&self, row: usize) -> Option<Vec<Cell>>;
    fn get_scrollback_line(&self, absolute_offset: usize) -> Option<Vec<Cell>>;
    fn scrollback_len(&self) -> usize;

    /// Drains and clears the dirty accumulator. Per spec §4.B this is the
    /// single handshake: callers fan this result out to their own
    /// subscribers rather than each subscriber calling this independently.
    fn get_dirty_update(&mut self, scroll_state: ScrollState) -> DirtyUpdate;

    fn title(&self) -> String;

    fn search(&self, query: &str, limit: usize) -> SearchOutcome;
}
