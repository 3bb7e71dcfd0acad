//! `vt100`-backed implementation of the [`Emulator`](super::Emulator) trait.
//!
//! Grounded on the teacher's `session::manager::ManagedSession` (owns a
//! `vt100::Parser`, re-applies `set_scrollback` after every `process()` call
//! because the parser resets its view on new output) and
//! `session::types::screen_state_from_vt100` (the cell-by-cell extraction
//! loop over `screen.cell(row, col)`), generalized to produce [`DirtyUpdate`]
//! snapshots/diffs and absolute-offset scrollback reads instead of a single
//! "current screen" struct.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::cell::{self, Cell, CellAttrs, Color};
use crate::emulator::osc::{OscEvent, OscFilter};
use crate::emulator::{
    Cursor, CursorKeyMode, DirtyUpdate, Emulator, ModeFlags, MouseTrackingMode, ScrollState,
    SearchMatch, SearchOutcome,
};

/// Scans the (already OSC-filtered) byte stream for the private-mode CSI
/// sequences that flip alternate-screen / cursor-key / mouse-tracking /
/// in-band-resize state. `vt100::Parser` does not expose these beyond
/// alternate-screen, so the core tracks them itself the same way it already
/// tracks OSC sequences: a small byte-oriented state machine, resilient to
/// sequences split across writes.
struct ModeTracker {
    state: CsiState,
    params: String,
    flags: ModeFlags,
    mouse_sgr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CsiState {
    Normal,
    Escape,
    Csi,
}

impl ModeTracker {
    fn new() -> Self {
        Self {
            state: CsiState::Normal,
            params: String::new(),
            flags: ModeFlags::default(),
            mouse_sgr: false,
        }
    }

    fn observe(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match self.state {
                CsiState::Normal => {
                    if byte == 0x1b {
                        self.state = CsiState::Escape;
                    }
                }
                CsiState::Escape => {
                    if byte == b'[' {
                        self.state = CsiState::Csi;
                        self.params.clear();
                    } else {
                        self.state = CsiState::Normal;
                    }
                }
                CsiState::Csi => {
                    if byte == b'h' || byte == b'l' {
                        self.apply(byte == b'h');
                        self.state = CsiState::Normal;
                    } else if byte.is_ascii_digit() || byte == b';' || byte == b'?' {
                        self.params.push(byte as char);
                    } else {
                        // Any other final byte: not a mode we track, abandon.
                        self.state = CsiState::Normal;
                    }
                }
            }
        }
    }

    fn apply(&mut self, set: bool) {
        if !self.params.starts_with('?') {
            return;
        }
        for code in self.params[1..].split(';').filter_map(|s| s.parse::<u32>().ok()) {
            match code {
                1 => {
                    self.flags.cursor_key_mode = Some(if set {
                        CursorKeyMode::Application
                    } else {
                        CursorKeyMode::Normal
                    });
                }
                1000 | 1002 | 1003 => {
                    self.flags.mouse_tracking = if set {
                        Some(if self.mouse_sgr {
                            MouseTrackingMode::Sgr
                        } else {
                            MouseTrackingMode::X10
                        })
                    } else {
                        None
                    };
                }
                1006 => {
                    self.mouse_sgr = set;
                    if self.flags.mouse_tracking.is_some() {
                        self.flags.mouse_tracking = Some(if set {
                            MouseTrackingMode::Sgr
                        } else {
                            MouseTrackingMode::X10
                        });
                    }
                }
                2048 => {
                    self.flags.in_band_resize = set;
                }
                _ => {}
            }
        }
    }
}

pub struct Vt100Emulator {
    /// `RefCell`-wrapped so the read-only trait methods (`get_line`,
    /// `get_scrollback_line`, `scrollback_len`) can temporarily move the
    /// scrollback view to satisfy `vt100`'s `&mut self` scrollback API
    /// without requiring `&mut self` themselves, restoring it before
    /// returning.
    parser: RefCell<vt100::Parser>,
    osc: OscFilter,
    modes: ModeTracker,
    title: String,
    scrollback_cap: usize,
    /// Absolute scrollback offset the consumer last asked to view (0 = live).
    view_offset: usize,
    /// Per-row hash of the last emitted snapshot, for incremental diffing.
    last_rows: Option<Vec<u64>>,
    last_scrollback_len: usize,
    first_update: bool,
}

fn row_hash(cells: &[Cell]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for c in cells {
        c.ch.hash(&mut hasher);
        c.fg.r.hash(&mut hasher);
        c.fg.g.hash(&mut hasher);
        c.fg.b.hash(&mut hasher);
        c.bg.r.hash(&mut hasher);
        c.bg.g.hash(&mut hasher);
        c.bg.b.hash(&mut hasher);
        c.attrs.to_bits().hash(&mut hasher);
        c.width.hash(&mut hasher);
    }
    hasher.finish()
}

impl Vt100Emulator {
    pub fn new(rows: u16, cols: u16, scrollback_cap: usize) -> Self {
        Self {
            parser: RefCell::new(vt100::Parser::new(rows, cols, scrollback_cap)),
            osc: OscFilter::new(),
            modes: ModeTracker::new(),
            title: String::new(),
            scrollback_cap,
            view_offset: 0,
            last_rows: None,
            last_scrollback_len: 0,
            first_update: true,
        }
    }

    fn set_view(&self, offset: usize) {
        self.parser.borrow_mut().set_scrollback(offset);
    }

    /// Total retained scrollback lines. `vt100::Screen::scrollback()` reports
    /// the *effective* (clamped) offset after `set_scrollback`, so asking for
    /// an enormous offset and reading the clamped result back is how the
    /// total is learned — the same clamping behavior the teacher's code
    /// already relies on when re-applying `scroll_offset` after `process()`.
    fn total_scrollback_len(&self) -> usize {
        self.set_view(usize::MAX);
        let total = self.parser.borrow().screen().scrollback();
        self.set_view(self.view_offset);
        total
    }

    fn read_row(&self, screen_row: usize) -> Vec<Cell> {
        let parser = self.parser.borrow();
        let screen = parser.screen();
        let (_, cols) = screen.size();
        let mut cells = Vec::with_capacity(cols as usize);
        let mut col = 0u16;
        while col < cols {
            let Some(vtcell) = screen.cell(screen_row as u16, col) else {
                cells.push(Cell::default());
                col += 1;
                continue;
            };
            let wide = vtcell.is_wide();
            let fg = vt100_color_to_rgb(vtcell.fgcolor());
            let bg = vt100_color_to_rgb(vtcell.bgcolor());
            let ch = vtcell.contents().chars().next().unwrap_or(' ');
            cells.push(Cell {
                ch,
                fg,
                bg,
                attrs: CellAttrs {
                    bold: vtcell.bold(),
                    italic: vtcell.italic(),
                    underline: vtcell.underline(),
                    strike: false,
                    inverse: vtcell.inverse(),
                    blink: false,
                    dim: false,
                    invisible: false,
                },
                width: if wide { 2 } else { 1 },
                continuation: vtcell.is_wide_continuation(),
                hyperlink_id: None,
            });
            col += 1;
        }
        cells
    }

    fn cols(&self) -> usize {
        self.parser.borrow().screen().size().1 as usize
    }

    fn rows(&self) -> usize {
        self.parser.borrow().screen().size().0 as usize
    }
}

fn vt100_color_to_rgb(color: vt100::Color) -> Color {
    match color {
        vt100::Color::Default => Color::default(),
        vt100::Color::Idx(idx) => indexed_to_rgb(idx),
        vt100::Color::Rgb(r, g, b) => Color::new(r, g, b),
    }
}

fn indexed_to_rgb(idx: u8) -> Color {
    const BASE: [[u8; 3]; 16] = [
        [0, 0, 0],
        [205, 0, 0],
        [0, 205, 0],
        [205, 205, 0],
        [0, 0, 238],
        [205, 0, 205],
        [0, 205, 205],
        [229, 229, 229],
        [127, 127, 127],
        [255, 0, 0],
        [0, 255, 0],
        [255, 255, 0],
        [92, 92, 255],
        [255, 0, 255],
        [0, 255, 255],
        [255, 255, 255],
    ];
    if (idx as usize) < 16 {
        let [r, g, b] = BASE[idx as usize];
        return Color::new(r, g, b);
    }
    if idx >= 232 {
        let level = 8 + (idx - 232) * 10;
        return Color::new(level, level, level);
    }
    let cube = idx - 16;
    let r = cube / 36;
    let g = (cube % 36) / 6;
    let b = cube % 6;
    let scale = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
    Color::new(scale(r), scale(g), scale(b))
}

impl Emulator for Vt100Emulator {
    fn write(&mut self, bytes: &[u8]) {
        let (filtered, events) = self.osc.filter(bytes);
        self.modes.observe(bytes);
        for event in events {
            if let OscEvent::Title(t) = event {
                self.title = t;
            }
        }
        self.parser.borrow_mut().process(&filtered);
        // vt100 resets its scrollback view on new output; restore ours.
        self.set_view(self.view_offset);
        self.modes.flags.alternate_screen = self.parser.borrow().screen().alternate_screen();
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.parser.borrow_mut().set_size(rows, cols);
    }

    fn reset(&mut self) {
        let (rows, cols) = self.parser.borrow().screen().size();
        self.parser = RefCell::new(vt100::Parser::new(rows, cols, self.scrollback_cap));
        self.view_offset = 0;
        self.last_rows = None;
        self.first_update = true;
    }

    fn cursor(&self) -> Cursor {
        let parser = self.parser.borrow();
        let screen = parser.screen();
        let (row, col) = screen.cursor_position();
        Cursor {
            row,
            col,
            visible: !screen.hide_cursor(),
        }
    }

    fn is_alternate_screen(&self) -> bool {
        self.modes.flags.alternate_screen
    }

    fn cursor_key_mode(&self) -> CursorKeyMode {
        self.modes.flags.cursor_key_mode.unwrap_or(CursorKeyMode::Normal)
    }

    fn is_mouse_tracking(&self) -> Option<MouseTrackingMode> {
        self.modes.flags.mouse_tracking
    }

    fn in_band_resize(&self) -> bool {
        self.modes.flags.in_band_resize
    }

    fn get_line(&self, row: usize) -> Option<Vec<Cell>> {
        if row >= self.rows() {
            return None;
        }
        Some(self.read_row(row))
    }

    fn get_scrollback_line(&self, absolute_offset: usize) -> Option<Vec<Cell>> {
        let total = self.total_scrollback_len();
        if absolute_offset >= total {
            return None;
        }
        let lines_back = total - absolute_offset;
        self.set_view(lines_back);
        let row = self.read_row(0);
        self.set_view(self.view_offset);
        Some(row)
    }

    fn scrollback_len(&self) -> usize {
        self.total_scrollback_len()
    }

    fn get_dirty_update(&mut self, scroll_state: ScrollState) -> DirtyUpdate {
        let offset = match scroll_state {
            ScrollState::Live => 0,
            ScrollState::Scrollback(n) => n,
        };
        self.view_offset = offset;
        self.set_view(offset);

        let total = self.total_scrollback_len();
        let at_retention_limit = total >= self.scrollback_cap;
        let cursor = self.cursor();
        let modes = self.modes.flags;

        let rows = self.rows();
        let cols = self.cols();
        let mut current_rows = Vec::with_capacity(rows);
        let mut hashes = Vec::with_capacity(rows);
        for r in 0..rows {
            let cells = self.read_row(r);
            hashes.push(row_hash(&cells));
            current_rows.push(cells);
        }

        let scrollback_shrank = total < self.last_scrollback_len;
        self.last_scrollback_len = total;

        if self.first_update || scrollback_shrank || self.last_rows.as_ref().map(|h| h.len()) != Some(hashes.len()) {
            self.first_update = false;
            self.last_rows = Some(hashes);
            let packed = current_rows
                .iter()
                .map(|r| cell::pack_cells(r, cols))
                .collect();
            return DirtyUpdate::Full {
                rows: packed,
                cursor,
                modes,
                scrollback_len: total,
                at_retention_limit,
            };
        }

        let prev = self.last_rows.take().unwrap_or_default();
        let mut dirty = Vec::new();
        for (idx, (prev_hash, new_hash)) in prev.iter().zip(hashes.iter()).enumerate() {
            if prev_hash != new_hash {
                dirty.push((idx, cell::pack_cells(&current_rows[idx], cols)));
            }
        }
        self.last_rows = Some(hashes);

        DirtyUpdate::Incremental {
            rows: dirty,
            cursor,
            modes,
            scrollback_len: total,
            at_retention_limit,
        }
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        if query.is_empty() || limit == 0 {
            return SearchOutcome::default();
        }
        let query_lower = query.to_lowercase();
        let mut matches = Vec::new();
        let mut has_more = false;

        let total = self.total_scrollback_len();

        'outer: for absolute in 0..total {
            let row = match self.get_scrollback_line(absolute) {
                Some(r) => r,
                None => continue,
            };
            if let Some((start, end)) = find_substring(&row, &query_lower) {
                if matches.len() >= limit {
                    has_more = true;
                    break 'outer;
                }
                matches.push(SearchMatch {
                    line: absolute,
                    start_col: start,
                    end_col: end,
                });
            }
        }

        if matches.len() < limit {
            for r in 0..self.rows() {
                let row = self.read_row(r);
                if let Some((start, end)) = find_substring(&row, &query_lower) {
                    if matches.len() >= limit {
                        has_more = true;
                        break;
                    }
                    matches.push(SearchMatch {
                        line: total + r,
                        start_col: start,
                        end_col: end,
                    });
                }
            }
        }

        SearchOutcome { matches, has_more }
    }
}

fn find_substring(row: &[Cell], query_lower: &str) -> Option<(usize, usize)> {
    let text: String = row.iter().filter(|c| !c.continuation).map(|c| c.ch).collect();
    let text_lower = text.to_lowercase();
    let byte_pos = text_lower.find(query_lower)?;
    let start = text_lower[..byte_pos].chars().count();
    let end = start + query_lower.chars().count();
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_is_full() {
        let mut emu = Vt100Emulator::new(5, 10, 100);
        emu.write(b"hi");
        let update = emu.get_dirty_update(ScrollState::Live);
        assert!(matches!(update, DirtyUpdate::Full { .. }));
    }

    #[test]
    fn unchanged_rows_are_excluded_from_incremental_update() {
        let mut emu = Vt100Emulator::new(5, 10, 100);
        emu.write(b"hi");
        let _ = emu.get_dirty_update(ScrollState::Live);
        emu.write(b"!");
        let update = emu.get_dirty_update(ScrollState::Live);
        match update {
            DirtyUpdate::Incremental { rows, .. } => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].0, 0);
            }
            DirtyUpdate::Full { .. } => panic!("expected incremental update"),
        }
    }

    #[test]
    fn title_osc_updates_title_and_is_not_forwarded_to_parser() {
        let mut emu = Vt100Emulator::new(5, 10, 100);
        emu.write(b"\x1b]2;hello\x07");
        assert_eq!(emu.title(), "hello");
    }

    #[test]
    fn cursor_key_mode_tracks_decckm() {
        let mut emu = Vt100Emulator::new(5, 10, 100);
        assert_eq!(emu.cursor_key_mode(), CursorKeyMode::Normal);
        emu.write(b"\x1b[?1h");
        assert_eq!(emu.cursor_key_mode(), CursorKeyMode::Application);
        emu.write(b"\x1b[?1l");
        assert_eq!(emu.cursor_key_mode(), CursorKeyMode::Normal);
    }

    #[test]
    fn mouse_tracking_tracks_sgr_mode() {
        let mut emu = Vt100Emulator::new(5, 10, 100);
        assert_eq!(emu.is_mouse_tracking(), None);
        emu.write(b"\x1b[?1000h\x1b[?1006h");
        assert_eq!(emu.is_mouse_tracking(), Some(MouseTrackingMode::Sgr));
        emu.write(b"\x1b[?1000l");
        assert_eq!(emu.is_mouse_tracking(), None);
    }

    #[test]
    fn search_finds_case_insensitive_matches_in_live_rows() {
        let mut emu = Vt100Emulator::new(3, 20, 100);
        emu.write(b"hello\r\nHELLO WORLD\r\nHElla\r\n");
        let result = emu.search("hello", 10);
        assert!(result.matches.len() >= 2);
        for m in &result.matches {
            assert_eq!(m.start_col, 0);
        }
    }
}
