//! Packed-row wire format (spec §4.A, §6): the marshalling format between the
//! VT parser worker and the main loop / renderer.
//!
//! Layout, normative per spec: 12 × u32 per cell, little-endian.
//! `[bg.r, bg.g, bg.b, bg.a, fg.r, fg.g, fg.b, fg.a, codepoint, flags, reserved, reserved]`
//! where the eight color slots are `f32::to_bits()` of a 0..1 normalized
//! channel (background alpha is always 1.0; it is carried for symmetry with
//! the renderer's expected RGBA quad). Cells outside the ASCII
//! fast path go into a side overlay table keyed by column.

use crate::cell::{Cell, CellAttrs, Color};

const U32S_PER_CELL: usize = 12;
const FLAG_HAS_OVERLAY: u32 = 1;
const FLAG_SPACER: u32 = 2;

/// One non-fast-path cell, referenced by column index into the owning row.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry {
    pub column: usize,
    pub codepoint: u32,
    pub attrs: u8,
    pub fg: (u8, u8, u8),
    pub bg: (u8, u8, u8),
    pub width: u8,
    pub hyperlink_id: Option<u32>,
}

/// A packed row: `cols` cells' worth of fixed-stride data plus the overlay
/// side table for anything that didn't fit the fast path.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedRow {
    pub cols: usize,
    data: Vec<u32>,
    pub overlays: Vec<OverlayEntry>,
}

impl PackedRow {
    /// An all-default (space, default colors) row of the given width.
    pub fn blank(cols: usize) -> Self {
        pack_cells(&vec![Cell::default(); cols], cols)
    }

    fn cell_slots(&self, column: usize) -> &[u32] {
        &self.data[column * U32S_PER_CELL..(column + 1) * U32S_PER_CELL]
    }

    fn overlay_at(&self, column: usize) -> Option<&OverlayEntry> {
        self.overlays.iter().find(|o| o.column == column)
    }

    /// Raw little-endian byte buffer, the literal wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 4);
        for word in &self.data {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }
}

fn write_color(slots: &mut [u32], offset: usize, color: Color, alpha: f32) {
    let rgb = color.to_f32();
    slots[offset] = rgb[0].to_bits();
    slots[offset + 1] = rgb[1].to_bits();
    slots[offset + 2] = rgb[2].to_bits();
    slots[offset + 3] = alpha.to_bits();
}

fn read_color(slots: &[u32], offset: usize) -> Color {
    Color::from_f32([
        f32::from_bits(slots[offset]),
        f32::from_bits(slots[offset + 1]),
        f32::from_bits(slots[offset + 2]),
    ])
}

/// Encode a row of cells into its packed wire form. `cells.len()` must equal
/// `cols`; callers supply the continuation spacer cell for any width-2 glyph
/// per the invariant in spec §3.
pub fn pack_cells(cells: &[Cell], cols: usize) -> PackedRow {
    debug_assert_eq!(cells.len(), cols);

    let mut data = vec![0u32; cols * U32S_PER_CELL];
    let mut overlays = Vec::new();

    for (column, cell) in cells.iter().enumerate().take(cols) {
        let slots = &mut data[column * U32S_PER_CELL..(column + 1) * U32S_PER_CELL];

        if cell.continuation {
            write_color(slots, 0, cell.bg, 1.0);
            write_color(slots, 4, cell.bg, 1.0);
            slots[8] = 0;
            slots[9] = FLAG_SPACER;
            continue;
        }

        if cell.is_fast_path() {
            write_color(slots, 0, cell.bg, 1.0);
            write_color(slots, 4, cell.fg, 1.0);
            slots[8] = cell.ch as u32;
            slots[9] = 0;
        } else {
            // Inline slot is overwritten with a space and the cell's
            // background color (spec §4.A); the overlay carries the truth.
            write_color(slots, 0, cell.bg, 1.0);
            write_color(slots, 4, cell.bg, 1.0);
            slots[8] = ' ' as u32;
            slots[9] = FLAG_HAS_OVERLAY;

            overlays.push(OverlayEntry {
                column,
                codepoint: cell.ch as u32,
                attrs: cell.attrs.to_bits(),
                fg: (cell.fg.r, cell.fg.g, cell.fg.b),
                bg: (cell.bg.r, cell.bg.g, cell.bg.b),
                width: cell.width,
                hyperlink_id: cell.hyperlink_id,
            });
        }
    }

    PackedRow {
        cols,
        data,
        overlays,
    }
}

/// Decode a packed row back into cells, the inverse of [`pack_cells`].
/// Reuses `reuse`'s backing storage (truncating/extending as needed) to
/// avoid allocation churn when producing repeated row snapshots.
pub fn decode_packed_row(row: &PackedRow, reuse: Option<Vec<Cell>>) -> Vec<Cell> {
    let mut out = reuse.unwrap_or_default();
    out.clear();
    out.reserve(row.cols);

    for column in 0..row.cols {
        let slots = row.cell_slots(column);
        let flags = slots[9];

        let cell = if flags & FLAG_SPACER != 0 {
            Cell::spacer(read_color(slots, 0))
        } else if flags & FLAG_HAS_OVERLAY != 0 {
            let overlay = row
                .overlay_at(column)
                .expect("HAS_OVERLAY flag set without overlay entry");
            Cell {
                ch: char::from_u32(overlay.codepoint).unwrap_or('\u{fffd}'),
                fg: Color::new(overlay.fg.0, overlay.fg.1, overlay.fg.2),
                bg: Color::new(overlay.bg.0, overlay.bg.1, overlay.bg.2),
                attrs: CellAttrs::from_bits(overlay.attrs),
                width: overlay.width,
                continuation: false,
                hyperlink_id: overlay.hyperlink_id,
            }
        } else {
            Cell {
                ch: char::from_u32(slots[8]).unwrap_or(' '),
                fg: read_color(slots, 4),
                bg: read_color(slots, 0),
                attrs: CellAttrs::default(),
                width: 1,
                continuation: false,
                hyperlink_id: None,
            }
        };

        out.push(cell);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_row_has_no_overlays_and_round_trips() {
        let cells = vec![
            Cell {
                ch: ' ',
                ..Default::default()
            };
            80
        ];
        let packed = pack_cells(&cells, 80);
        assert_eq!(packed.overlays.len(), 0);
        let decoded = decode_packed_row(&packed, None);
        assert_eq!(decoded, cells);
    }

    #[test]
    fn non_ascii_and_attributed_cells_round_trip_via_overlay() {
        let mut cells = vec![Cell::default(); 4];
        cells[1] = Cell {
            ch: '中',
            width: 2,
            fg: Color::new(10, 20, 30),
            bg: Color::new(1, 2, 3),
            ..Default::default()
        };
        cells[2] = Cell::spacer(Color::new(1, 2, 3));
        cells[3] = Cell {
            ch: 'x',
            attrs: CellAttrs {
                bold: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let packed = pack_cells(&cells, 4);
        assert_eq!(packed.overlays.len(), 2);

        let decoded = decode_packed_row(&packed, None);
        assert_eq!(decoded, cells);
    }

    #[test]
    fn decode_reuses_supplied_buffer() {
        let cells = vec![Cell::default(); 10];
        let packed = pack_cells(&cells, 10);
        let mut reuse = Vec::with_capacity(64);
        reuse.push(Cell::default());
        let cap_before = reuse.capacity();
        let decoded = decode_packed_row(&packed, Some(reuse));
        assert_eq!(decoded.len(), 10);
        assert!(decoded.capacity() >= cap_before);
    }

    #[test]
    fn to_bytes_is_little_endian_and_sized_for_12_u32_per_cell() {
        let cells = vec![Cell::default(); 2];
        let packed = pack_cells(&cells, 2);
        let bytes = packed.to_bytes();
        assert_eq!(bytes.len(), 2 * U32S_PER_CELL * 4);
    }
}
