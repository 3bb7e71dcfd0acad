//! Master-stack layout engine (spec §4.E): one main pane plus an ordered
//! stack per workspace, geometry recomputed deterministically from a
//! viewport rectangle and a configurable main/stack ratio.
//!
//! No teacher file models a tree-based tiling layout (claudatui's
//! `ui::mosaic` tiles a flat N-pane grid with no main/stack distinction and
//! was dropped in the trim pass); this module is grounded on the geometry
//! formulas and operation semantics named directly in the spec, expressed as
//! a sum type over layout mode per the "tagged variant, not open
//! subclassing" guidance for bounded polymorphism.

use std::collections::HashMap;

use crate::pty::PtyId;

/// Identifies a pane: `"pane-<N>"` with a process-wide counter (spec §4.E).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaneId(String);

impl PaneId {
    fn from_counter(n: u64) -> Self {
        PaneId(format!("pane-{n}"))
    }

    /// Wraps an id already known valid, e.g. one just deserialized from a
    /// session file.
    pub fn from_raw(raw: String) -> Self {
        PaneId(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric suffix of a `"pane-<N>"` id, used to advance the
    /// allocator past ids loaded from disk (spec §4.E, "Layout IDs").
    pub fn numeric_suffix(&self) -> Option<u64> {
        self.0.strip_prefix("pane-")?.parse().ok()
    }
}

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Vertical,
    Horizontal,
    Stacked,
}

/// A computed rectangle in viewport cell coordinates. A pane with zero area
/// is hidden (zoomed-out or inactive stack entry in `stacked` mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn zero() -> Self {
        Rect::default()
    }

    pub fn is_hidden(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pane {
    pub id: PaneId,
    pub pty_id: Option<PtyId>,
    pub title: Option<String>,
    pub rect: Rect,
}

/// Which slot in a workspace's main/stack arrangement a pane occupies.
/// Identity swaps (`move_pane`, `swap_main`) exchange occupants between
/// slots rather than restructuring the tree, so geometry stays tied to slot
/// position and only needs recomputing when the tree itself changes shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Main,
    Stack(usize),
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: u8,
    pub main: Option<Pane>,
    pub stack: Vec<Pane>,
    pub focused_pane_id: Option<PaneId>,
    pub active_stack_index: usize,
    pub layout_mode: LayoutMode,
    pub zoomed: bool,
    pub main_pane_ratio: f64,
    viewport: Rect,
}

impl Workspace {
    fn new(id: u8, layout_mode: LayoutMode, main_pane_ratio: f64) -> Self {
        Self {
            id,
            main: None,
            stack: Vec::new(),
            focused_pane_id: None,
            active_stack_index: 0,
            layout_mode,
            zoomed: false,
            main_pane_ratio,
            viewport: Rect::zero(),
        }
    }

    /// Rebuilds a workspace from a session snapshot (spec §4.F); geometry is
    /// left at zero until the engine's `set_viewport` recomputes it.
    #[allow(clippy::too_many_arguments)]
    pub fn restored(
        id: u8,
        main: Option<Pane>,
        stack: Vec<Pane>,
        focused_pane_id: Option<PaneId>,
        active_stack_index: usize,
        layout_mode: LayoutMode,
        zoomed: bool,
        main_pane_ratio: f64,
    ) -> Self {
        Self {
            id,
            main,
            stack,
            focused_pane_id,
            active_stack_index,
            layout_mode,
            zoomed,
            main_pane_ratio,
            viewport: Rect::zero(),
        }
    }

    fn focused_slot(&self) -> Option<Slot> {
        let focused = self.focused_pane_id.as_ref()?;
        if self.main.as_ref().map(|p| &p.id) == Some(focused) {
            return Some(Slot::Main);
        }
        self.stack
            .iter()
            .position(|p| &p.id == focused)
            .map(Slot::Stack)
    }

    fn pane_at(&self, slot: Slot) -> Option<&Pane> {
        match slot {
            Slot::Main => self.main.as_ref(),
            Slot::Stack(i) => self.stack.get(i),
        }
    }

    fn pane_at_mut(&mut self, slot: Slot) -> Option<&mut Pane> {
        match slot {
            Slot::Main => self.main.as_mut(),
            Slot::Stack(i) => self.stack.get_mut(i),
        }
    }

    fn rect_at(&self, slot: Slot) -> Rect {
        self.pane_at(slot).map(|p| p.rect).unwrap_or_default()
    }

    /// The within-tree neighbor along `dir`, shared by `focus_direction`
    /// (pure navigation) and `move_pane`'s first step.
    fn adjacent_slot(&self, from: Slot, dir: Direction) -> Option<Slot> {
        let stack_len = self.stack.len();
        let to_active_stack = || {
            if stack_len == 0 {
                None
            } else {
                Some(Slot::Stack(self.active_stack_index.min(stack_len - 1)))
            }
        };
        match self.layout_mode {
            LayoutMode::Vertical | LayoutMode::Stacked => match (from, dir) {
                (Slot::Main, Direction::East) => to_active_stack(),
                (Slot::Stack(_), Direction::West) => self.main.as_ref().map(|_| Slot::Main),
                (Slot::Stack(i), Direction::North) if i > 0 => Some(Slot::Stack(i - 1)),
                (Slot::Stack(i), Direction::South) if i + 1 < stack_len => Some(Slot::Stack(i + 1)),
                _ => None,
            },
            LayoutMode::Horizontal => match (from, dir) {
                (Slot::Main, Direction::South) => to_active_stack(),
                (Slot::Stack(_), Direction::North) => self.main.as_ref().map(|_| Slot::Main),
                (Slot::Stack(i), Direction::West) if i > 0 => Some(Slot::Stack(i - 1)),
                (Slot::Stack(i), Direction::East) if i + 1 < stack_len => Some(Slot::Stack(i + 1)),
                _ => None,
            },
        }
    }

    fn all_slots(&self) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(1 + self.stack.len());
        if self.main.is_some() {
            slots.push(Slot::Main);
        }
        slots.extend((0..self.stack.len()).map(Slot::Stack));
        slots
    }
}

/// Owns every workspace's tree, geometry, and the two monotonic version
/// counters subscribers key expensive work off of.
pub struct LayoutEngine {
    workspaces: HashMap<u8, Workspace>,
    active_workspace: u8,
    next_pane_id: u64,
    min_pane_width: u16,
    min_pane_height: u16,
    default_layout_mode: LayoutMode,
    default_main_pane_ratio: f64,
    layout_version: u64,
    layout_geometry_version: u64,
}

impl LayoutEngine {
    pub fn new(
        min_pane_width: u16,
        min_pane_height: u16,
        default_layout_mode: LayoutMode,
        default_main_pane_ratio: f64,
    ) -> Self {
        Self {
            workspaces: HashMap::new(),
            active_workspace: 1,
            next_pane_id: 1,
            min_pane_width,
            min_pane_height,
            default_layout_mode,
            default_main_pane_ratio,
            layout_version: 0,
            layout_geometry_version: 0,
        }
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    pub fn layout_geometry_version(&self) -> u64 {
        self.layout_geometry_version
    }

    pub fn active_workspace_id(&self) -> u8 {
        self.active_workspace
    }

    pub fn switch_workspace(&mut self, id: u8) {
        self.active_workspace = id;
    }

    pub fn workspace(&self, id: u8) -> Option<&Workspace> {
        self.workspaces.get(&id)
    }

    pub fn workspace_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.workspaces.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Attaches a freshly spawned or reattached PTY to a loaded pane (used
    /// by session switching's reconcile step, spec §4.F).
    pub fn attach_pty(&mut self, workspace_id: u8, pane_id: &PaneId, pty_id: PtyId) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };
        if ws.main.as_ref().map(|p| &p.id) == Some(pane_id) {
            if let Some(p) = ws.main.as_mut() {
                p.pty_id = Some(pty_id);
            }
            return;
        }
        if let Some(p) = ws.stack.iter_mut().find(|p| &p.id == pane_id) {
            p.pty_id = Some(pty_id);
        }
    }

    /// Advances the pane-id counter past the highest id loaded from disk, so
    /// freshly created panes in a restored session never collide with ids
    /// that were persisted (spec §4.E, "Layout IDs").
    pub fn advance_id_counter_past(&mut self, max_seen: u64) {
        if max_seen >= self.next_pane_id {
            self.next_pane_id = max_seen + 1;
        }
    }

    /// Inserts a workspace restored from a session file, replacing any
    /// in-memory workspace with the same id.
    pub fn load_workspace(&mut self, workspace: Workspace) {
        self.workspaces.insert(workspace.id, workspace);
    }

    fn workspace_mut_or_insert(&mut self, id: u8) -> &mut Workspace {
        self.workspaces
            .entry(id)
            .or_insert_with(|| Workspace::new(id, self.default_layout_mode, self.default_main_pane_ratio))
    }

    pub fn set_viewport(&mut self, workspace_id: u8, viewport: Rect) {
        let ws = self.workspace_mut_or_insert(workspace_id);
        ws.viewport = viewport;
        self.recompute_geometry(workspace_id);
    }

    fn allocate_pane_id(&mut self) -> PaneId {
        let id = PaneId::from_counter(self.next_pane_id);
        self.next_pane_id += 1;
        id
    }

    pub fn new_pane(&mut self, workspace_id: u8, pty_id: Option<PtyId>, title: Option<String>) -> PaneId {
        let id = self.allocate_pane_id();
        let pane = Pane {
            id: id.clone(),
            pty_id,
            title,
            rect: Rect::zero(),
        };

        let ws = self.workspace_mut_or_insert(workspace_id);
        if ws.main.is_none() {
            ws.main = Some(pane);
        } else {
            ws.stack.push(pane);
            ws.active_stack_index = ws.stack.len() - 1;
        }
        ws.focused_pane_id = Some(id.clone());

        self.bump_structural(workspace_id);
        id
    }

    pub fn close_pane(&mut self, workspace_id: u8, pane_id: &PaneId) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };

        if ws.main.as_ref().map(|p| &p.id) == Some(pane_id) {
            ws.main = if ws.stack.is_empty() {
                None
            } else {
                Some(ws.stack.remove(0))
            };
            if ws.active_stack_index > 0 {
                ws.active_stack_index -= 1;
            }
        } else if let Some(idx) = ws.stack.iter().position(|p| &p.id == pane_id) {
            ws.stack.remove(idx);
        } else {
            return;
        }

        if ws.active_stack_index >= ws.stack.len() {
            ws.active_stack_index = ws.stack.len().saturating_sub(1);
        }

        ws.focused_pane_id = ws
            .main
            .as_ref()
            .map(|p| p.id.clone())
            .or_else(|| ws.stack.get(ws.active_stack_index).map(|p| p.id.clone()));

        self.bump_structural(workspace_id);
    }

    pub fn focus_direction(&mut self, workspace_id: u8, dir: Direction) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };
        let Some(from) = ws.focused_slot() else {
            return;
        };
        let Some(target) = ws.adjacent_slot(from, dir) else {
            return;
        };

        if let Slot::Stack(i) = target {
            ws.active_stack_index = i;
        }
        ws.focused_pane_id = ws.pane_at(target).map(|p| p.id.clone());
    }

    /// Sets `pane_id` as the workspace's focused pane directly, e.g. a mouse
    /// click landing on it (spec §4.G "Mouse": "click always reports focus").
    /// A no-op if `pane_id` isn't one of the workspace's current panes.
    pub fn focus_pane(&mut self, workspace_id: u8, pane_id: &PaneId) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };
        if ws.main.as_ref().map(|p| &p.id) == Some(pane_id) {
            ws.focused_pane_id = Some(pane_id.clone());
        } else if let Some(i) = ws.stack.iter().position(|p| &p.id == pane_id) {
            ws.active_stack_index = i;
            ws.focused_pane_id = Some(pane_id.clone());
        }
    }

    /// Exchanges the focused stack pane with main (spec §4.E `swap_main`).
    pub fn swap_main(&mut self, workspace_id: u8) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };
        if ws.main.is_none() || ws.stack.is_empty() {
            return;
        }
        let idx = match ws.focused_slot() {
            Some(Slot::Stack(i)) => i,
            _ => ws.active_stack_index,
        };
        let Some(main) = ws.main.as_mut() else { return };
        let Some(stack_pane) = ws.stack.get_mut(idx) else {
            return;
        };
        std::mem::swap(main, stack_pane);

        self.bump_structural(workspace_id);
    }

    /// Two-step strategy from spec §4.E: within-tree neighbor swap, then a
    /// geometry-score fallback over every other pane.
    pub fn move_pane(&mut self, workspace_id: u8, dir: Direction) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };
        let Some(from) = ws.focused_slot() else {
            return;
        };

        let target = ws
            .adjacent_slot(from, dir)
            .or_else(|| geometry_fallback(ws, from, dir));

        let Some(target) = target else {
            return;
        };
        if target == from {
            return;
        }

        let source_rect = ws.rect_at(from);
        let target_rect = ws.rect_at(target);
        let (a, b) = (from, target);

        // SAFETY of the split borrow: `a` and `b` are always distinct slots
        // referring to disjoint storage (Main vs a Stack index, or two
        // different Stack indices), so taking both mutably in turn is sound.
        let a_pane = ws.pane_at(a).cloned();
        let b_pane = ws.pane_at(b).cloned();
        if let (Some(mut a_pane), Some(mut b_pane)) = (a_pane, b_pane) {
            a_pane.rect = target_rect;
            b_pane.rect = source_rect;
            if let Some(slot) = ws.pane_at_mut(a) {
                *slot = b_pane;
            }
            if let Some(slot) = ws.pane_at_mut(b) {
                *slot = a_pane;
            }
        }

        if let Slot::Stack(i) = target {
            ws.active_stack_index = i;
        }
        // Focus stays with the same pane id; it now lives in `target`'s slot.

        self.bump_structural(workspace_id);
    }

    pub fn resize(&mut self, workspace_id: u8, dir: Direction, delta: f64) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };

        let (axis_matches, sign, extent) = match ws.layout_mode {
            LayoutMode::Horizontal => (
                matches!(dir, Direction::North | Direction::South),
                if dir == Direction::South { 1.0 } else { -1.0 },
                ws.viewport.height,
            ),
            LayoutMode::Vertical | LayoutMode::Stacked => (
                matches!(dir, Direction::East | Direction::West),
                if dir == Direction::East { 1.0 } else { -1.0 },
                ws.viewport.width,
            ),
        };
        if !axis_matches {
            return;
        }

        let min_extent = match ws.layout_mode {
            LayoutMode::Horizontal => self.min_pane_height,
            LayoutMode::Vertical | LayoutMode::Stacked => self.min_pane_width,
        };
        let min_ratio = if extent > 0 {
            f64::from(min_extent) / f64::from(extent)
        } else {
            0.0
        };
        let max_ratio = (1.0 - min_ratio).max(min_ratio);

        ws.main_pane_ratio = (ws.main_pane_ratio + sign * delta).clamp(min_ratio, max_ratio);

        self.recompute_geometry(workspace_id);
        self.layout_version += 1;
    }

    pub fn toggle_zoom(&mut self, workspace_id: u8) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };
        ws.zoomed = !ws.zoomed;
        self.bump_structural(workspace_id);
    }

    pub fn set_layout_mode(&mut self, workspace_id: u8, mode: LayoutMode) {
        let ws = self.workspace_mut_or_insert(workspace_id);
        ws.layout_mode = mode;
        self.bump_structural(workspace_id);
    }

    fn bump_structural(&mut self, workspace_id: u8) {
        self.layout_version += 1;
        self.recompute_geometry(workspace_id);
    }

    fn recompute_geometry(&mut self, workspace_id: u8) {
        let Some(ws) = self.workspaces.get_mut(&workspace_id) else {
            return;
        };

        let before: Vec<Rect> = ws
            .all_slots()
            .into_iter()
            .map(|s| ws.rect_at(s))
            .collect();

        let (main_rect, stack_rects) = compute_rects(ws, self.min_pane_width, self.min_pane_height);
        if let (Some(main), Some(pane)) = (main_rect, ws.main.as_mut()) {
            pane.rect = main;
        }
        for (rect, pane) in stack_rects.into_iter().zip(ws.stack.iter_mut()) {
            pane.rect = rect;
        }

        let after: Vec<Rect> = ws
            .all_slots()
            .into_iter()
            .map(|s| ws.rect_at(s))
            .collect();
        if before != after {
            self.layout_geometry_version += 1;
        }
    }
}

/// Geometry-score fallback: minimum positive score among every pane other
/// than the source, weighted so primary-axis distance dominates and
/// perpendicular-axis midpoint distance/overlap only break ties.
fn geometry_fallback(ws: &Workspace, from: Slot, dir: Direction) -> Option<Slot> {
    let source = ws.rect_at(from);
    let mut best: Option<(f64, Slot)> = None;

    for slot in ws.all_slots() {
        if slot == from {
            continue;
        }
        let candidate = ws.rect_at(slot);
        if candidate.is_hidden() {
            continue;
        }
        if let Some(score) = direction_score(source, candidate, dir) {
            if best.as_ref().map(|(s, _)| score < *s).unwrap_or(true) {
                best = Some((score, slot));
            }
        }
    }

    best.map(|(_, slot)| slot)
}

fn direction_score(source: Rect, candidate: Rect, dir: Direction) -> Option<f64> {
    let (primary, secondary, overlap) = match dir {
        Direction::North => {
            let primary = i64::from(source.y) - i64::from(candidate.y + candidate.height);
            if primary < 0 {
                return None;
            }
            (
                primary,
                (midpoint(source.x, source.width) - midpoint(candidate.x, candidate.width)).abs(),
                horizontal_overlap(source, candidate),
            )
        }
        Direction::South => {
            let primary = i64::from(candidate.y) - i64::from(source.y + source.height);
            if primary < 0 {
                return None;
            }
            (
                primary,
                (midpoint(source.x, source.width) - midpoint(candidate.x, candidate.width)).abs(),
                horizontal_overlap(source, candidate),
            )
        }
        Direction::West => {
            let primary = i64::from(source.x) - i64::from(candidate.x + candidate.width);
            if primary < 0 {
                return None;
            }
            (
                primary,
                (midpoint(source.y, source.height) - midpoint(candidate.y, candidate.height)).abs(),
                vertical_overlap(source, candidate),
            )
        }
        Direction::East => {
            let primary = i64::from(candidate.x) - i64::from(source.x + source.width);
            if primary < 0 {
                return None;
            }
            (
                primary,
                (midpoint(source.y, source.height) - midpoint(candidate.y, candidate.height)).abs(),
                vertical_overlap(source, candidate),
            )
        }
    };

    Some(primary as f64 * 1000.0 + secondary - overlap)
}

fn midpoint(origin: u16, extent: u16) -> f64 {
    f64::from(origin) + f64::from(extent) / 2.0
}

fn horizontal_overlap(a: Rect, b: Rect) -> f64 {
    let left = a.x.max(b.x);
    let right = (a.x + a.width).min(b.x + b.width);
    f64::from(right.saturating_sub(left))
}

fn vertical_overlap(a: Rect, b: Rect) -> f64 {
    let top = a.y.max(b.y);
    let bottom = (a.y + a.height).min(b.y + b.height);
    f64::from(bottom.saturating_sub(top))
}

/// Per-mode geometry formulas (spec §4.E). Returns `None` for main when
/// there is no main pane; stack rects are always `stack.len()` long, with
/// zero/hidden rects where `stacked` mode hides an inactive entry or
/// `zoomed` hides everything but the focused pane.
fn compute_rects(ws: &Workspace, min_w: u16, min_h: u16) -> (Option<Rect>, Vec<Rect>) {
    let viewport = ws.viewport;

    if ws.zoomed {
        if let Some(focused) = ws.focused_slot() {
            let mut main_rect = None;
            let mut stack_rects = vec![Rect::zero(); ws.stack.len()];
            match focused {
                Slot::Main => main_rect = Some(viewport),
                Slot::Stack(i) => {
                    if let Some(r) = stack_rects.get_mut(i) {
                        *r = viewport;
                    }
                }
            }
            let main_rect = main_rect.or(if ws.main.is_some() { Some(Rect::zero()) } else { None });
            return (main_rect, stack_rects);
        }
    }

    if ws.main.is_none() {
        return (None, vec![Rect::zero(); ws.stack.len()]);
    }
    if ws.stack.is_empty() {
        return (Some(viewport), Vec::new());
    }

    match ws.layout_mode {
        LayoutMode::Vertical => split_main_stack(
            viewport,
            ws.main_pane_ratio,
            ws.stack.len(),
            min_w,
            min_h,
            Axis::Horizontal,
        ),
        LayoutMode::Horizontal => split_main_stack(
            viewport,
            ws.main_pane_ratio,
            ws.stack.len(),
            min_w,
            min_h,
            Axis::Vertical,
        ),
        LayoutMode::Stacked => stacked_rects(viewport, ws.main_pane_ratio, ws.stack.len(), ws.active_stack_index, min_w),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    /// Main/stack split along x (`vertical` mode); stack tiles vertically.
    Horizontal,
    /// Main/stack split along y (`horizontal` mode); stack tiles horizontally.
    Vertical,
}

fn split_main_stack(
    viewport: Rect,
    ratio: f64,
    stack_len: usize,
    min_w: u16,
    min_h: u16,
    axis: Axis,
) -> (Option<Rect>, Vec<Rect>) {
    let n = stack_len as u16;

    match axis {
        Axis::Horizontal => {
            let main_w = ((f64::from(viewport.width) * ratio).floor() as u16)
                .clamp(min_w.min(viewport.width), viewport.width.saturating_sub(min_w).max(min_w).min(viewport.width));
            let main_rect = Rect {
                x: viewport.x,
                y: viewport.y,
                width: main_w,
                height: viewport.height,
            };
            let stack_x = viewport.x + main_w;
            let stack_w = viewport.width.saturating_sub(main_w);
            let base_h = viewport.height / n;
            let remainder = viewport.height % n;

            let mut rects = Vec::with_capacity(stack_len);
            let mut y = viewport.y;
            for i in 0..stack_len {
                let mut h = base_h.max(min_h.min(viewport.height));
                if i as u16 == n - 1 {
                    h += remainder;
                }
                let remaining = viewport.y + viewport.height - y;
                h = h.min(remaining);
                rects.push(Rect {
                    x: stack_x,
                    y,
                    width: stack_w,
                    height: h,
                });
                y += h;
            }
            (Some(main_rect), rects)
        }
        Axis::Vertical => {
            let main_h = ((f64::from(viewport.height) * ratio).floor() as u16)
                .clamp(min_h.min(viewport.height), viewport.height.saturating_sub(min_h).max(min_h).min(viewport.height));
            let main_rect = Rect {
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: main_h,
            };
            let stack_y = viewport.y + main_h;
            let stack_h = viewport.height.saturating_sub(main_h);
            let base_w = viewport.width / n;
            let remainder = viewport.width % n;

            let mut rects = Vec::with_capacity(stack_len);
            let mut x = viewport.x;
            for i in 0..stack_len {
                let mut w = base_w.max(min_w.min(viewport.width));
                if i as u16 == n - 1 {
                    w += remainder;
                }
                let remaining = viewport.x + viewport.width - x;
                w = w.min(remaining);
                rects.push(Rect {
                    x,
                    y: stack_y,
                    width: w,
                    height: stack_h,
                });
                x += w;
            }
            (Some(main_rect), rects)
        }
    }
}

const STACKED_HEADER_HEIGHT: u16 = 1;

fn stacked_rects(viewport: Rect, ratio: f64, stack_len: usize, active_index: usize, min_w: u16) -> (Option<Rect>, Vec<Rect>) {
    let main_w = ((f64::from(viewport.width) * ratio).floor() as u16)
        .clamp(min_w.min(viewport.width), viewport.width.saturating_sub(min_w).max(min_w).min(viewport.width));
    let main_rect = Rect {
        x: viewport.x,
        y: viewport.y,
        width: main_w,
        height: viewport.height,
    };
    let stack_x = viewport.x + main_w;
    let stack_w = viewport.width.saturating_sub(main_w);
    let body_y = viewport.y + STACKED_HEADER_HEIGHT.min(viewport.height);
    let body_h = viewport.height.saturating_sub(STACKED_HEADER_HEIGHT);

    let mut rects = vec![Rect::zero(); stack_len];
    if let Some(active) = rects.get_mut(active_index.min(stack_len.saturating_sub(1))) {
        if stack_len > 0 {
            *active = Rect {
                x: stack_x,
                y: body_y,
                width: stack_w,
                height: body_h,
            };
        }
    }
    (Some(main_rect), rects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LayoutEngine {
        LayoutEngine::new(10, 5, LayoutMode::Vertical, 0.5)
    }

    #[test]
    fn new_pane_flow_matches_scenario_1() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });

        let first = e.new_pane(1, None, None);
        let ws = e.workspace(1).unwrap();
        assert_eq!(ws.main.as_ref().unwrap().id, first);
        assert_eq!(ws.main.as_ref().unwrap().rect, Rect { x: 0, y: 0, width: 80, height: 24 });
        assert_eq!(ws.focused_pane_id, Some(first));

        let second = e.new_pane(1, None, None);
        let ws = e.workspace(1).unwrap();
        assert_eq!(ws.main.as_ref().unwrap().rect, Rect { x: 0, y: 0, width: 40, height: 24 });
        assert_eq!(ws.stack[0].rect, Rect { x: 40, y: 0, width: 40, height: 24 });
        assert_eq!(ws.focused_pane_id, Some(second));
    }

    #[test]
    fn navigation_matches_scenario_2() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        e.new_pane(1, None, None);
        e.new_pane(1, None, None);

        e.focus_direction(1, Direction::West);
        let main_id = e.workspace(1).unwrap().main.as_ref().unwrap().id.clone();
        assert_eq!(e.workspace(1).unwrap().focused_pane_id, Some(main_id));

        e.focus_direction(1, Direction::East);
        let stack0_id = e.workspace(1).unwrap().stack[0].id.clone();
        assert_eq!(e.workspace(1).unwrap().focused_pane_id, Some(stack0_id.clone()));

        e.focus_direction(1, Direction::South);
        assert_eq!(e.workspace(1).unwrap().focused_pane_id, Some(stack0_id));
    }

    #[test]
    fn move_pane_matches_scenario_3() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        e.new_pane(1, None, None);
        e.new_pane(1, None, Some("s0".into()));
        e.new_pane(1, None, Some("s1".into()));
        e.new_pane(1, None, Some("s2".into()));

        // Focus stack[2] ("s2").
        let ws = e.workspace(1).unwrap();
        let s2_id = ws.stack[2].id.clone();
        e.workspaces.get_mut(&1).unwrap().focused_pane_id = Some(s2_id.clone());

        e.move_pane(1, Direction::North);
        let ws = e.workspace(1).unwrap();
        assert_eq!(ws.stack[1].id, s2_id, "s2 should now occupy stack[1]");
        assert_eq!(ws.stack[2].title.as_deref(), Some("s1"));

        e.move_pane(1, Direction::West);
        let ws = e.workspace(1).unwrap();
        assert_eq!(ws.main.as_ref().unwrap().id, s2_id, "s2 should now be main");
    }

    #[test]
    fn close_main_promotes_first_stack_pane() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        let main = e.new_pane(1, None, None);
        e.new_pane(1, None, None);

        e.close_pane(1, &main);
        let ws = e.workspace(1).unwrap();
        assert!(ws.stack.is_empty());
        assert_eq!(ws.main.as_ref().unwrap().rect, Rect { x: 0, y: 0, width: 80, height: 24 });
    }

    #[test]
    fn toggle_zoom_gives_focused_pane_the_full_viewport() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        e.new_pane(1, None, None);
        e.new_pane(1, None, None);

        e.toggle_zoom(1);
        let ws = e.workspace(1).unwrap();
        assert_eq!(ws.stack[0].rect, Rect { x: 0, y: 0, width: 80, height: 24 });
        assert!(ws.main.as_ref().unwrap().rect.is_hidden());
    }

    #[test]
    fn pane_id_counter_advances_past_loaded_max() {
        let mut e = engine();
        e.advance_id_counter_past(41);
        let id = e.new_pane(1, None, None);
        assert_eq!(id.as_str(), "pane-42");
    }

    #[test]
    fn layout_geometry_version_bumps_only_when_rects_change() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        e.new_pane(1, None, None);
        let v1 = e.layout_geometry_version();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        assert_eq!(e.layout_geometry_version(), v1, "identical viewport must not bump geometry version");
    }

    #[test]
    fn focus_pane_moves_focus_to_a_clicked_stack_pane() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        let main_id = e.new_pane(1, None, None);
        let stack_id = e.new_pane(1, None, None);

        e.focus_pane(1, &main_id);
        assert_eq!(e.workspace(1).unwrap().focused_pane_id, Some(main_id));

        e.focus_pane(1, &stack_id);
        let ws = e.workspace(1).unwrap();
        assert_eq!(ws.focused_pane_id, Some(stack_id));
        assert_eq!(ws.active_stack_index, 0);
    }

    #[test]
    fn focus_pane_on_unknown_id_is_a_no_op() {
        let mut e = engine();
        e.set_viewport(1, Rect { x: 0, y: 0, width: 80, height: 24 });
        let main_id = e.new_pane(1, None, None);
        e.focus_pane(1, &PaneId::from_raw("pane-999".to_string()));
        assert_eq!(e.workspace(1).unwrap().focused_pane_id, Some(main_id));
    }
}
