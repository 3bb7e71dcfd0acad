//! Persisted session data model (spec §3, §4.F): a `Session` is a named set
//! of workspaces, each workspace a saved `layout::Workspace` plus the CWD a
//! pane's shell should be respawned into on restore. Distinct from
//! `layout::Workspace`, which additionally carries runtime-only geometry
//! (`viewport`, computed `rect`s) that has no place on disk.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::layout::{self, LayoutMode, PaneId};

pub type SessionId = String;
pub type WorkspaceId = u8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneSnapshot {
    pub id: String,
    pub title: Option<String>,
}

impl PaneSnapshot {
    fn from_runtime(pane: &layout::Pane) -> Self {
        Self {
            id: pane.id.as_str().to_string(),
            title: pane.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub id: WorkspaceId,
    pub main: Option<PaneSnapshot>,
    pub stack: Vec<PaneSnapshot>,
    pub focused_pane_id: Option<String>,
    pub active_stack_index: usize,
    pub layout_mode: String,
    pub zoomed: bool,
    pub main_pane_ratio: f64,
}

impl WorkspaceSnapshot {
    pub fn from_runtime(ws: &layout::Workspace) -> Self {
        Self {
            id: ws.id,
            main: ws.main.as_ref().map(PaneSnapshot::from_runtime),
            stack: ws.stack.iter().map(PaneSnapshot::from_runtime).collect(),
            focused_pane_id: ws.focused_pane_id.as_ref().map(|id| id.as_str().to_string()),
            active_stack_index: ws.active_stack_index,
            layout_mode: layout_mode_to_str(ws.layout_mode).to_string(),
            zoomed: ws.zoomed,
            main_pane_ratio: ws.main_pane_ratio,
        }
    }

    /// Rebuilds a runtime `layout::Workspace` with `pty_id` unset on every
    /// pane; the session coordinator reattaches or respawns PTYs afterward.
    pub fn to_runtime(&self) -> layout::Workspace {
        let to_pane = |snap: &PaneSnapshot| layout::Pane {
            id: PaneId::from_raw(snap.id.clone()),
            pty_id: None,
            title: snap.title.clone(),
            rect: layout::Rect::zero(),
        };

        layout::Workspace::restored(
            self.id,
            self.main.as_ref().map(to_pane),
            self.stack.iter().map(to_pane).collect(),
            self.focused_pane_id.clone().map(PaneId::from_raw),
            self.active_stack_index,
            layout_mode_from_str(&self.layout_mode),
            self.zoomed,
            self.main_pane_ratio,
        )
    }

    fn pane_count(&self) -> usize {
        self.main.is_some() as usize + self.stack.len()
    }

    fn max_pane_id_suffix(&self) -> Option<u64> {
        self.main
            .iter()
            .chain(self.stack.iter())
            .filter_map(|p| PaneId::from_raw(p.id.clone()).numeric_suffix())
            .max()
    }
}

fn layout_mode_to_str(mode: LayoutMode) -> &'static str {
    match mode {
        LayoutMode::Vertical => "vertical",
        LayoutMode::Horizontal => "horizontal",
        LayoutMode::Stacked => "stacked",
    }
}

fn layout_mode_from_str(s: &str) -> LayoutMode {
    match s {
        "horizontal" => LayoutMode::Horizontal,
        "stacked" => LayoutMode::Stacked,
        _ => LayoutMode::Vertical,
    }
}

/// `{ id, name, autoNamed, createdAt, lastSwitchedAt, workspaces, activeWorkspaceId, cwdMap }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub auto_named: bool,
    pub created_at: DateTime<Utc>,
    pub last_switched_at: DateTime<Utc>,
    pub workspaces: HashMap<WorkspaceId, WorkspaceSnapshot>,
    pub active_workspace_id: WorkspaceId,
    /// Restore CWD for each pane, the directory its shell respawns into.
    pub cwd_map: HashMap<String, PathBuf>,
}

pub struct SessionSummary {
    pub workspace_count: usize,
    pub pane_count: usize,
}

impl Session {
    pub fn new(id: SessionId, name: String, auto_named: bool, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            auto_named,
            created_at: now,
            last_switched_at: now,
            workspaces: HashMap::new(),
            active_workspace_id: 1,
            cwd_map: HashMap::new(),
        }
    }

    pub fn pane_count(&self) -> usize {
        self.workspaces.values().map(WorkspaceSnapshot::pane_count).sum()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            workspace_count: self.workspaces.len(),
            pane_count: self.pane_count(),
        }
    }

    pub fn meta(&self) -> SessionMeta {
        SessionMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            auto_named: self.auto_named,
            created_at: self.created_at,
            last_switched_at: self.last_switched_at,
        }
    }

    /// The highest pane-id numeric suffix across every workspace, used to
    /// advance the layout engine's id allocator past ids already on disk.
    pub fn max_pane_id_suffix(&self) -> Option<u64> {
        self.workspaces.values().filter_map(WorkspaceSnapshot::max_pane_id_suffix).max()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: SessionId,
    pub name: String,
    pub auto_named: bool,
    pub created_at: DateTime<Utc>,
    pub last_switched_at: DateTime<Utc>,
}

/// `{ sessions: [SessionMeta…], activeSessionId? }`, the single small index
/// file; per-session content lives in its own file (spec §4.F).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionIndex {
    pub sessions: Vec<SessionMeta>,
    pub active_session_id: Option<SessionId>,
}

impl SessionIndex {
    pub fn upsert(&mut self, meta: SessionMeta) {
        if let Some(existing) = self.sessions.iter_mut().find(|m| m.id == meta.id) {
            *existing = meta;
        } else {
            self.sessions.push(meta);
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.sessions.retain(|m| m.id != id);
        if self.active_session_id.as_deref() == Some(id) {
            self.active_session_id = None;
        }
    }

    /// Sessions ordered most-recently-switched first, used to pick the
    /// fallback session after the active one is deleted.
    pub fn by_last_switched(&self) -> Vec<&SessionMeta> {
        let mut metas: Vec<&SessionMeta> = self.sessions.iter().collect();
        metas.sort_by(|a, b| b.last_switched_at.cmp(&a.last_switched_at));
        metas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workspace() -> layout::Workspace {
        let mut engine = layout::LayoutEngine::new(10, 5, LayoutMode::Vertical, 0.5);
        engine.set_viewport(1, layout::Rect { x: 0, y: 0, width: 80, height: 24 });
        engine.new_pane(1, None, Some("main".into()));
        engine.new_pane(1, None, Some("stack0".into()));
        engine.workspace(1).unwrap().clone()
    }

    #[test]
    fn workspace_snapshot_round_trips_through_runtime_shape() {
        let ws = sample_workspace();
        let snapshot = WorkspaceSnapshot::from_runtime(&ws);
        assert_eq!(snapshot.pane_count(), 2);
        assert_eq!(snapshot.layout_mode, "vertical");

        let restored = snapshot.to_runtime();
        assert_eq!(restored.main.as_ref().unwrap().id, ws.main.as_ref().unwrap().id);
        assert_eq!(restored.stack[0].id, ws.stack[0].id);
        assert!(restored.main.as_ref().unwrap().pty_id.is_none());
    }

    #[test]
    fn session_with_zero_panes_reports_zero_pane_count() {
        let session = Session::new("s1".into(), "s1".into(), true, Utc::now());
        assert_eq!(session.pane_count(), 0);
    }

    #[test]
    fn max_pane_id_suffix_finds_the_highest_across_workspaces() {
        let ws = sample_workspace();
        let snapshot = WorkspaceSnapshot::from_runtime(&ws);
        let mut session = Session::new("s1".into(), "s1".into(), true, Utc::now());
        session.workspaces.insert(1, snapshot);
        assert_eq!(session.max_pane_id_suffix(), Some(2));
    }

    #[test]
    fn index_by_last_switched_orders_most_recent_first() {
        let mut index = SessionIndex::default();
        let now = Utc::now();
        index.upsert(SessionMeta {
            id: "old".into(),
            name: "old".into(),
            auto_named: true,
            created_at: now,
            last_switched_at: now - chrono::Duration::seconds(10),
        });
        index.upsert(SessionMeta {
            id: "new".into(),
            name: "new".into(),
            auto_named: true,
            created_at: now,
            last_switched_at: now,
        });
        let ordered = index.by_last_switched();
        assert_eq!(ordered[0].id, "new");
        assert_eq!(ordered[1].id, "old");
    }

    #[test]
    fn removing_the_active_session_clears_active_id() {
        let mut index = SessionIndex::default();
        index.active_session_id = Some("s1".into());
        index.upsert(SessionMeta {
            id: "s1".into(),
            name: "s1".into(),
            auto_named: true,
            created_at: Utc::now(),
            last_switched_at: Utc::now(),
        });
        index.remove("s1");
        assert!(index.active_session_id.is_none());
        assert!(index.sessions.is_empty());
    }
}
