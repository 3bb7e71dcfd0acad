//! Cross-session aggregate view (spec §4.H): every PTY across every
//! session, joined from on-disk session snapshots plus the active
//! in-memory one against `registry.list()`.
//!
//! No teacher file builds a cross-session roster — claudatui's sidebar
//! lists conversations, not live PTYs — so this is grounded on the spec's
//! own description plus the polling/subscription machinery already built
//! in `pty::mod` (`subscribe_lifecycle`, `subscribe_all_titles`,
//! `get_git_info`) and `git::status::diff_stats` for the on-demand stat
//! fetch.

use std::time::{Duration, Instant};

use crate::git::{diff_stats, DiffStats};
use crate::layout::{LayoutEngine, Rect};
use crate::pty::{PtyId, PtyRegistry};
use crate::session::{SessionId, SessionStore};

const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const INACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// One row of the aggregate view (spec §4.H
/// `{ptyId, cwd, gitBranch?, gitDiffStats?, foregroundProcess?, workspaceId?, paneId?}`).
#[derive(Debug, Clone)]
pub struct AggregateEntry {
    pub session_id: SessionId,
    pub pty_id: Option<PtyId>,
    pub cwd: String,
    pub git_branch: Option<String>,
    pub git_diff_stats: Option<DiffStats>,
    pub foreground_process: Option<String>,
    pub workspace_id: Option<u8>,
    pub pane_id: Option<String>,
}

/// A live PTY's foreground process name indicates activity when it isn't
/// sitting at an idle shell prompt (spec §4.H "Polling").
fn looks_active(foreground_process: &str) -> bool {
    !matches!(foreground_process, "" | "bash" | "zsh" | "sh" | "fish" | "dash")
}

struct PreviewState {
    pty_id: PtyId,
    original_cols: u16,
    original_rows: u16,
}

pub struct AggregateView {
    entries: Vec<AggregateEntry>,
    filter: String,
    selected: usize,
    last_active_poll: Instant,
    last_inactive_poll: Instant,
    preview: Option<PreviewState>,
}

impl AggregateView {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            filter: String::new(),
            selected: 0,
            last_active_poll: Instant::now(),
            last_inactive_poll: Instant::now(),
            preview: None,
        }
    }

    /// Rebuilds the roster: every pane of the active in-memory session
    /// (joined against `registry.list()` for live introspection), plus
    /// every pane recorded in every other on-disk session (cwd-only, no
    /// live PTY since PTYs never persist across restarts).
    pub fn refresh(&mut self, registry: &PtyRegistry, store: &SessionStore, engine: &LayoutEngine, active_session_id: Option<&str>) {
        let mut entries = Vec::new();

        for workspace_id in engine.workspace_ids() {
            let Some(ws) = engine.workspace(workspace_id) else { continue };
            for pane in ws.main.iter().chain(ws.stack.iter()) {
                let Some(pty_id) = pane.pty_id else { continue };
                let cwd = registry.get_cwd(pty_id);
                let git = registry.get_git_info(std::path::Path::new(&cwd));
                entries.push(AggregateEntry {
                    session_id: active_session_id.unwrap_or("").to_string(),
                    pty_id: Some(pty_id),
                    cwd,
                    git_branch: git.branch,
                    git_diff_stats: None,
                    foreground_process: Some(registry.get_foreground_process(pty_id)),
                    workspace_id: Some(workspace_id),
                    pane_id: Some(pane.id.as_str().to_string()),
                });
            }
        }

        if let Ok(index) = store.load_index() {
            for meta in &index.sessions {
                if Some(meta.id.as_str()) == active_session_id {
                    continue;
                }
                let Ok(session) = store.load_session(&meta.id) else { continue };
                for (workspace_id, snapshot) in &session.workspaces {
                    for pane in snapshot.main.iter().chain(snapshot.stack.iter()) {
                        let cwd = session
                            .cwd_map
                            .get(&pane.id)
                            .map(|p| p.display().to_string())
                            .unwrap_or_default();
                        entries.push(AggregateEntry {
                            session_id: meta.id.clone(),
                            pty_id: None,
                            cwd,
                            git_branch: None,
                            git_diff_stats: None,
                            foreground_process: None,
                            workspace_id: Some(*workspace_id),
                            pane_id: Some(pane.id.clone()),
                        });
                    }
                }
            }
        }

        self.entries = entries;
        if self.selected >= self.filtered().len() {
            self.selected = 0;
        }
    }

    pub fn set_filter(&mut self, filter: String) {
        self.filter = filter;
        self.selected = 0;
    }

    /// Space-separated substring filter over `cwd | branch | foreground_process`;
    /// every term must match at least one of those fields (spec §4.H).
    pub fn filtered(&self) -> Vec<&AggregateEntry> {
        let terms: Vec<String> = self.filter.split_whitespace().map(|t| t.to_ascii_lowercase()).collect();
        self.entries
            .iter()
            .filter(|entry| {
                terms.iter().all(|term| {
                    entry.cwd.to_ascii_lowercase().contains(term)
                        || entry.git_branch.as_deref().unwrap_or("").to_ascii_lowercase().contains(term)
                        || entry.foreground_process.as_deref().unwrap_or("").to_ascii_lowercase().contains(term)
                })
            })
            .collect()
    }

    pub fn select_next(&mut self) {
        let len = self.filtered().len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    pub fn select_prev(&mut self) {
        let len = self.filtered().len();
        if len > 0 {
            self.selected = (self.selected + len - 1) % len;
        }
    }

    pub fn selected_entry(&self) -> Option<&AggregateEntry> {
        self.filtered().into_iter().nth(self.selected)
    }

    /// Fetches diff stats for the selected entry only, to avoid paying git's
    /// cost for every row on every refresh (spec §4.H).
    pub fn fetch_diff_stats_for_selected(&mut self) {
        let Some(selected_cwd) = self.selected_entry().map(|e| e.cwd.clone()) else { return };
        let stats = diff_stats(std::path::Path::new(&selected_cwd));
        let selected_pane = self.selected_entry().and_then(|e| e.pane_id.clone());
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pane_id == selected_pane) {
            entry.git_diff_stats = stats;
        }
    }

    /// Runs on every main-loop tick; returns whether a poll-driven refresh
    /// should happen this tick (spec §4.H "Polling": active ~2s, inactive ~10s).
    pub fn should_poll(&mut self) -> bool {
        let any_active = self.entries.iter().any(|e| {
            e.foreground_process.as_deref().map(looks_active).unwrap_or(false)
        });
        let interval = if any_active { ACTIVE_POLL_INTERVAL } else { INACTIVE_POLL_INTERVAL };
        let last = if any_active { self.last_active_poll } else { self.last_inactive_poll };
        if last.elapsed() >= interval {
            if any_active {
                self.last_active_poll = Instant::now();
            } else {
                self.last_inactive_poll = Instant::now();
            }
            true
        } else {
            false
        }
    }

    /// Resizes the previewed PTY to the preview rectangle; the pane's real
    /// dimensions are restored by `close_preview` (spec §4.H "live
    /// interactive preview").
    pub fn open_preview(&mut self, registry: &PtyRegistry, pty_id: PtyId, original: Rect, preview: Rect) -> crate::error::Result<()> {
        registry.resize(pty_id, preview.width, preview.height)?;
        self.preview = Some(PreviewState { pty_id, original_cols: original.width, original_rows: original.height });
        Ok(())
    }

    pub fn close_preview(&mut self, registry: &PtyRegistry) -> crate::error::Result<()> {
        if let Some(state) = self.preview.take() {
            registry.resize(state.pty_id, state.original_cols, state.original_rows)?;
        }
        Ok(())
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_some()
    }
}

impl Default for AggregateView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_active_treats_idle_shells_as_inactive() {
        assert!(!looks_active("bash"));
        assert!(!looks_active("zsh"));
        assert!(!looks_active(""));
        assert!(looks_active("vim"));
        assert!(looks_active("cargo"));
    }

    #[test]
    fn filter_requires_every_space_separated_term_to_match() {
        let mut view = AggregateView::new();
        view.entries.push(AggregateEntry {
            session_id: "s1".into(),
            pty_id: None,
            cwd: "/home/user/openmux".into(),
            git_branch: Some("main".into()),
            git_diff_stats: None,
            foreground_process: Some("cargo".into()),
            workspace_id: Some(1),
            pane_id: Some("pane-1".into()),
        });

        view.set_filter("openmux main".into());
        assert_eq!(view.filtered().len(), 1);

        view.set_filter("openmux nonexistent".into());
        assert_eq!(view.filtered().len(), 0);
    }

    #[test]
    fn select_next_and_prev_wrap_around_the_filtered_list() {
        let mut view = AggregateView::new();
        for i in 0..3 {
            view.entries.push(AggregateEntry {
                session_id: "s1".into(),
                pty_id: None,
                cwd: format!("/tmp/{i}"),
                git_branch: None,
                git_diff_stats: None,
                foreground_process: None,
                workspace_id: None,
                pane_id: Some(format!("pane-{i}")),
            });
        }
        view.select_prev();
        assert_eq!(view.selected, 2);
        view.select_next();
        view.select_next();
        assert_eq!(view.selected, 1);
    }
}
