//! Composition root (spec §5): wires the PTY registry, layout engine,
//! session coordinator, and input router into the single-threaded
//! cooperative event loop. Byte-level rendering to the host terminal is an
//! external collaborator (spec §1) — this binary owns the host terminal's
//! raw-mode/alt-screen lifecycle and input routing, not frame drawing.
//!
//! Grounded on the teacher's `main.rs::run_app` (50 ms `poll` loop, terminal
//! setup/teardown pair around the loop body, "always try to restore even on
//! error" comment kept verbatim in spirit); the draw call itself has no
//! counterpart here.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::time::Duration;

use crossterm::event::{poll, read, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};

use openmux::aggregate::AggregateView;
use openmux::config::Config;
use openmux::input::bindings::Bindings;
use openmux::input::mouse::{hit_test, route_mouse_event, MouseAction};
use openmux::input::router::{key_to_bytes, wrap_bracketed_paste, KeyRouter};
use openmux::input::{ConfirmKind, ConfirmState, InputMode, SearchState};
use openmux::layout::{Direction, LayoutEngine, LayoutMode, Rect};
use openmux::pty::{PtyOptions, PtyRegistry};
use openmux::session::{Session, SessionCoordinator, SessionStore, WorkspaceSnapshot};
use openmux::ui::toast::ToastManager;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const INITIAL_COLS: u16 = 80;
const INITIAL_ROWS: u16 = 24;

fn main() -> ExitCode {
    env_logger::init();

    if !io::stdin().is_terminal() {
        log::error!("openmux must be run in an interactive terminal");
        return ExitCode::from(1);
    }

    // A malformed or unreadable config.toml is not fatal (spec §7
    // ConfigLoadError: "falls back to default bindings and logs").
    let config = Config::load().unwrap_or_else(|e| {
        log::error!("config load error, falling back to defaults: {e:#}");
        Config::default()
    });

    if let Err(e) = enable_raw_mode() {
        log::error!("failed to acquire host terminal: {e}");
        return ExitCode::from(1);
    }
    if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture) {
        let _ = disable_raw_mode();
        log::error!("failed to acquire host terminal: {e}");
        return ExitCode::from(1);
    }

    let exit_code = run(&config);

    // Always try to restore the host terminal, even if the loop above
    // returned because of an error.
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);

    exit_code
}

/// State that would otherwise have to thread through every key/mouse
/// handler as separate arguments; owned entirely by the main loop per spec
/// §5's "Shared resource policy".
struct AppState {
    registry: PtyRegistry,
    engine: LayoutEngine,
    coordinator: SessionCoordinator,
    /// Separate read handle onto the same sessions directory the
    /// coordinator uses, so the aggregate view can list every on-disk
    /// session without the coordinator exposing its private store.
    aggregate_store: SessionStore,
    session: Session,
    bindings: Bindings,
    router: KeyRouter,
    aggregate: AggregateView,
    toasts: ToastManager,
    mode: InputMode,
    prefix_timeout_ms: u64,
    should_quit: bool,
}

fn host_terminal_hint() -> String {
    std::env::var("TERM_PROGRAM").unwrap_or_else(|_| "unknown".to_string())
}

fn run(config: &Config) -> ExitCode {
    let registry = PtyRegistry::new();
    let mut engine = LayoutEngine::new(
        config.ui.min_pane_width,
        config.ui.min_pane_height,
        config.ui.parsed_default_layout_mode(),
        config.ui.main_pane_ratio,
    );

    let store = match SessionStore::from_config() {
        Ok(s) => s,
        Err(e) => {
            log::error!("fatal configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    let autosave_interval = Duration::from_millis(config.ui.autosave_interval_ms);
    let mut coordinator = match SessionCoordinator::new(store, autosave_interval) {
        Ok(c) => c,
        Err(e) => {
            log::error!("fatal configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let session = match coordinator.get_active_id().map(str::to_string) {
        Some(id) => match coordinator.switch_to(&id, &mut engine, &registry) {
            Ok(()) => coordinator.load(&id).unwrap_or_else(|_| coordinator.create(None).expect("create session")),
            Err(_) => coordinator.create(None).expect("create session"),
        },
        None => coordinator.create(None).expect("create session"),
    };

    let aggregate_store = match SessionStore::from_config() {
        Ok(s) => s,
        Err(e) => {
            log::error!("fatal configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let mut state = AppState {
        registry,
        engine,
        coordinator,
        aggregate_store,
        session,
        bindings: Bindings::from_config(&config.keybindings),
        router: KeyRouter::new(),
        aggregate: AggregateView::new(),
        toasts: ToastManager::new(),
        mode: InputMode::Normal,
        prefix_timeout_ms: config.ui.prefix_timeout_ms,
        should_quit: false,
    };

    state.engine.set_viewport(
        state.engine.active_workspace_id(),
        Rect { x: 0, y: 0, width: INITIAL_COLS, height: INITIAL_ROWS },
    );

    if state.engine.workspace(state.engine.active_workspace_id()).map(|ws| ws.main.is_none()).unwrap_or(true) {
        if let Err(e) = spawn_pane(&mut state, None) {
            log::error!("failed to spawn initial pty: {e}");
            return ExitCode::from(1);
        }
    }

    loop {
        if state.mode.prefix_expired(state.prefix_timeout_ms) {
            state.mode = InputMode::Normal;
        }

        sync_session_from_layout(&mut state);
        let _ = state.coordinator.maybe_autosave(&state.session, state.engine.layout_version());
        state.toasts.update();
        if state.aggregate.should_poll() {
            let active_id = state.coordinator.get_active_id().map(str::to_string);
            state.aggregate.refresh(&state.registry, &state.aggregate_store, &state.engine, active_id.as_deref());
        }

        match poll(POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => {
                if state.should_quit {
                    break;
                }
                continue;
            }
            Err(e) => {
                log::error!("event poll failed: {e}");
                break;
            }
        }

        let event = match read() {
            Ok(e) => e,
            Err(e) => {
                log::error!("event read failed: {e}");
                break;
            }
        };

        match event {
            Event::Key(key) => {
                if !state.router.dispatch(key) {
                    handle_key(&mut state, key);
                }
            }
            Event::Mouse(mouse) => handle_mouse(&mut state, mouse),
            Event::Resize(w, h) => {
                let id = state.engine.active_workspace_id();
                state.engine.set_viewport(id, Rect { x: 0, y: 0, width: w, height: h });
            }
            Event::Paste(text) => {
                if let Some(pty_id) = focused_pty(&state) {
                    let _ = state.registry.write(pty_id, &wrap_bracketed_paste(&text));
                }
            }
            _ => {}
        }

        if state.should_quit {
            break;
        }
    }

    sync_session_from_layout(&mut state);
    let _ = state.coordinator.save(&state.session);
    state.registry.destroy_all();

    ExitCode::from(0)
}

fn sync_session_from_layout(state: &mut AppState) {
    for workspace_id in state.engine.workspace_ids() {
        if let Some(ws) = state.engine.workspace(workspace_id) {
            state.session.workspaces.insert(workspace_id, WorkspaceSnapshot::from_runtime(ws));
            for pane in ws.main.iter().chain(ws.stack.iter()) {
                if let Some(pty_id) = pane.pty_id {
                    let cwd = state.registry.get_cwd(pty_id);
                    state.session.cwd_map.insert(pane.id.as_str().to_string(), cwd.into());
                }
            }
        }
    }
    state.session.active_workspace_id = state.engine.active_workspace_id();
}

fn focused_pty(state: &AppState) -> Option<openmux::pty::PtyId> {
    let ws = state.engine.workspace(state.engine.active_workspace_id())?;
    let focused_id = ws.focused_pane_id.as_ref()?;
    ws.main
        .iter()
        .chain(ws.stack.iter())
        .find(|p| &p.id == focused_id)
        .and_then(|p| p.pty_id)
}

fn spawn_pane(state: &mut AppState, cwd: Option<std::path::PathBuf>) -> openmux::error::Result<()> {
    let workspace_id = state.engine.active_workspace_id();
    let opts = PtyOptions {
        cols: INITIAL_COLS,
        rows: INITIAL_ROWS,
        cwd,
        host_terminal_hint: host_terminal_hint(),
        scrollback_limit: 2000,
        ..Default::default()
    };
    let pty_id = state.registry.create(opts)?;
    state.engine.new_pane(workspace_id, Some(pty_id), None);
    Ok(())
}

fn handle_key(state: &mut AppState, key: KeyEvent) {
    // Any keyboard event in normal mode clears in-flight selections
    // (spec §4.H "Selection"); selections live outside this core (owned by
    // whatever renders the pane), so this is a no-op placeholder hook for
    // that collaborator.

    match state.mode.clone() {
        InputMode::Confirm(confirm) => handle_confirm_key(state, confirm, key),
        InputMode::Search(search) => handle_search_key(state, search, key),
        InputMode::Move => handle_move_key(state, key),
        InputMode::Prefix(_) => handle_prefix_key(state, key),
        InputMode::Normal => handle_normal_key(state, key),
    }
}

fn handle_normal_key(state: &mut AppState, key: KeyEvent) {
    if let Some(action) = state.bindings.resolve("normal", key).map(|a| a.to_string()) {
        dispatch_action(state, &action);
        return;
    }
    // Unbound key in normal mode: forward to the focused PTY (spec §4.G
    // "Binding resolution"), respecting its cursor-key mode for arrows.
    let Some(pty_id) = focused_pty(state) else { return };
    let cursor_key_mode = state.registry.with_emulator(pty_id, |e| e.cursor_key_mode()).unwrap_or(openmux::emulator::CursorKeyMode::Normal);
    let bytes = key_to_bytes(key, cursor_key_mode);
    if !bytes.is_empty() {
        let _ = state.registry.write(pty_id, &bytes);
    }
}

fn handle_prefix_key(state: &mut AppState, key: KeyEvent) {
    match state.bindings.resolve("prefix", key) {
        Some("mode.move") => state.mode = InputMode::Move,
        Some("search.open") => {
            let saved_scroll_offset = 0;
            state.mode = InputMode::Search(SearchState::new(saved_scroll_offset));
        }
        Some("app.quit") => state.mode = InputMode::Confirm(ConfirmState { kind: ConfirmKind::Quit }),
        Some("pane.close") => state.mode = InputMode::Confirm(ConfirmState { kind: ConfirmKind::ClosePane }),
        Some(action) => {
            let action = action.to_string();
            dispatch_action(state, &action);
            state.mode = InputMode::Normal;
        }
        None => state.mode = InputMode::Normal,
    }
}

fn handle_move_key(state: &mut AppState, key: KeyEvent) {
    match state.bindings.resolve("move", key).map(|a| a.to_string()) {
        Some(action) if action == "mode.cancel" => state.mode = InputMode::Normal,
        Some(action) => dispatch_action(state, &action),
        None => {}
    }
}

fn handle_search_key(state: &mut AppState, mut search: SearchState, key: KeyEvent) {
    use crossterm::event::KeyCode;
    match state.bindings.resolve("search", key) {
        Some("search.confirm") => {
            // Search confirmation hands off to the emulator's own search
            // cursor (spec §4.B); the core exposes `Emulator::search`, the
            // renderer owns cycling through matches.
            state.mode = InputMode::Normal;
            return;
        }
        Some("search.cancel") => {
            state.mode = InputMode::Normal;
            return;
        }
        Some("search.delete") => {
            search.backspace();
            state.mode = InputMode::Search(search);
            return;
        }
        Some("search.next") | Some("search.prev") => {
            state.mode = InputMode::Search(search);
            return;
        }
        _ => {}
    }
    if let KeyCode::Char(c) = key.code {
        search.push(c);
    }
    state.mode = InputMode::Search(search);
}

fn handle_confirm_key(state: &mut AppState, confirm: ConfirmState, key: KeyEvent) {
    use crossterm::event::KeyCode;
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => match confirm.kind {
            ConfirmKind::Quit => state.should_quit = true,
            ConfirmKind::ClosePane => close_focused_pane(state),
        },
        _ => {}
    }
    state.mode = InputMode::Normal;
}

fn close_focused_pane(state: &mut AppState) {
    let workspace_id = state.engine.active_workspace_id();
    let Some(ws) = state.engine.workspace(workspace_id) else { return };
    let Some(focused_id) = ws.focused_pane_id.clone() else { return };
    let pty_id = ws.main.iter().chain(ws.stack.iter()).find(|p| p.id == focused_id).and_then(|p| p.pty_id);
    state.engine.close_pane(workspace_id, &focused_id);
    if let Some(pty_id) = pty_id {
        let _ = state.registry.destroy(pty_id);
    }
}

fn dispatch_action(state: &mut AppState, action: &str) {
    let workspace_id = state.engine.active_workspace_id();
    match action {
        "pane.new" => {
            let cwd = focused_pty(state).map(|id| std::path::PathBuf::from(state.registry.get_cwd(id)));
            let _ = spawn_pane(state, cwd);
        }
        "pane.close" => close_focused_pane(state),
        "pane.zoom" => state.engine.toggle_zoom(workspace_id),
        "pane.focus.north" => state.engine.focus_direction(workspace_id, Direction::North),
        "pane.focus.south" => state.engine.focus_direction(workspace_id, Direction::South),
        "pane.focus.east" => state.engine.focus_direction(workspace_id, Direction::East),
        "pane.focus.west" => state.engine.focus_direction(workspace_id, Direction::West),
        "pane.move.north" => state.engine.move_pane(workspace_id, Direction::North),
        "pane.move.south" => state.engine.move_pane(workspace_id, Direction::South),
        "pane.move.east" => state.engine.move_pane(workspace_id, Direction::East),
        "pane.move.west" => state.engine.move_pane(workspace_id, Direction::West),
        "layout.mode.vertical" => state.engine.set_layout_mode(workspace_id, LayoutMode::Vertical),
        "layout.mode.horizontal" => state.engine.set_layout_mode(workspace_id, LayoutMode::Horizontal),
        "layout.mode.stacked" => state.engine.set_layout_mode(workspace_id, LayoutMode::Stacked),
        "layout.cycle.next" => cycle_layout_mode(state, 1),
        "layout.cycle.prev" => cycle_layout_mode(state, -1),
        "mode.cancel" => state.mode = InputMode::Normal,
        "app.quit" => state.mode = InputMode::Confirm(ConfirmState { kind: ConfirmKind::Quit }),
        "aggregate.toggle" | "session.picker.toggle" | "console.toggle" | "hints.toggle" => {
            // These overlays' rendering lives outside the core; the state
            // they'd show (aggregate.refresh results, session list,
            // keybinding hints) is already kept current above. Nothing
            // further to mutate here without a renderer to hand it to.
        }
        "clipboard.paste" => {
            if let (Some(pty_id), Ok(text)) = (focused_pty(state), read_clipboard()) {
                let _ = state.registry.write(pty_id, &wrap_bracketed_paste(&text));
            }
        }
        other if other.starts_with("workspace.switch.") => {
            if let Some(n) = other.rsplit('.').next().and_then(|s| s.parse::<u8>().ok()) {
                state.engine.switch_workspace(n);
            }
        }
        _ => {}
    }
}

fn cycle_layout_mode(state: &mut AppState, direction: i8) {
    let workspace_id = state.engine.active_workspace_id();
    let Some(ws) = state.engine.workspace(workspace_id) else { return };
    let order = [LayoutMode::Vertical, LayoutMode::Horizontal, LayoutMode::Stacked];
    let current = order.iter().position(|m| *m == ws.layout_mode).unwrap_or(0) as i8;
    let next = (current + direction).rem_euclid(order.len() as i8) as usize;
    state.engine.set_layout_mode(workspace_id, order[next]);
}

fn read_clipboard() -> Result<String, arboard::Error> {
    arboard::Clipboard::new()?.get_text()
}

fn handle_mouse(state: &mut AppState, mouse: crossterm::event::MouseEvent) {
    let workspace_id = state.engine.active_workspace_id();
    let Some(ws) = state.engine.workspace(workspace_id).cloned() else { return };

    let hovered_pty = hit_test(&ws, mouse.column, mouse.row)
        .and_then(|(pane_id, _)| ws.main.iter().chain(ws.stack.iter()).find(|p| p.id == pane_id))
        .and_then(|p| p.pty_id);
    let (tracking, alt_screen) = match hovered_pty {
        Some(pty_id) => state.registry.with_emulator(pty_id, |e| (e.is_mouse_tracking(), e.is_alternate_screen())).unwrap_or((None, false)),
        None => (None, false),
    };

    let routing = route_mouse_event(mouse, &ws, tracking, alt_screen, alt_screen);

    if let Some(pane_id) = &routing.focus {
        state.engine.focus_pane(workspace_id, pane_id);
    }

    match routing.action {
        MouseAction::ForwardBytes(bytes) => {
            if let Some(pane_id) = routing.focus {
                if let Some(pty_id) = ws.main.iter().chain(ws.stack.iter()).find(|p| p.id == pane_id).and_then(|p| p.pty_id) {
                    let _ = state.registry.write(pty_id, &bytes);
                }
            }
        }
        MouseAction::ScrollLines(_) | MouseAction::SelectionStart { .. } | MouseAction::SelectionUpdate { .. } | MouseAction::SelectionComplete | MouseAction::None => {
            // Scrollback viewport position and drag-selection state are
            // owned by the renderer's per-pane UI state, not the core.
        }
    }
}
