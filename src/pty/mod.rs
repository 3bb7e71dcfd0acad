//! PTY session registry (spec §4.C): owns one PTY + emulator pair per
//! session, serializes each session's write path internally, and exposes
//! process-introspection and git-status helpers used by the aggregate view.
//!
//! Grounded on the teacher's `session::manager::{ManagedSession,
//! SessionManager}` (PTY spawn via `portable_pty::native_pty_system`,
//! reader-thread-plus-mpsc-channel pattern, `alive: Arc<AtomicBool>`) and
//! `pty::handler::PtyHandler` (the leaner single-session spawn/write/resize
//! shape); generalized from a single hardcoded `claude` command into an
//! arbitrary shell, and from "write output into a `vt100::Parser` field" to
//! "write output into a boxed [`Emulator`]" behind a `Mutex` so registry
//! operations are callable from any thread (spec §4.C: "callers need no
//! external lock").

pub mod introspect;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use portable_pty::{native_pty_system, CommandBuilder, PtyPair, PtySize};

use crate::emulator::{Emulator, Vt100Emulator};
use crate::error::{OpenmuxError, Result};
use crate::git::{GitInfo, GitStatusTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PtyId(u64);

#[derive(Debug, Clone)]
pub struct PtyOptions {
    pub cols: u16,
    pub rows: u16,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub shell: Option<String>,
    pub scrollback_limit: usize,
    /// Implementation-defined hint identifying the detected outer terminal,
    /// forwarded to the child as `OPENMUX_HOST_TERMINAL` (spec §6).
    pub host_terminal_hint: String,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            cwd: None,
            env: Vec::new(),
            shell: None,
            scrollback_limit: 2000,
            host_terminal_hint: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub success: bool,
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created(PtyId),
    Destroyed(PtyId, Option<ExitStatus>),
}

type LifecycleCallback = Box<dyn Fn(LifecycleEvent) + Send>;
type TitleCallback = Box<dyn Fn(PtyId, &str) + Send>;
type ExitCallback = Box<dyn FnOnce(Option<ExitStatus>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionKind {
    Lifecycle,
    Title,
}

/// Opaque handle returned by `subscribe_lifecycle`/`subscribe_all_titles`.
/// Passing it to [`PtyRegistry::unsubscribe`] detaches it synchronously: the
/// subscriber map entry is gone by the time the call returns, so no later
/// event can still reach it (spec §5 cancellation guarantee).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64, SubscriptionKind);

struct Session {
    pair: Mutex<PtyPair>,
    child_pid: Option<u32>,
    writer: Mutex<Box<dyn Write + Send>>,
    emulator: Mutex<Box<dyn Emulator>>,
    alive: Arc<AtomicBool>,
    exit_status: Mutex<Option<ExitStatus>>,
    last_title: Mutex<String>,
    _reader_thread: thread::JoinHandle<()>,
}

/// Thread-safe registry of live PTY sessions. Cloning shares the underlying
/// state (it is reference-counted internally), matching the "single
/// registry, many callers" shape spec §4.C assumes.
#[derive(Clone)]
pub struct PtyRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<PtyId, Arc<Session>>>,
    next_id: AtomicU64,
    next_sub_id: AtomicU64,
    lifecycle_subs: Mutex<HashMap<u64, LifecycleCallback>>,
    title_subs: Mutex<HashMap<u64, TitleCallback>>,
    exit_subs: Mutex<HashMap<PtyId, Vec<ExitCallback>>>,
    git: GitStatusTracker,
}

impl PtyRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                next_sub_id: AtomicU64::new(1),
                lifecycle_subs: Mutex::new(HashMap::new()),
                title_subs: Mutex::new(HashMap::new()),
                exit_subs: Mutex::new(HashMap::new()),
                git: GitStatusTracker::new(),
            }),
        }
    }

    pub fn create(&self, opts: PtyOptions) -> Result<PtyId> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: opts.rows,
                cols: opts.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| OpenmuxError::PtySpawnError(e.to_string()))?;

        let shell = opts
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/sh".to_string());
        let mut cmd = CommandBuilder::new(shell);
        if let Some(cwd) = &opts.cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("OPENMUX_HOST_TERMINAL", &opts.host_terminal_hint);
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| OpenmuxError::PtySpawnError(e.to_string()))?;
        let child_pid = child.process_id();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| OpenmuxError::PtySpawnError(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| OpenmuxError::PtySpawnError(e.to_string()))?;

        let id = PtyId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let emulator: Box<dyn Emulator> =
            Box::new(Vt100Emulator::new(opts.rows, opts.cols, opts.scrollback_limit));
        let alive = Arc::new(AtomicBool::new(true));

        let reader_thread = {
            let alive = Arc::clone(&alive);
            let inner = Arc::clone(&self.inner);
            let mut child = child;
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let sessions = inner.sessions.lock().expect("sessions lock poisoned");
                            if let Some(session) = sessions.get(&id) {
                                let mut emu = session.emulator.lock().expect("emulator lock poisoned");
                                emu.write(&buf[..n]);
                                let title = emu.title();
                                drop(emu);
                                let mut last = session.last_title.lock().expect("title lock poisoned");
                                if *last != title {
                                    *last = title.clone();
                                    drop(last);
                                    for cb in inner.title_subs.lock().expect("title subs poisoned").values() {
                                        cb(id, &title);
                                    }
                                }
                            } else {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                alive.store(false, Ordering::SeqCst);
                let status = child.wait().ok().map(|s| ExitStatus {
                    success: s.success(),
                    code: None,
                });
                if let Some(session) = inner.sessions.lock().expect("sessions lock poisoned").get(&id) {
                    *session.exit_status.lock().expect("exit status lock poisoned") = status;
                }
                for cb in inner
                    .lifecycle_subs
                    .lock()
                    .expect("lifecycle subs poisoned")
                    .values()
                {
                    cb(LifecycleEvent::Destroyed(id, status));
                }
                if let Some(cbs) = inner.exit_subs.lock().expect("exit subs poisoned").remove(&id) {
                    for cb in cbs {
                        cb(status);
                    }
                }
            })
        };

        let session = Arc::new(Session {
            pair: Mutex::new(pair),
            child_pid,
            writer: Mutex::new(writer),
            emulator: Mutex::new(emulator),
            alive,
            exit_status: Mutex::new(None),
            last_title: Mutex::new(String::new()),
            _reader_thread: reader_thread,
        });

        self.inner
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .insert(id, session);
        for cb in self.inner.lifecycle_subs.lock().expect("lifecycle subs poisoned").values() {
            cb(LifecycleEvent::Created(id));
        }

        Ok(id)
    }

    fn get(&self, id: PtyId) -> Result<Arc<Session>> {
        self.inner
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(OpenmuxError::PtyNotFoundError(id.0.to_string()))
    }

    pub fn write(&self, id: PtyId, bytes: &[u8]) -> Result<()> {
        let session = self.get(id)?;
        let mut writer = session.writer.lock().expect("writer lock poisoned");
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(OpenmuxError::from)
    }

    pub fn resize(&self, id: PtyId, cols: u16, rows: u16) -> Result<()> {
        let session = self.get(id)?;
        session
            .pair
            .lock()
            .expect("pty pair lock poisoned")
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| OpenmuxError::PtySpawnError(e.to_string()))?;
        session
            .emulator
            .lock()
            .expect("emulator lock poisoned")
            .resize(cols, rows);
        Ok(())
    }

    pub fn destroy(&self, id: PtyId) -> Result<()> {
        let session = self
            .inner
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .remove(&id)
            .ok_or(OpenmuxError::PtyNotFoundError(id.0.to_string()))?;
        drop(session);
        Ok(())
    }

    pub fn destroy_all(&self) {
        let ids: Vec<PtyId> = self
            .inner
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .keys()
            .copied()
            .collect();
        for id in ids {
            let _ = self.destroy(id);
        }
    }

    pub fn list(&self) -> Vec<PtyId> {
        let mut ids: Vec<PtyId> = self
            .inner
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    pub fn is_alive(&self, id: PtyId) -> Result<bool> {
        Ok(self.get(id)?.alive.load(Ordering::SeqCst))
    }

    pub fn with_emulator<T>(&self, id: PtyId, f: impl FnOnce(&mut dyn Emulator) -> T) -> Result<T> {
        let session = self.get(id)?;
        let mut emu = session.emulator.lock().expect("emulator lock poisoned");
        Ok(f(emu.as_mut()))
    }

    /// Registers `cb` to fire once when `id` exits. Unlike
    /// [`Self::subscribe_lifecycle`], this is per-session and one-shot.
    pub fn on_exit(&self, id: PtyId, cb: impl FnOnce(Option<ExitStatus>) + Send + 'static) -> Result<()> {
        if self.get(id).is_err() {
            return Err(OpenmuxError::PtyNotFoundError(id.0.to_string()));
        }
        self.inner
            .exit_subs
            .lock()
            .expect("exit subs poisoned")
            .entry(id)
            .or_default()
            .push(Box::new(cb));
        Ok(())
    }

    pub fn get_cwd(&self, id: PtyId) -> String {
        let Ok(session) = self.get(id) else {
            return "unknown".to_string();
        };
        session
            .child_pid
            .and_then(|pid| introspect::process_cwd(pid as i32))
            .and_then(|p| p.to_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn get_foreground_process(&self, id: PtyId) -> String {
        let Ok(session) = self.get(id) else {
            return "unknown".to_string();
        };
        let leader = session.pair.lock().expect("pty pair lock poisoned").master.process_group_leader();
        introspect::foreground_process_name(leader)
    }

    pub fn get_title(&self, id: PtyId) -> String {
        self.get(id)
            .map(|s| s.emulator.lock().expect("emulator lock poisoned").title())
            .unwrap_or_default()
    }

    pub fn get_git_info(&self, cwd: &Path) -> GitInfo {
        self.inner.git.get(cwd)
    }

    pub fn subscribe_lifecycle(&self, cb: impl Fn(LifecycleEvent) + Send + 'static) -> SubscriptionId {
        let key = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lifecycle_subs
            .lock()
            .expect("lifecycle subs poisoned")
            .insert(key, Box::new(cb));
        SubscriptionId(key, SubscriptionKind::Lifecycle)
    }

    pub fn subscribe_all_titles(&self, cb: impl Fn(PtyId, &str) + Send + 'static) -> SubscriptionId {
        let key = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .title_subs
            .lock()
            .expect("title subs poisoned")
            .insert(key, Box::new(cb));
        SubscriptionId(key, SubscriptionKind::Title)
    }

    /// Detaches a subscription synchronously (spec §5): once this returns,
    /// the callback is removed from its map and no later lifecycle/title
    /// event will reach it.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        match id.1 {
            SubscriptionKind::Lifecycle => {
                self.inner
                    .lifecycle_subs
                    .lock()
                    .expect("lifecycle subs poisoned")
                    .remove(&id.0);
            }
            SubscriptionKind::Title => {
                self.inner
                    .title_subs
                    .lock()
                    .expect("title subs poisoned")
                    .remove(&id.0);
            }
        }
    }
}

impl Default for PtyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_and_destroy_a_shell_session() {
        let registry = PtyRegistry::new();
        let id = registry
            .create(PtyOptions {
                shell: Some("/bin/sh".to_string()),
                ..Default::default()
            })
            .expect("spawn failed");
        assert!(registry.list().contains(&id));
        registry.write(id, b"echo hi\n").expect("write failed");
        registry.destroy(id).expect("destroy failed");
        assert!(registry.get(id).is_err());
    }

    #[test]
    fn operating_on_unknown_id_returns_not_found() {
        let registry = PtyRegistry::new();
        let bogus = PtyId(999_999);
        assert!(matches!(
            registry.write(bogus, b"x"),
            Err(OpenmuxError::PtyNotFoundError(_))
        ));
    }

    #[test]
    fn get_cwd_of_unknown_id_is_unknown_not_an_error() {
        let registry = PtyRegistry::new();
        assert_eq!(registry.get_cwd(PtyId(999_999)), "unknown");
    }

    #[test]
    fn unsubscribe_stops_further_lifecycle_callbacks() {
        let registry = PtyRegistry::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = Arc::clone(&seen);
        // subscribe_lifecycle's Created event fires synchronously inside
        // create(), so this test doesn't need to race a reader thread.
        let sub = registry.subscribe_lifecycle(move |_| {
            seen_cb.fetch_add(1, Ordering::SeqCst);
        });

        let first = registry
            .create(PtyOptions { shell: Some("/bin/sh".to_string()), ..Default::default() })
            .expect("spawn failed");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        registry.unsubscribe(sub);

        let second = registry
            .create(PtyOptions { shell: Some("/bin/sh".to_string()), ..Default::default() })
            .expect("spawn failed");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        registry.destroy(first).expect("destroy failed");
        registry.destroy(second).expect("destroy failed");
    }
}
