//! Typed error kinds for the core (spec §7).
//!
//! Follows a hand-rolled enum + manual `Display`/`Error` pattern rather than
//! pulling in a derive-macro error crate: a plain enum, `impl
//! std::fmt::Display`, `impl std::error::Error`, and `From` impls for the
//! error types we wrap.

use std::fmt;
use std::path::PathBuf;

/// Crate-wide error type. Each variant corresponds to one of the kinds named
/// in spec §7; the propagation policy (surface vs. swallow-and-log) lives at
/// the call site, not on the error type itself.
#[derive(Debug)]
pub enum OpenmuxError {
    /// OS failure spawning a PTY child (`fork`, `posix_spawn`, slave open).
    PtySpawnError(String),
    /// Operation referenced an unknown PTY id.
    PtyNotFoundError(String),
    /// CWD / foreground-process introspection failed. Callers swallow this
    /// and fall back to "unknown"; it is surfaced here only for logging.
    PtyCwdError(String),
    /// IO failure during session load/save.
    SessionStorageError(PathBuf, String),
    /// Session file failed to parse as JSON.
    SessionCorruptedError(PathBuf, String),
    /// Config file failed to load or parse; caller falls back to defaults.
    ConfigLoadError(String),
}

impl fmt::Display for OpenmuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenmuxError::PtySpawnError(msg) => write!(f, "failed to spawn pty: {msg}"),
            OpenmuxError::PtyNotFoundError(id) => write!(f, "no such pty: {id}"),
            OpenmuxError::PtyCwdError(msg) => write!(f, "pty introspection failed: {msg}"),
            OpenmuxError::SessionStorageError(path, msg) => {
                write!(f, "session storage error at {}: {msg}", path.display())
            }
            OpenmuxError::SessionCorruptedError(path, msg) => {
                write!(f, "corrupted session file {}: {msg}", path.display())
            }
            OpenmuxError::ConfigLoadError(msg) => write!(f, "config load error: {msg}"),
        }
    }
}

impl std::error::Error for OpenmuxError {}

impl From<std::io::Error> for OpenmuxError {
    fn from(err: std::io::Error) -> Self {
        OpenmuxError::PtySpawnError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpenmuxError>;
