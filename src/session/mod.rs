//! Session persistence and switching (spec §4.F): named sets of workspaces
//! saved to and restored from disk, independent of any single PTY.

pub mod coordinator;
pub mod persistence;
pub mod types;

pub use coordinator::SessionCoordinator;
pub use persistence::SessionStore;
pub use types::{Session, SessionId, SessionIndex, SessionMeta, SessionSummary, WorkspaceSnapshot};
