//! Core engine for a terminal multiplexer: PTY registry, VT emulator surface,
//! packed cell-grid wire format, master-stack layout, session persistence,
//! modal input routing, and cross-session aggregate view.
//!
//! Byte-level rendering to the host terminal, the host-terminal capability
//! probe, the config-file loader's static keybinding structure, image
//! passthrough, and a remote client/server split are external collaborators
//! and are not implemented here — see `spec.md` §1.

pub mod aggregate;
pub mod cell;
pub mod config;
pub mod emulator;
pub mod error;
pub mod git;
pub mod input;
pub mod layout;
pub mod pty;
pub mod scrollback;
pub mod selection;
pub mod session;
pub mod ui;

pub use error::OpenmuxError;
