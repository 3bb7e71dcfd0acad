//! Process inspection via OS facilities, never subprocess spawns (spec
//! §4.C). Linux-only `/proc` reads for cwd and command name; the foreground
//! process group leader itself comes from `portable_pty::MasterPty`'s own
//! `process_group_leader` (a thin wrapper over `tcgetpgrp` on the PTY master
//! fd), so the registry never needs to touch a raw fd directly. No teacher
//! file does this kind of introspection; built fresh.

use std::fs;
use std::path::PathBuf;

const UNKNOWN: &str = "unknown";

/// Reads `/proc/<pid>/cwd`. Returns `None` (never an error) per spec §4.C:
/// "`get_cwd`/`get_foreground_process` failures never throw."
pub fn process_cwd(pid: i32) -> Option<PathBuf> {
    fs::read_link(format!("/proc/{pid}/cwd")).ok()
}

/// Resolves the command name for a foreground process group leader pid
/// already obtained from `MasterPty::process_group_leader`.
pub fn foreground_process_name(pgrp: Option<libc::pid_t>) -> String {
    pgrp.and_then(command_name).unwrap_or_else(|| UNKNOWN.to_string())
}

fn command_name(pid: libc::pid_t) -> Option<String> {
    let comm = fs::read_to_string(format!("/proc/{pid}/comm")).ok()?;
    Some(comm.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_cwd_of_nonexistent_pid_is_none() {
        assert!(process_cwd(i32::MAX).is_none());
    }

    #[test]
    fn command_name_of_current_process_resolves() {
        let pid = std::process::id() as libc::pid_t;
        assert!(command_name(pid).is_some());
    }

    #[test]
    fn foreground_process_name_of_none_is_unknown() {
        assert_eq!(foreground_process_name(None), "unknown");
    }
}
