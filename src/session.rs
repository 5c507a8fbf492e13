use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

/// The privileged flag lives under the OS temp directory, which the
/// platform clears on reboot. That gives the flag the session-storage
/// lifetime contract: it survives an app restart, not a machine restart.
const SESSION_FILE: &str = "knull-writeups.session";
const FLAG_VALUE: &str = "true";

pub fn session_path() -> PathBuf {
    std::env::temp_dir().join(SESSION_FILE)
}

/// True only when the flag file holds exactly `"true"`.
pub fn is_privileged(path: &Path) -> bool {
    match fs::read_to_string(path) {
        Ok(contents) => contents == FLAG_VALUE,
        Err(_) => false,
    }
}

pub fn set_privileged(path: &Path) {
    if let Err(err) = fs::write(path, FLAG_VALUE) {
        warn!("failed to persist session flag: {err}");
    }
}

pub fn clear_privileged(path: &Path) {
    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            warn!("failed to clear session flag: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_flag() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SESSION_FILE);
        (dir, path)
    }

    #[test]
    fn absent_flag_means_unprivileged() {
        let (_dir, path) = temp_flag();
        assert!(!is_privileged(&path));
    }

    #[test]
    fn set_then_clear_round_trips() {
        let (_dir, path) = temp_flag();
        set_privileged(&path);
        assert!(is_privileged(&path));
        clear_privileged(&path);
        assert!(!is_privileged(&path));
    }

    #[test]
    fn foreign_content_does_not_grant_privilege() {
        let (_dir, path) = temp_flag();
        fs::write(&path, "TRUE").expect("write");
        assert!(!is_privileged(&path));
    }

    #[test]
    fn clear_on_missing_file_is_harmless() {
        let (_dir, path) = temp_flag();
        clear_privileged(&path);
        assert!(!path.exists());
    }
}
