//! On-disk state layout for ggcode (§6).
//!
//! ```text
//! ${HOME}/.ggcode/
//! ├── config.json              (loaded by ggcode-config)
//! └── sessions/
//!     ├── <id>.json            (session record)
//!     ├── <id>-history.json    (ordered legacy-message array)
//!     └── .current             (plain-text current session id)
//! ```

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Resolved `~/.ggcode/` directory.
#[derive(Debug, Clone)]
pub struct GgcodeHome {
    root: PathBuf,
}

impl GgcodeHome {
    /// Resolve the home directory from `$GGCODE_HOME`, falling back to
    /// `$HOME/.ggcode`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$GGCODE_HOME` is set but relative, or if neither
    /// `$GGCODE_HOME` nor `$HOME` is set.
    pub fn resolve() -> CoreResult<Self> {
        if let Ok(custom) = std::env::var("GGCODE_HOME") {
            let path = PathBuf::from(&custom);
            if !path.is_absolute() {
                return Err(CoreError::PathNotAbsolute("GGCODE_HOME".into()));
            }
            return Ok(Self { root: path });
        }
        let home = std::env::var("HOME")
            .map_err(|_| CoreError::HomeUnresolved("HOME is not set".into()))?;
        Ok(Self {
            root: PathBuf::from(home).join(".ggcode"),
        })
    }

    /// Build from an explicit root, bypassing environment resolution.
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory tree if it doesn't already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.sessions_dir()).map_err(|source| CoreError::Io {
            path: self.sessions_dir().display().to_string(),
            source,
        })
    }

    /// Root directory (`~/.ggcode`).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to `config.json`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Sessions directory (`~/.ggcode/sessions`).
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Path to a session's metadata file.
    #[must_use]
    pub fn session_file(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{id}.json"))
    }

    /// Path to a session's history file.
    #[must_use]
    pub fn history_file(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{id}-history.json"))
    }

    /// Path to the current-session pointer file.
    #[must_use]
    pub fn current_session_path(&self) -> PathBuf {
        self.sessions_dir().join(".current")
    }

    /// Directory holding spool files for truncated tool output
    /// (`~/.ggcode/tool-output`), created lazily by the tool executor.
    #[must_use]
    pub fn tool_output_dir(&self) -> PathBuf {
        self.root.join("tool-output")
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn resolve_with_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        // SAFETY: serialized by ENV_MUTEX
        unsafe { std::env::set_var("GGCODE_HOME", &path) };
        let home = GgcodeHome::resolve().unwrap();
        assert_eq!(home.root(), path);
        unsafe { std::env::remove_var("GGCODE_HOME") };
    }

    #[test]
    fn resolve_default_appends_dotdir() {
        let _guard = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::remove_var("GGCODE_HOME") };
        let home = GgcodeHome::resolve().unwrap();
        let expected = PathBuf::from(std::env::var("HOME").unwrap()).join(".ggcode");
        assert_eq!(home.root(), expected);
    }

    #[test]
    fn rejects_relative_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("GGCODE_HOME", "relative/path") };
        let err = GgcodeHome::resolve().unwrap_err();
        assert!(matches!(err, CoreError::PathNotAbsolute(_)));
        unsafe { std::env::remove_var("GGCODE_HOME") };
    }

    #[test]
    fn ensure_creates_sessions_dir() {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        home.ensure().unwrap();
        assert!(home.sessions_dir().is_dir());
    }

    #[test]
    fn path_accessors() {
        let home = GgcodeHome::from_path("/tmp/ggcode-test");
        assert_eq!(
            home.config_path(),
            PathBuf::from("/tmp/ggcode-test/config.json")
        );
        assert_eq!(
            home.session_file("abc"),
            PathBuf::from("/tmp/ggcode-test/sessions/abc.json")
        );
        assert_eq!(
            home.history_file("abc"),
            PathBuf::from("/tmp/ggcode-test/sessions/abc-history.json")
        );
        assert_eq!(
            home.current_session_path(),
            PathBuf::from("/tmp/ggcode-test/sessions/.current")
        );
    }
}
