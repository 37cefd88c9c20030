use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SESSION_FILE_NAME: &str = ".humble-cli-key";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session key not found at {}. Use 'humble-cli auth <SESSION-KEY>' to set it", .0.display())]
    NotConfigured(PathBuf),

    #[error("session key cannot be empty")]
    Empty,

    #[error("cannot find the home directory")]
    NoHomeDir,

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File holding the session cookie value between runs
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the user's home directory
    pub fn in_home_dir() -> Result<Self, SessionError> {
        let home = home::home_dir().ok_or(SessionError::NoHomeDir)?;
        Ok(Self::new(home.join(SESSION_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<String, SessionError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SessionError::NotConfigured(self.path.clone()),
            _ => SessionError::Io {
                path: self.path.clone(),
                source: e,
            },
        })?;

        let session_key = content.trim();
        if session_key.is_empty() {
            return Err(SessionError::Empty);
        }
        Ok(session_key.to_owned())
    }

    pub fn save(&self, session_key: &str) -> Result<(), SessionError> {
        let session_key = session_key.trim();
        if session_key.is_empty() {
            return Err(SessionError::Empty);
        }

        std::fs::write(&self.path, session_key).map_err(|source| SessionError::Io {
            path: self.path.clone(),
            source,
        })?;
        restrict_permissions(&self.path).map_err(|source| SessionError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join(SESSION_FILE_NAME));
        (dir, store)
    }

    #[test]
    fn save_then_load_trims() {
        let (_dir, store) = store();
        store.save("  secret-value\n").unwrap();
        assert_eq!(store.load().unwrap(), "secret-value");
    }

    #[test]
    fn missing_file_is_not_configured() {
        let (_dir, store) = store();
        assert!(matches!(store.load(), Err(SessionError::NotConfigured(_))));
    }

    #[test]
    fn empty_key_is_rejected() {
        let (_dir, store) = store();
        assert!(matches!(store.save("   "), Err(SessionError::Empty)));
        assert!(!store.path().exists());

        std::fs::write(store.path(), "\n").unwrap();
        assert!(matches!(store.load(), Err(SessionError::Empty)));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.save("secret").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
