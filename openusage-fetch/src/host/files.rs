//! Filesystem access with `~` expansion and owner-only writes.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::FileError;

/// Filesystem host API.
///
/// Paths starting with `~/` are resolved against the home directory, which
/// can be overridden so tests never touch the real one.
#[derive(Debug, Clone, Default)]
pub struct FileSystem {
    home: Option<PathBuf>,
}

impl FileSystem {
    /// Uses the current user's home directory.
    pub fn new() -> Self {
        Self { home: None }
    }

    /// Resolves `~` against `home` instead of the real home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    /// The home directory used for `~` expansion.
    pub fn home(&self) -> Result<PathBuf, FileError> {
        self.home.clone().or_else(dirs::home_dir).ok_or(FileError::NoHomeDir)
    }

    /// Expands a leading `~` or `~/`.
    pub fn expand(&self, path: &str) -> Result<PathBuf, FileError> {
        if path == "~" {
            return self.home();
        }
        match path.strip_prefix("~/") {
            Some(rest) => Ok(self.home()?.join(rest)),
            None => Ok(PathBuf::from(path)),
        }
    }

    /// Whether the path exists.
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Reads a file as UTF-8; `Ok(None)` when it does not exist.
    pub async fn read_text(&self, path: &Path) -> Result<Option<String>, FileError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FileError::io(path, e)),
        }
    }

    /// Writes a file atomically (temp file + rename) with 0600 permissions,
    /// creating missing parent directories with 0700.
    pub async fn write_text(&self, path: &Path, text: &str) -> Result<(), FileError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.exists(parent).await {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FileError::io(parent, e))?;
                set_mode(parent, 0o700).await?;
            }
        }

        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, text)
            .await
            .map_err(|e| FileError::io(&temp, e))?;
        set_mode(&temp, 0o600).await?;
        tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| FileError::io(path, e))?;

        debug!(path = %path.display(), "File written");
        Ok(())
    }

    /// Removes a file; missing files are ignored.
    pub async fn remove(&self, path: &Path) -> Result<(), FileError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileError::io(path, e)),
        }
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), FileError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| FileError::io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), FileError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let fs = FileSystem::with_home("/home/alice");
        assert_eq!(
            fs.expand("~/.claude/.credentials.json").unwrap(),
            PathBuf::from("/home/alice/.claude/.credentials.json")
        );
        assert_eq!(fs.expand("~").unwrap(), PathBuf::from("/home/alice"));
        assert_eq!(fs.expand("/etc/hosts").unwrap(), PathBuf::from("/etc/hosts"));
        assert_eq!(fs.expand("~other/x").unwrap(), PathBuf::from("~other/x"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystem::with_home(dir.path());
        let path = fs.expand("~/nested/dir/auth.json").unwrap();

        assert_eq!(fs.read_text(&path).await.unwrap(), None);
        fs.write_text(&path, "{\"a\":1}").await.unwrap();
        assert_eq!(fs.read_text(&path).await.unwrap().as_deref(), Some("{\"a\":1}"));

        fs.remove(&path).await.unwrap();
        fs.remove(&path).await.unwrap();
        assert!(!fs.exists(&path).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret").join("token.json");
        FileSystem::new().write_text(&path, "x").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
