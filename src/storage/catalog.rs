use crate::error::{Error, Result};
use bytes::Bytes;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Live view of the served directory.
///
/// Nothing is cached: every call reads the file system at request time.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
}

impl FileCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self { root: root.into() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List entry names of the served directory, in the order the
    /// underlying listing returns them.
    ///
    /// Names that are not valid UTF-8 are left out, since PEGA could never
    /// name them.
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::storage(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(&self.root, e))?
        {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => debug!(name = ?name, "Skipping non UTF-8 file name"),
            }
        }

        trace!(count = names.len(), "Listed served directory");
        Ok(names)
    }

    /// Read a whole file. An empty file is a valid, zero-length result.
    pub async fn read_whole(&self, name: &str) -> Result<Bytes> {
        let path = self
            .resolve(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(name.to_string())),
            Err(e) => Err(Error::storage(path, e)),
        }
    }

    /// Map a requested name onto a path inside the root.
    ///
    /// Only a single plain component is accepted, so a request can never
    /// leave the served directory.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Some(self.root.join(part)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_list_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();

        let catalog = FileCatalog::new(dir.path());
        let names = catalog.list_names().await.unwrap();
        assert_eq!(sorted(names), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_list_reflects_current_contents() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path());
        assert!(catalog.list_names().await.unwrap().is_empty());

        fs::write(dir.path().join("late.txt"), "x").unwrap();
        assert_eq!(catalog.list_names().await.unwrap(), vec!["late.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let raw = OsStr::from_bytes(b"bad\xffname");
        if fs::write(dir.path().join(raw), "x").is_err() {
            // File system refuses non UTF-8 names; nothing to skip.
            return;
        }

        let catalog = FileCatalog::new(dir.path());
        assert_eq!(catalog.list_names().await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path().join("gone"));
        assert!(matches!(
            catalog.list_names().await,
            Err(Error::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_whole() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello\nworld").unwrap();
        fs::write(dir.path().join("empty"), b"").unwrap();

        let catalog = FileCatalog::new(dir.path());
        assert_eq!(&catalog.read_whole("a.txt").await.unwrap()[..], b"hello\nworld");
        assert!(catalog.read_whole("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path());
        assert!(matches!(
            catalog.read_whole("nope.txt").await,
            Err(Error::NotFound(name)) if name == "nope.txt"
        ));
    }

    #[tokio::test]
    async fn test_read_directory_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let catalog = FileCatalog::new(dir.path());
        assert!(matches!(
            catalog.read_whole("sub").await,
            Err(Error::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_names_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let served = dir.path().join("served");
        fs::create_dir(&served).unwrap();
        fs::write(dir.path().join("secret"), "x").unwrap();

        let catalog = FileCatalog::new(&served);
        for name in ["../secret", "..", ".", "/etc/passwd", "sub/file", ""] {
            assert!(
                matches!(catalog.read_whole(name).await, Err(Error::NotFound(_))),
                "{name} should be rejected"
            );
        }
    }
}
