use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Immutable set of usernames allowed to authenticate with CUMP
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashSet<String>,
}

impl UserDirectory {
    /// Load the user list, one username per line.
    ///
    /// Surrounding whitespace is trimmed, blank lines are skipped and
    /// duplicates collapse. An unreadable source is `StorageUnavailable`.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        let directory = Self::parse(&contents);

        info!(path = %path.display(), users = directory.len(), "Loaded user list");
        Ok(Arc::new(directory))
    }

    fn parse(contents: &str) -> Self {
        let users = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { users }
    }

    /// Membership test
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            users: iter.into_iter().map(Into::into).collect(),
        }
    }
}
