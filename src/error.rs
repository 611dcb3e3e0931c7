//! Error taxonomy for sessions and storage.
//!
//! Only `StorageUnavailable` while loading the user list is fatal; every
//! other error is reported to the client as a bare NOK and logged here.

use crate::protocol::parser::ParseError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors produced while serving a session or touching storage
#[derive(Debug)]
pub enum Error {
    /// The request line could not be decoded
    MalformedRequest(ParseError),
    /// CUMP named a user that is not in the user list
    AuthenticationFailed(String),
    /// PEGA named a file that does not exist (or is not servable)
    NotFound(String),
    /// Reading the user list or the served directory failed
    StorageUnavailable { path: PathBuf, source: io::Error },
    /// A well-formed command arrived in a state that does not accept it
    UnexpectedCommand {
        command: String,
        state: &'static str,
    },
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::StorageUnavailable {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedRequest(e) => write!(f, "malformed request: {e}"),
            Error::AuthenticationFailed(user) => write!(f, "unknown user '{user}'"),
            Error::NotFound(name) => write!(f, "file '{name}' not found"),
            Error::StorageUnavailable { path, source } => {
                write!(f, "storage unavailable at '{}': {}", path.display(), source)
            }
            Error::UnexpectedCommand { command, state } => {
                write!(f, "command {command} not accepted while {state}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedRequest(e) => Some(e),
            Error::StorageUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::MalformedRequest(e)
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
