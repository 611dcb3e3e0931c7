//! Per-connection session state machine.
//!
//! ```text
//! AwaitingAuth --CUMP known user--> Authenticated --TERM--> Closed
//!      |                                  |
//!      +--anything else----> Closed       +--malformed/missing arg--> Closed
//! ```
//!
//! The session never touches a socket; the connection handler feeds it
//! decoded lines and writes back whatever it returns.

use super::parser::{Command, ParseError, Request, Response};
use crate::error::{Error, Result};
use crate::storage::{FileCatalog, UserDirectory};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAuth,
    Authenticated,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AwaitingAuth => "awaiting authentication",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        }
    }
}

/// State for one client connection.
///
/// The sequence number is owned by the session and only ever reflects the
/// last request this client sent.
pub struct Session {
    state: SessionState,
    last_sequence: i64,
    users: Arc<UserDirectory>,
    catalog: Arc<FileCatalog>,
}

impl Session {
    pub fn new(users: Arc<UserDirectory>, catalog: Arc<FileCatalog>) -> Self {
        Self {
            state: SessionState::AwaitingAuth,
            last_sequence: 0,
            users,
            catalog,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Sequence number of the most recently decoded request
    pub fn last_sequence(&self) -> i64 {
        self.last_sequence
    }

    /// Apply one framed line and produce its response.
    ///
    /// A line that failed to decode always closes the session. Before
    /// authentication a bare sequence number still becomes the echoed one;
    /// afterwards the previous request's number is kept.
    pub async fn handle(&mut self, decoded: std::result::Result<Request, ParseError>) -> Response {
        match decoded {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                if let ParseError::MissingCommand { sequence } = e {
                    if self.state == SessionState::AwaitingAuth {
                        self.last_sequence = sequence;
                    }
                }
                self.close_with(Error::MalformedRequest(e))
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> Response {
        self.last_sequence = request.sequence;
        let sequence = request.sequence;
        trace!(sequence, command = request.command.as_str(), state = self.state.as_str(), "Dispatching");

        match (self.state, &request.command) {
            (SessionState::AwaitingAuth, Command::Cump) => match self.authenticate(&request) {
                Ok(()) => {
                    self.state = SessionState::Authenticated;
                    Response::ok(sequence)
                }
                Err(e) => self.close_with(e),
            },

            (SessionState::Authenticated, Command::List) => match self.list().await {
                Ok(names) => Response::files(sequence, names),
                Err(e) => self.recover_with(e),
            },

            (SessionState::Authenticated, Command::Pega) => {
                let Some(name) = request.argument(0) else {
                    return self.close_with(ParseError::MissingArgument("filename").into());
                };
                match self.catalog.read_whole(name).await {
                    Ok(contents) => {
                        debug!(file = name, bytes = contents.len(), "Sending file");
                        Response::file(sequence, contents)
                    }
                    Err(e) => self.recover_with(e),
                }
            }

            (SessionState::Authenticated, Command::Term) => {
                debug!("Client terminated session");
                self.state = SessionState::Closed;
                Response::ok(sequence)
            }

            (SessionState::Authenticated, command) => self.recover_with(Error::UnexpectedCommand {
                command: command.as_str().to_string(),
                state: self.state.as_str(),
            }),

            (state, command) => self.close_with(Error::UnexpectedCommand {
                command: command.as_str().to_string(),
                state: state.as_str(),
            }),
        }
    }

    fn authenticate(&self, request: &Request) -> Result<()> {
        let username = request
            .argument(0)
            .ok_or(ParseError::MissingArgument("username"))?;

        if self.users.contains(username) {
            info!(user = username, "User authenticated");
            Ok(())
        } else {
            Err(Error::AuthenticationFailed(username.to_string()))
        }
    }

    /// Non-empty listing of the served directory; an empty one is `NotFound`.
    async fn list(&self) -> Result<Vec<String>> {
        let names = self.catalog.list_names().await?;
        if names.is_empty() {
            return Err(Error::NotFound(self.catalog.root().display().to_string()));
        }
        Ok(names)
    }

    /// NOK, session continues
    fn recover_with(&self, error: Error) -> Response {
        match &error {
            Error::StorageUnavailable { .. } => warn!(error = %error, "Request failed"),
            _ => debug!(error = %error, "Request rejected"),
        }
        Response::nok(self.last_sequence)
    }

    /// NOK, session ends
    fn close_with(&mut self, error: Error) -> Response {
        match &error {
            Error::AuthenticationFailed(_) => info!(error = %error, "Closing session"),
            _ => warn!(error = %error, "Closing session"),
        }
        self.state = SessionState::Closed;
        Response::nok(self.last_sequence)
    }
}
