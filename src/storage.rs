//! Read-only storage collaborators.
//!
//! - `UserDirectory`: set of valid usernames, loaded once at startup
//! - `FileCatalog`: live view of the served directory, re-read per request
//!
//! Neither is mutated after construction, so both are shared between
//! sessions behind a plain `Arc` with no locking.

mod catalog;
mod users;

pub use catalog::FileCatalog;
pub use users::UserDirectory;
