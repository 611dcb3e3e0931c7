//! File-sharing line protocol.
//!
//! A client authenticates, then lists and fetches files:
//!
//! ```text
//! Request:  1 CUMP alice          Response: 1 OK
//! Request:  2 LIST                Response: 2 ARQS 2 a.txt,b.txt
//! Request:  3 PEGA a.txt          Response: 3 ARQ 5 hello
//! Request:  4 TERM                Response: 4 OK
//! ```
//!
//! Every response echoes the sequence number of the request that triggered
//! it. Failures of any kind are a bare `<seq> NOK`.
//!
//! Requests and responses are `\n` terminated. ARQ contents are raw bytes,
//! so clients must read exactly `<len>` bytes after the header rather than
//! scanning for the next newline.

pub mod handler;
pub mod parser;
pub mod session;

pub use handler::handle_connection;
pub use session::Session;
