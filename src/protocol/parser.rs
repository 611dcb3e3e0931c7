//! Request/response codec.
//!
//! Requests: `<seq> <COMMAND> [args...]`, whitespace separated, one per line.
//! Responses: `<seq> OK`, `<seq> NOK`, `<seq> ARQS <count> <a,b,...>`,
//! `<seq> ARQ <len> <raw bytes>`.
//!
//! `Response::decode` is the client-side half of the codec. The server
//! itself only encodes responses.
//!
//! Nothing is escaped. A filename containing a space or a comma cannot be
//! represented in an ARQS listing, and that limitation is kept as-is to stay
//! wire compatible.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::str;

/// Longest request line accepted before the newline
pub const MAX_LINE_LENGTH: usize = 1024;

/// Request command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate: `CUMP <username>`
    Cump,
    /// List served files
    List,
    /// Fetch a file: `PEGA <filename>`
    Pega,
    /// End the session
    Term,
    /// Anything else, kept verbatim for diagnostics
    Unknown(String),
}

impl Command {
    fn from_token(token: &str) -> Self {
        match token {
            "CUMP" => Command::Cump,
            "LIST" => Command::List,
            "PEGA" => Command::Pega,
            "TERM" => Command::Term,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Cump => "CUMP",
            Command::List => "LIST",
            Command::Pega => "PEGA",
            Command::Term => "TERM",
            Command::Unknown(verb) => verb,
        }
    }
}

/// One decoded request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Client-supplied sequence number, echoed in the response
    pub sequence: i64,
    pub command: Command,
    /// Positional arguments after the command
    pub arguments: Vec<String>,
}

impl Request {
    /// Decode a single request line (without its newline).
    pub fn decode(line: &[u8]) -> Result<Self, ParseError> {
        let line = str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
        let mut tokens = line.split_whitespace();

        let (sequence, command) = match (tokens.next(), tokens.next()) {
            (Some(sequence), Some(command)) => (sequence, command),
            (Some(sequence), None) => {
                return Err(match sequence.parse() {
                    Ok(sequence) => ParseError::MissingCommand { sequence },
                    Err(_) => ParseError::TooFewTokens,
                })
            }
            _ => return Err(ParseError::TooFewTokens),
        };

        Ok(Request {
            sequence: parse_sequence(sequence.as_bytes())?,
            command: Command::from_token(command),
            arguments: tokens.map(str::to_string).collect(),
        })
    }

    /// Positional argument by index
    pub fn argument(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(String::as_str)
    }
}

/// Result of framing and decoding the next request from a buffer
#[derive(Debug)]
pub enum ParseResult {
    /// A request line was decoded; `usize` is the number of bytes consumed
    Complete(Request, usize),
    /// No full line buffered yet
    Incomplete,
    /// A full line was consumed but did not decode
    Error(ParseError, usize),
}

/// Frame and decode the next newline-terminated request in `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    match find_lf(input) {
        Some(end) => decode_line(&input[..end], end + 1),
        // A trailing `\r` may still be followed by its `\n`.
        None if input.len() > MAX_LINE_LENGTH + usize::from(input.last() == Some(&b'\r')) => {
            ParseResult::Error(ParseError::LineTooLong, input.len())
        }
        None => ParseResult::Incomplete,
    }
}

/// Decode whatever is left in `input` as one final, unterminated line.
///
/// Used once the peer has closed its write side.
pub fn parse_final(input: &[u8]) -> ParseResult {
    match parse(input) {
        ParseResult::Incomplete if input.is_empty() => ParseResult::Incomplete,
        ParseResult::Incomplete => decode_line(input, input.len()),
        other => other,
    }
}

fn decode_line(line: &[u8], consumed: usize) -> ParseResult {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() > MAX_LINE_LENGTH {
        return ParseResult::Error(ParseError::LineTooLong, consumed);
    }
    match Request::decode(line) {
        Ok(request) => ParseResult::Complete(request, consumed),
        Err(e) => ParseResult::Error(e, consumed),
    }
}

/// Response status and its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Nok,
    /// File listing; the count on the wire is the number of names
    Arqs(Vec<String>),
    /// Whole file contents; the length on the wire is the byte length
    Arq(Bytes),
}

/// One response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub sequence: i64,
    pub status: Status,
}

impl Response {
    pub fn ok(sequence: i64) -> Self {
        Self {
            sequence,
            status: Status::Ok,
        }
    }

    pub fn nok(sequence: i64) -> Self {
        Self {
            sequence,
            status: Status::Nok,
        }
    }

    pub fn files(sequence: i64, names: Vec<String>) -> Self {
        Self {
            sequence,
            status: Status::Arqs(names),
        }
    }

    pub fn file(sequence: i64, contents: Bytes) -> Self {
        Self {
            sequence,
            status: Status::Arq(contents),
        }
    }

    /// Render the response line, without a line terminator.
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut out);
        out
    }

    /// Render the response line followed by `\n`, ready for the socket.
    pub fn to_frame(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.encoded_len_hint() + 1);
        self.encode_into(&mut out);
        out.put_u8(b'\n');
        out
    }

    fn encode_into(&self, out: &mut BytesMut) {
        out.put_slice(self.sequence.to_string().as_bytes());
        match &self.status {
            Status::Ok => out.put_slice(b" OK"),
            Status::Nok => out.put_slice(b" NOK"),
            Status::Arqs(names) => {
                out.put_slice(format!(" ARQS {} ", names.len()).as_bytes());
                out.put_slice(names.join(",").as_bytes());
            }
            Status::Arq(contents) => {
                out.put_slice(format!(" ARQ {} ", contents.len()).as_bytes());
                out.put_slice(contents);
            }
        }
    }

    fn encoded_len_hint(&self) -> usize {
        let payload = match &self.status {
            Status::Ok | Status::Nok => 0,
            Status::Arqs(names) => names.iter().map(|n| n.len() + 1).sum::<usize>() + 8,
            Status::Arq(contents) => contents.len() + 8,
        };
        24 + payload
    }

    /// Decode a response line (without its trailing newline).
    #[allow(dead_code)] // client side; the server only encodes
    pub fn decode(line: &[u8]) -> Result<Self, ParseError> {
        let mut parts = line.splitn(3, |&b| b == b' ');
        let sequence = parse_sequence(parts.next().unwrap_or_default())?;
        let status = parts.next().ok_or(ParseError::TooFewTokens)?;
        let rest = parts.next();

        let status = match (status, rest) {
            (b"OK", None) => Status::Ok,
            (b"NOK", None) => Status::Nok,
            (b"OK" | b"NOK", Some(_)) => return Err(ParseError::TrailingData),
            (b"ARQS", Some(rest)) => {
                let (count, names) = split_length(rest)?;
                let names = str::from_utf8(names).map_err(|_| ParseError::InvalidUtf8)?;
                let names: Vec<String> = if names.is_empty() {
                    Vec::new()
                } else {
                    names.split(',').map(str::to_string).collect()
                };
                if names.len() != count {
                    return Err(ParseError::LengthMismatch {
                        expected: count,
                        actual: names.len(),
                    });
                }
                Status::Arqs(names)
            }
            (b"ARQ", Some(rest)) => {
                let (length, contents) = split_length(rest)?;
                if contents.len() != length {
                    return Err(ParseError::LengthMismatch {
                        expected: length,
                        actual: contents.len(),
                    });
                }
                Status::Arq(Bytes::copy_from_slice(contents))
            }
            (b"ARQS" | b"ARQ", None) => return Err(ParseError::TooFewTokens),
            (other, _) => {
                return Err(ParseError::UnknownStatus(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };

        Ok(Response { sequence, status })
    }
}

/// Split `<len> <payload>` at the first space.
fn split_length(input: &[u8]) -> Result<(usize, &[u8]), ParseError> {
    let space = input
        .iter()
        .position(|&b| b == b' ')
        .ok_or(ParseError::TooFewTokens)?;
    let token = &input[..space];
    let length = str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(token).into_owned()))?;
    Ok((length, &input[space + 1..]))
}

fn parse_sequence(token: &[u8]) -> Result<i64, ParseError> {
    str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidSequence(String::from_utf8_lossy(token).into_owned()))
}

/// Find `\n` in buffer.
fn find_lf(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than the two mandatory tokens
    TooFewTokens,
    /// Only a sequence number was sent
    MissingCommand { sequence: i64 },
    /// Command requires an argument that was not given
    MissingArgument(&'static str),
    /// First token is not an integer
    InvalidSequence(String),
    /// Line is not valid UTF-8
    InvalidUtf8,
    /// No newline within `MAX_LINE_LENGTH` bytes
    LineTooLong,
    /// Response status word not recognised
    UnknownStatus(String),
    /// Count or byte length is not a number
    InvalidLength(String),
    /// Count or byte length disagrees with the payload
    LengthMismatch { expected: usize, actual: usize },
    /// OK/NOK followed by extra tokens
    TrailingData,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooFewTokens => write!(f, "too few tokens"),
            ParseError::MissingCommand { sequence } => {
                write!(f, "missing command after sequence {sequence}")
            }
            ParseError::MissingArgument(name) => write!(f, "missing {name} argument"),
            ParseError::InvalidSequence(token) => write!(f, "invalid sequence number '{token}'"),
            ParseError::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
            ParseError::LineTooLong => write!(f, "line exceeds {MAX_LINE_LENGTH} bytes"),
            ParseError::UnknownStatus(status) => write!(f, "unknown status '{status}'"),
            ParseError::InvalidLength(token) => write!(f, "invalid length '{token}'"),
            ParseError::LengthMismatch { expected, actual } => {
                write!(f, "length {expected} does not match payload of {actual}")
            }
            ParseError::TrailingData => write!(f, "unexpected data after status"),
        }
    }
}

impl std::error::Error for ParseError {}
