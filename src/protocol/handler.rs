//! Connection driver: frames request lines off the stream, feeds them to the
//! session and writes each response back.

use super::parser::{self, ParseResult};
use super::session::Session;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

/// Serve one client until its session closes or the peer goes away.
pub async fn handle_connection<S>(mut stream: S, mut session: Session) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let mut eof = false;

    loop {
        let parsed = if eof {
            parser::parse_final(&buffer)
        } else {
            parser::parse(&buffer)
        };

        let (decoded, consumed) = match parsed {
            ParseResult::Complete(request, consumed) => (Ok(request), consumed),
            ParseResult::Error(e, consumed) => (Err(e), consumed),
            ParseResult::Incomplete if eof => {
                trace!(
                    last_sequence = session.last_sequence(),
                    "Connection closed by client"
                );
                return Ok(());
            }
            ParseResult::Incomplete => {
                if stream.read_buf(&mut buffer).await? == 0 {
                    eof = true;
                }
                continue;
            }
        };
        buffer.advance(consumed);

        let response = session.handle(decoded).await;
        stream.write_all(&response.to_frame()).await?;

        if session.is_closed() {
            debug!(state = session.state().as_str(), "Session ended");
            stream.flush().await?;
            return Ok(());
        }
    }
}
