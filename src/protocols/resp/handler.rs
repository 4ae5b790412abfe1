//! RESP protocol connection handler.
//!
//! Reads inline commands from a connection, executes them against the
//! storage backend and writes back RESP replies.

use super::command::{trim_line_end, Command};
use super::frame::Frame;
use crate::server::ServerState;
use crate::storage::Storage;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::trace;

/// Maximum bytes taken from the socket per read, i.e. per command
pub const READ_CHUNK_SIZE: usize = 1024;

/// Execute a command and return the reply frame
pub fn execute(cmd: Command, storage: &Storage) -> Frame {
    match cmd {
        Command::Ping => Frame::simple("PONG"),

        Command::Set { key, value } => {
            storage.set(key, value);
            Frame::simple("OK")
        }

        Command::Get { key } => match storage.get(&key) {
            Some(value) => Frame::bulk(value),
            None => Frame::null(),
        },

        Command::Del { keys } => {
            let count = keys.iter().filter(|key| storage.del(key)).count();
            Frame::integer(count as i64)
        }
    }
}

/// Process one received chunk. Returns `None` for blank lines, which get no reply.
pub fn process_chunk(chunk: &[u8], storage: &Storage) -> Option<Frame> {
    let line = trim_line_end(chunk);
    if line.is_empty() {
        return None;
    }

    let frame = match Command::parse(Bytes::copy_from_slice(line)) {
        Ok(cmd) => {
            trace!(?cmd, "Processing command");
            execute(cmd, storage)
        }
        Err(e) => {
            trace!(error = %e, "Rejected command");
            Frame::error(e.to_string())
        }
    };
    Some(frame)
}

/// Resolves once the server has left the listening state
pub(crate) async fn server_stopping(state: &mut watch::Receiver<ServerState>) {
    // A closed channel means the server is gone, which also ends the wait
    let _ = state.wait_for(|s| *s != ServerState::Listening).await;
}

/// Handle a single client connection until the peer disconnects or the
/// server stops
pub async fn handle_connection<S>(
    mut stream: S,
    storage: Arc<Storage>,
    mut state: watch::Receiver<ServerState>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            res = stream.read(&mut buffer) => res?,
            _ = server_stopping(&mut state) => {
                trace!("Server stopping, closing connection");
                return Ok(());
            }
        };

        if n == 0 {
            trace!("Connection closed by client");
            return Ok(());
        }

        if let Some(reply) = process_chunk(&buffer[..n], &storage) {
            stream.write_all(&reply.encode()).await?;
        }
    }
}
