//! Per-client connection loop.
//!
//! A client may send half a line, or a dozen lines, in one TCP segment.
//! Bytes are accumulated in a `BytesMut` buffer; every complete line in it
//! is answered, the replies for one batch are written with a single
//! `write_all`, and only then does the loop wait for more input.
//!
//! A malformed line earns an `ERR: ...` reply and the loop carries on. The
//! connection ends when the client sends `QUIT` or closes its side, when the
//! server's [`Context`] is cancelled, or on an I/O error.

use crate::commands::CommandHandler;
use crate::protocol::{parse_message, Command, Response};
use crate::storage::Context;
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Longest request line accepted, terminator included.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Bytes reserved ahead of each socket read.
const READ_CHUNK: usize = 4096;

/// Server-wide connection counters, shared by every handler.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub accepted: AtomicU64,
    pub active: AtomicU64,
    /// Lines that parsed into a command
    pub commands: AtomicU64,
    /// Lines answered with a parse error
    pub rejected: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub commands: u64,
    pub rejected: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

/// Serves one client until it quits, disconnects or the server stops.
pub struct ConnectionHandler {
    socket: TcpStream,
    peer: SocketAddr,
    inbound: BytesMut,
    /// Replies for the lines answered since the last write
    outbound: Vec<u8>,
    commands: CommandHandler,
    /// Passed to every store call; cancelling it ends the connection
    ctx: Context,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        peer: SocketAddr,
        commands: CommandHandler,
        ctx: Context,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();
        Self {
            socket,
            peer,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: Vec::new(),
            commands,
            ctx,
            stats,
        }
    }

    /// Runs the connection to completion.
    ///
    /// A client closing its side between lines, `QUIT`, and server shutdown
    /// all end in `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(peer = %self.peer, "Client connected");

        let outcome = self.serve().await;
        self.stats.closed();

        match &outcome {
            Ok(()) => info!(peer = %self.peer, "Client disconnected"),
            Err(e) if e.is_reset() => debug!(peer = %self.peer, "Connection reset by client"),
            Err(e) => warn!(peer = %self.peer, error = %e, "Connection failed"),
        }
        outcome
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let shutdown = self.ctx.token().clone();
        let peer = self.peer;

        loop {
            let quit = self.answer_buffered_lines();
            self.write_replies().await?;
            if quit {
                return Ok(());
            }

            let open = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(peer = %peer, "Closing connection for shutdown");
                    return Ok(());
                }
                read = self.fill_buffer() => read?,
            };
            if !open {
                return Ok(());
            }
        }
    }

    /// Answers every complete line in the buffer. Returns true after `QUIT`;
    /// lines pipelined behind it are ignored.
    fn answer_buffered_lines(&mut self) -> bool {
        while let Some((parsed, consumed)) = parse_message(&self.inbound) {
            self.inbound.advance(consumed);

            let (response, quit) = match parsed {
                Ok(command) => {
                    trace!(peer = %self.peer, command = command.name(), "Executing");
                    self.stats.commands.fetch_add(1, Ordering::Relaxed);
                    let quit = command == Command::Quit;
                    (self.commands.execute(&self.ctx, command), quit)
                }
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "Rejected line");
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    (Response::error(e.to_string()), false)
                }
            };
            response.serialize_into(&mut self.outbound);

            if quit {
                return true;
            }
        }
        false
    }

    async fn write_replies(&mut self) -> Result<(), ConnectionError> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        self.socket.write_all(&self.outbound).await?;
        self.stats
            .bytes_out
            .fetch_add(self.outbound.len() as u64, Ordering::Relaxed);
        self.outbound.clear();
        Ok(())
    }

    /// Reads once from the socket. Returns false when the client closed its
    /// side cleanly.
    async fn fill_buffer(&mut self) -> Result<bool, ConnectionError> {
        if self.inbound.len() >= MAX_LINE_LENGTH {
            return Err(ConnectionError::LineTooLong(self.inbound.len()));
        }
        self.inbound.reserve(READ_CHUNK);

        let n = self.socket.read_buf(&mut self.inbound).await?;
        if n == 0 {
            return if self.inbound.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::TruncatedLine(self.inbound.len()))
            };
        }

        self.stats.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
        Ok(true)
    }
}

/// Reasons a connection ends abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client closed the connection mid-line ({0} bytes pending)")]
    TruncatedLine(usize),

    #[error("request line longer than 64 KiB ({0} bytes buffered)")]
    LineTooLong(usize),
}

impl ConnectionError {
    fn is_reset(&self) -> bool {
        matches!(
            self,
            ConnectionError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset
        )
    }
}

/// Spawnable entry point: serves the connection and discards the outcome,
/// which [`ConnectionHandler::run`] has already logged.
pub async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    commands: CommandHandler,
    ctx: Context,
    stats: Arc<ConnectionStats>,
) {
    let _ = ConnectionHandler::new(socket, peer, commands, ctx, stats)
        .run()
        .await;
}
