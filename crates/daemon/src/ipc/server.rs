//! IPC Server for handling CLI connections via Unix Domain Sockets.
//!
//! The server listens on a Unix socket and accepts connections from CLI
//! clients. Each connection runs on its own task; requests on one connection
//! are answered in order.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::messages::Message;
use protocol::{Envelope, ProtocolError};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::router::{MessageRouter, RouterError};

/// Longest request line accepted from a peer (64MB).
///
/// Uploads travel inline as JSON byte arrays, so this sits well above the
/// default file size limit.
pub const MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

/// A server that listens for IPC connections on a Unix Domain Socket.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Bind the server to the specified socket path.
    ///
    /// This will create the socket file and any necessary parent directories.
    /// If a socket file already exists at the path, it will be removed first.
    pub async fn bind(path: &Path) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Remove a stale socket left by a previous run
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// The socket path this server is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept a new incoming connection.
    pub async fn accept(&self) -> Result<IpcConnection, io::Error> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(IpcConnection::new(stream))
    }

    /// Serve requests until `shutdown` completes, then remove the socket file.
    pub async fn serve<F>(self, router: Arc<MessageRouter>, shutdown: F) -> Result<(), IpcError>
    where
        F: Future<Output = ()>,
    {
        info!(path = %self.path.display(), "IPC server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down IPC server");
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok(conn) => {
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            if let Err(e) = conn.serve(&router).await {
                                debug!(error = %e, "Connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
        }
        Ok(())
    }
}

/// A connection to an IPC client.
///
/// This struct wraps a Unix stream and provides methods for reading and
/// writing envelopes using the JSON newline-delimited protocol.
pub struct IpcConnection {
    reader: BufReader<tokio::io::ReadHalf<UnixStream>>,
    writer: tokio::io::WriteHalf<UnixStream>,
    max_line_length: usize,
}

impl IpcConnection {
    /// Create a new IPC connection from a Unix stream.
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Set the longest line accepted from the peer.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Read the next envelope from the peer.
    ///
    /// Returns `None` if the peer has disconnected. A line longer than the
    /// limit fails with [`IpcError::LineTooLong`].
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, IpcError> {
        let limit = self.max_line_length as u64 + 1;
        let mut line = String::new();
        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_line(&mut line)
            .await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if bytes_read as u64 == limit && !line.ends_with('\n') {
            return Err(IpcError::LineTooLong(self.max_line_length));
        }

        let envelope = Envelope::from_json(line.trim())?;
        Ok(Some(envelope))
    }

    /// Send an envelope to the peer.
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), IpcError> {
        let mut json = envelope.to_json()?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Answer requests until the peer disconnects.
    ///
    /// A line that cannot be parsed gets an error reply with sequence 0 and
    /// the connection stays open.
    pub async fn serve(mut self, router: &MessageRouter) -> Result<(), IpcError> {
        loop {
            let reply = match self.read_envelope().await {
                Ok(Some(envelope)) => router.handle(envelope).await,
                Ok(None) => return Ok(()),
                Err(IpcError::Protocol(e)) => {
                    debug!(error = %e, "Malformed request");
                    let err = RouterError::from(e);
                    Envelope::new(0, Message::Error(err.to_error_message(None)))
                }
                Err(IpcError::LineTooLong(limit)) => {
                    // The rest of the line is unread, so the stream cannot be resynchronized.
                    warn!(limit, "Request line too long, closing connection");
                    let err = RouterError::InvalidRequest(format!(
                        "request exceeds {} bytes",
                        limit
                    ));
                    let reply = Envelope::new(0, Message::Error(err.to_error_message(None)));
                    self.send_envelope(&reply).await?;
                    return Err(IpcError::LineTooLong(limit));
                }
                Err(e) => return Err(e),
            };

            self.send_envelope(&reply).await?;
        }
    }
}

/// Errors that can occur during IPC communication.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An envelope could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A request line exceeded the length limit.
    #[error("request line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The reply did not answer the request that was sent.
    #[error("expected reply to sequence {expected}, got {got}")]
    SequenceMismatch {
        /// Sequence number of the request.
        expected: u64,
        /// Sequence number of the reply.
        got: u64,
    },
}
