//! IPC Client for communicating with the daemon via Unix Domain Sockets.
//!
//! The client connects to the daemon's Unix socket and sends requests,
//! receiving responses in a request-response pattern.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use protocol::messages::{Message, Ping};
use protocol::Envelope;
use tokio::net::UnixStream;

use super::server::{IpcConnection, IpcError};

/// Default timeout for client operations in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A client for communicating with the daemon via IPC.
pub struct IpcClient {
    conn: IpcConnection,
    next_sequence: u64,
    timeout: Duration,
}

impl IpcClient {
    /// Connect to the daemon at the specified socket path.
    ///
    /// Fails if the daemon is not running.
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        Self::connect_with_timeout(path, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Connect to the daemon with a custom timeout.
    pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<Self, IpcError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))??;

        Ok(Self {
            conn: IpcConnection::new(stream),
            next_sequence: 1,
            timeout,
        })
    }

    /// Set the timeout for operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send a request to the daemon and wait for the response payload.
    ///
    /// Error replies are returned as [`Message::Error`], not as `Err`.
    pub async fn send(&mut self, payload: Message) -> Result<Message, IpcError> {
        tokio::time::timeout(self.timeout, self.send_internal(payload))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))?
    }

    async fn send_internal(&mut self, payload: Message) -> Result<Message, IpcError> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.conn
            .send_envelope(&Envelope::new(sequence, payload))
            .await?;

        let reply = self.conn.read_envelope().await?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "daemon closed connection")
        })?;

        if reply.sequence != sequence {
            return Err(IpcError::SequenceMismatch {
                expected: sequence,
                got: reply.sequence,
            });
        }

        Ok(reply.payload)
    }

    /// Send a ping request to check if the daemon is responsive.
    ///
    /// Returns `true` if the daemon echoes the ping's timestamp.
    pub async fn ping(&mut self) -> Result<bool, IpcError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let response = self.send(Message::Ping(Ping { timestamp })).await?;
        Ok(matches!(response, Message::Pong(pong) if pong.timestamp == timestamp))
    }
}
