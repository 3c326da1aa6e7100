//! MCP session over stdin/stdout.
//!
//! Each request is handled on its own task so a slow backend does not hold
//! up other calls. Responses go through one writer task and may leave in a
//! different order than their requests arrived.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use unical_protocol::{
    ErrorCode, Incoming, LineReader, LineWriter, ProtocolError, Response, RpcError,
};

use crate::error::ServerResult;
use crate::handler::McpHandler;
use crate::signals::ShutdownHandle;

/// Responses waiting for the writer.
const OUTBOX_CAPACITY: usize = 64;

/// Serves one MCP session on a pair of byte streams.
pub struct StdioServer {
    handler: McpHandler,
}

impl StdioServer {
    pub fn new(handler: McpHandler) -> Self {
        Self { handler }
    }

    /// Serves until end of input, then finishes in-flight requests.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.serve_inner(reader, writer, None).await
    }

    /// Like [`serve`](Self::serve) but also stops on shutdown, dropping
    /// requests still in flight.
    pub async fn serve_until_shutdown<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: ShutdownHandle,
    ) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.serve_inner(reader, writer, Some(shutdown)).await
    }

    async fn serve_inner<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: Option<ShutdownHandle>,
    ) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = LineReader::new(BufReader::new(reader));
        let (tx, mut rx) = mpsc::channel::<Response>(OUTBOX_CAPACITY);

        let writer_task = tokio::spawn(async move {
            let mut writer = LineWriter::new(writer);
            while let Some(response) = rx.recv().await {
                let written = match writer.write_message(&response).await {
                    Err(
                        e @ (ProtocolError::MessageTooLarge { .. }
                        | ProtocolError::Serialization(_)),
                    ) => {
                        warn!(id = ?response.id, error = %e, "Response not sendable, replying with an error");
                        let error = RpcError::new(
                            ErrorCode::InternalError,
                            format!("response too large: {e}"),
                        );
                        let fallback = Response::error(response.id, error);
                        writer.write_message(&fallback).await
                    }
                    other => other,
                };
                if let Err(e) = written {
                    error!(error = %e, "Failed to write response");
                    break;
                }
            }
        });

        let mut tasks = JoinSet::new();
        let mut interrupted = false;
        info!("MCP session started");

        let outcome = loop {
            while tasks.try_join_next().is_some() {}

            let next = match &shutdown {
                Some(handle) => tokio::select! {
                    line = reader.next_line() => line,
                    _ = handle.wait() => {
                        info!("Shutdown requested, closing session");
                        interrupted = true;
                        break Ok(());
                    }
                },
                None => reader.next_line().await,
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("End of input");
                    break Ok(());
                }
                Err(e @ ProtocolError::MessageTooLarge { .. }) => {
                    warn!(error = %e, "Dropping oversized message");
                    let _ = tx.send(e.to_response(&[])).await;
                    continue;
                }
                Err(e) => break Err(e.into()),
            };

            match Incoming::parse(&line) {
                Ok(Incoming::Request(request)) => {
                    let handler = self.handler.clone();
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        let response = handler.handle(request).await;
                        let _ = tx.send(response).await;
                    });
                }
                Ok(Incoming::Notification(notification)) => {
                    self.handler.handle_notification(&notification);
                }
                Ok(Incoming::Response(_)) => debug!("Ignoring response from client"),
                Err(e) => {
                    warn!(error = %e, "Rejecting malformed message");
                    let _ = tx.send(e.to_response(&line)).await;
                }
            }
        };

        if interrupted {
            tasks.shutdown().await;
        } else {
            while tasks.join_next().await.is_some() {}
        }
        drop(tx);
        if let Err(e) = writer_task.await {
            error!(error = %e, "Writer task failed");
        }
        info!("MCP session ended");
        outcome
    }
}
