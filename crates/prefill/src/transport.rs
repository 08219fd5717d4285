// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon wire transport (spec §6, `SPEC_FULL.md`'s "concrete daemon
//! wire transport" supplement): newline-delimited JSON frames over a Unix
//! domain socket or loopback TCP, carrying request/response pairs plus
//! server-pushed events.
//!
//! The protocol itself carries no request id (spec §6's shapes are just
//! `{command, parameters, timeout}` / `{success, message?, error?, data?}`),
//! so [`DaemonClient::call`] serializes callers through an internal lock and
//! treats the next `Response` frame on the wire as that call's answer —
//! exactly the "avoid in-band mixing of data and control" posture spec §9
//! asks for, pushed one layer further: requests and their replies never
//! interleave either.

use crate::error::{PrefillError, Result};
use futures_util::{SinkExt, StreamExt};
use lancache_protocol::{Challenge, Command, DaemonEvent, DaemonRequest, DaemonResponse, PrefillProgressUpdate};
use serde_json::Value;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::warn;

/// Handlers for the daemon's server-initiated events (spec §4.M step 10:
/// "Register event handlers for onChallenge, onStatus, onProgress, onError,
/// onDisconnect").
#[async_trait::async_trait]
pub trait DaemonEventHandler: Send + Sync {
    async fn on_challenge(&self, challenge: Challenge);
    async fn on_status(&self, status: String);
    async fn on_progress(&self, progress: PrefillProgressUpdate);
    async fn on_error(&self, message: String);
    async fn on_disconnect(&self, reason: Option<String>);
}

enum RawStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for RawStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            RawStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            RawStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RawStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            RawStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            RawStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            RawStream::Unix(s) => Pin::new(s).poll_flush(cx),
            RawStream::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            RawStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
            RawStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

fn parse_frame(line: &str) -> Result<(Option<DaemonResponse>, Option<DaemonEvent>)> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| PrefillError::Protocol(format!("malformed frame: {e}")))?;
    if value.get("event").is_some() {
        let event: DaemonEvent = serde_json::from_value(value)
            .map_err(|e| PrefillError::Protocol(format!("malformed event: {e}")))?;
        Ok((None, Some(event)))
    } else {
        let response: DaemonResponse = serde_json::from_value(value)
            .map_err(|e| PrefillError::Protocol(format!("malformed response: {e}")))?;
        Ok((Some(response), None))
    }
}

type PendingSlot = Arc<Mutex<Option<oneshot::Sender<DaemonResponse>>>>;

/// A connected daemon client, addressing one prefill session's container.
pub struct DaemonClient {
    sink: Mutex<futures_util::stream::SplitSink<Framed<RawStream, LinesCodec>, String>>,
    pending: PendingSlot,
    call_lock: Mutex<()>,
}

impl DaemonClient {
    /// Connects over a Unix domain socket (spec §4.M step 5 default
    /// transport) and starts the background reader task.
    pub async fn connect_unix(path: &Path, handler: Arc<dyn DaemonEventHandler>) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| PrefillError::Transport(format!("connect {}: {e}", path.display())))?;
        Ok(Self::from_stream(RawStream::Unix(stream), handler))
    }

    /// Connects over loopback TCP (spec §4.M step 5: Windows or
    /// `UseTcp=true` fallback) and starts the background reader task.
    pub async fn connect_tcp(host: &str, port: u16, handler: Arc<dyn DaemonEventHandler>) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| PrefillError::Transport(format!("connect {host}:{port}: {e}")))?;
        Ok(Self::from_stream(RawStream::Tcp(stream), handler))
    }

    fn from_stream(raw: RawStream, handler: Arc<dyn DaemonEventHandler>) -> Self {
        let framed = Framed::new(raw, LinesCodec::new_with_max_length(1 << 20));
        let (sink, mut stream) = framed.split();
        let pending: PendingSlot = Arc::new(Mutex::new(None));

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            loop {
                let line = match stream.next().await {
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        warn!("daemon frame exceeded max line length, dropping connection");
                        handler.on_disconnect(Some("frame too large".into())).await;
                        return;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "daemon transport read error");
                        handler.on_disconnect(Some(e.to_string())).await;
                        return;
                    }
                    None => {
                        handler.on_disconnect(None).await;
                        return;
                    }
                };
                match parse_frame(&line) {
                    Ok((Some(response), _)) => {
                        if let Some(tx) = reader_pending.lock().await.take() {
                            let _ = tx.send(response);
                        } else {
                            warn!("unsolicited daemon response frame, no call was pending");
                        }
                    }
                    Ok((_, Some(event))) => Self::dispatch_event(&*handler, event).await,
                    Ok((None, None)) => {}
                    Err(e) => warn!(error = %e, line = %line, "dropping malformed daemon frame"),
                }
            }
        });

        Self { sink: Mutex::new(sink), pending, call_lock: Mutex::new(()) }
    }

    async fn dispatch_event(handler: &dyn DaemonEventHandler, event: DaemonEvent) {
        match event {
            DaemonEvent::CredentialChallenge(challenge) => handler.on_challenge(challenge).await,
            DaemonEvent::StatusUpdate { status } => handler.on_status(status).await,
            DaemonEvent::ProgressUpdate(progress) => handler.on_progress(progress).await,
            DaemonEvent::Error { message } => handler.on_error(message).await,
            DaemonEvent::Disconnect { reason } => handler.on_disconnect(reason).await,
        }
    }

    /// Sends `command` and awaits its response, honoring `timeout`. Only one
    /// call may be in flight at a time per client; concurrent callers queue
    /// on `call_lock`.
    pub async fn call(&self, command: Command, params: Value, timeout: Duration) -> Result<DaemonResponse> {
        let _guard = self.call_lock.lock().await;
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().await = Some(tx);

        let request = DaemonRequest::new(command, params);
        let line = serde_json::to_string(&request)
            .map_err(|e| PrefillError::Protocol(format!("encoding request: {e}")))?;
        self.sink
            .lock()
            .await
            .send(line)
            .await
            .map_err(|e| PrefillError::Transport(format!("write failed: {e}")))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PrefillError::Transport("daemon connection closed mid-call".into())),
            Err(_) => {
                self.pending.lock().await.take();
                Err(PrefillError::Timeout(format!("{} response", command.as_str())))
            }
        }
    }

    /// Best-effort 2-second graceful shutdown request (spec §4.M
    /// termination step); failures are swallowed by the caller.
    pub async fn shutdown(&self) -> Result<DaemonResponse> {
        self.call(Command::Shutdown, Value::Null, Duration::from_secs(2)).await
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
