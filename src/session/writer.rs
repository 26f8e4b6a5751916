use axum::extract::ws::{close_code, CloseFrame, Message};
use futures::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Single owner of the outbound half of a websocket.
///
/// Data frames, keepalive pings and the final close frame all go through
/// `send`, one at a time. Once closed every send fails with
/// [`SessionError::Closed`].
pub struct SessionWriter<S> {
    sink: Mutex<S>,
    closed: AtomicBool,
    write_timeout: Duration,
}

impl<S> SessionWriter<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(sink: S, write_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            write_timeout,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let mut sink = self.sink.lock().await;
        // close() may have won the lock while we waited
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        match timeout(self.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
            Err(_) => Err(SessionError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Best-effort close frame, then release the transport.
    ///
    /// Only the first call does anything.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        };
        let _ = timeout(self.write_timeout, sink.send(Message::Close(Some(frame)))).await;
        let _ = timeout(self.write_timeout, sink.close()).await;
    }
}
