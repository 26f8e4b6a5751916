//! Lifecycle of one live websocket connection.
//!
//! A [`ConnectionSession`] owns exactly one hub [`Subscription`] and runs
//! three loops against the socket until the first of them finishes:
//!
//! - read: treats every inbound frame as proof of life and ends the session
//!   when the read deadline passes without one. Pongs to client pings are
//!   queued by the websocket protocol layer itself, so none are written here.
//! - keepalive: sends a ping every `keepalive_interval`
//! - delivery: encodes queued events and writes them as text frames
//!
//! Cancelling the session token ends all three. On the way out the session
//! unsubscribes before it releases the transport.

use crate::feed::FeedEncoder;
use crate::hub::Subscription;
use axum::extract::ws::Message;
use futures::{Sink, Stream, StreamExt};
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod writer;

pub use writer::{SessionError, SessionWriter};


#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub keepalive_interval: Duration,
    /// Must be longer than `keepalive_interval`
    pub read_deadline: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            read_deadline: Duration::from_secs(120),
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of stream from the client
    PeerClosed,
    ReadError(String),
    DeadlineExpired,
    KeepaliveFailed(SessionError),
    WriteFailed(SessionError),
    /// The hub side of the subscription went away
    FeedClosed,
    Cancelled,
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::ReadError(e) => write!(f, "read error: {}", e),
            CloseReason::DeadlineExpired => write!(f, "read deadline expired"),
            CloseReason::KeepaliveFailed(e) => write!(f, "keepalive failed: {}", e),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {}", e),
            CloseReason::FeedClosed => write!(f, "feed closed"),
            CloseReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

pub struct ConnectionSession<T: Send + Sync + 'static> {
    feed: &'static str,
    subscription: Subscription<T>,
    encoder: Arc<dyn FeedEncoder<T>>,
    config: SessionConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl<T: Send + Sync + 'static> ConnectionSession<T> {
    pub fn new(
        feed: &'static str,
        subscription: Subscription<T>,
        encoder: Arc<dyn FeedEncoder<T>>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            feed,
            subscription,
            encoder,
            config,
            cancel,
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.subscription.id()
    }

    /// Observe state transitions, including the final `Closed`.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drive the connection until it ends, then tear it down.
    pub async fn run<S, R, E>(mut self, sink: S, mut stream: R) -> CloseReason
    where
        S: Sink<Message> + Unpin + Send,
        S::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: Display,
    {
        let session_id = self.id();
        let writer = SessionWriter::new(sink, self.config.write_timeout);

        self.state.send_replace(SessionState::Active);
        info!(feed = self.feed, session_id = %session_id, "Feed session active");

        let reason = tokio::select! {
            reason = read_loop(&mut stream, self.config.read_deadline) => reason,
            reason = keepalive_loop(&writer, self.config.keepalive_interval) => reason,
            reason = delivery_loop(self.feed, &mut self.subscription, self.encoder.as_ref(), &writer) => reason,
            _ = self.cancel.cancelled() => CloseReason::Cancelled,
        };

        self.state.send_replace(SessionState::Closing);
        self.subscription.unsubscribe();
        writer.close().await;
        self.state.send_replace(SessionState::Closed);

        info!(feed = self.feed, session_id = %session_id, reason = %reason, "Feed session closed");
        reason
    }
}

async fn read_loop<R, E>(stream: &mut R, read_deadline: Duration) -> CloseReason
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        // A fresh timeout per frame: anything the client sends resets it
        let frame = match timeout(read_deadline, stream.next()).await {
            Ok(frame) => frame,
            Err(_) => return CloseReason::DeadlineExpired,
        };

        match frame {
            None | Some(Ok(Message::Close(_))) => return CloseReason::PeerClosed,
            Some(Err(e)) => return CloseReason::ReadError(e.to_string()),
            Some(Ok(_)) => {}
        }
    }
}

async fn keepalive_loop<S>(writer: &SessionWriter<S>, period: Duration) -> CloseReason
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = writer.send(Message::Ping(Vec::new())).await {
            return CloseReason::KeepaliveFailed(e);
        }
    }
}

async fn delivery_loop<T, S>(
    feed: &'static str,
    subscription: &mut Subscription<T>,
    encoder: &dyn FeedEncoder<T>,
    writer: &SessionWriter<S>,
) -> CloseReason
where
    T: Send + Sync + 'static,
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    while let Some(event) = subscription.recv().await {
        let text = match encoder.encode(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!(feed, error = %e, "Failed to encode feed event, skipping");
                continue;
            }
        };

        if let Err(e) = writer.send(Message::Text(text)).await {
            return CloseReason::WriteFailed(e);
        }
        debug!(feed, "Feed event delivered");
    }

    CloseReason::FeedClosed
}
