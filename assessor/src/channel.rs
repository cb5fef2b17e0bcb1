//! Cancellable, typed push subscription bound to one session id.
//!
//! Opening a channel never blocks: it spawns a pump task that subscribes
//! through the [`Transport`], decodes every frame, and forwards the outcome
//! over a bounded queue. The channel owns both ends of that arrangement, so
//! closing (or dropping) it aborts the pump and drops the queue; nothing can
//! be delivered afterwards.
//!
//! Undecodable frames are reported and skipped. Only a transport failure, or
//! more than `max_consecutive_decode_failures` bad frames in a row, ends the
//! channel. Reconnection is never attempted.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::types::ChannelKind;
use crate::error::{AssessError, ChannelError};
use crate::io::transport::Transport;

const QUEUE_DEPTH: usize = 64;

/// Outcome of one inbound frame, or the end of the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent<M> {
    /// A frame decoded successfully.
    Message(M),
    /// A frame failed to decode; the channel stays open.
    DecodeFailed { error: String, consecutive: u32 },
    /// Fatal failure. Reported once, then the channel is closed.
    Failed(ChannelError),
    /// The server ended the stream.
    Closed,
}

impl<M> ChannelEvent<M> {
    fn is_terminal(&self) -> bool {
        matches!(self, ChannelEvent::Failed(_) | ChannelEvent::Closed)
    }
}

pub struct StreamChannel<M> {
    kind: ChannelKind,
    session_id: String,
    rx: Option<mpsc::Receiver<ChannelEvent<M>>>,
    task: Option<JoinHandle<()>>,
}

impl<M> StreamChannel<M>
where
    M: DeserializeOwned + Send + 'static,
{
    /// Subscribe to `endpoint` for `session_id`.
    ///
    /// Fails with [`AssessError::SessionIdMissing`] before anything is
    /// acquired when the id is blank. Must be called within a Tokio runtime.
    pub fn open<T: Transport>(
        transport: Arc<T>,
        kind: ChannelKind,
        session_id: &str,
        endpoint: &str,
        max_consecutive_decode_failures: u32,
    ) -> Result<Self, AssessError> {
        if session_id.trim().is_empty() {
            return Err(AssessError::SessionIdMissing(kind));
        }

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let task = tokio::spawn(pump(
            transport,
            kind,
            endpoint.to_string(),
            tx,
            max_consecutive_decode_failures,
        ));
        info!(channel = %kind, session_id, endpoint, "channel opened");

        Ok(Self {
            kind,
            session_id: session_id.to_string(),
            rx: Some(rx),
            task: Some(task),
        })
    }
}

impl<M> StreamChannel<M> {
    pub fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    /// Next event in arrival order; `None` once the channel is closed.
    ///
    /// Cancel-safe: dropping the future loses no event.
    pub async fn recv(&mut self) -> Option<ChannelEvent<M>> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.rx = None;
                    self.task = None;
                }
                Some(event)
            }
            None => {
                self.rx = None;
                self.task = None;
                None
            }
        }
    }

    /// Release the subscription. Returns `true` only for the call that released it.
    pub fn close(&mut self) -> bool {
        self.rx = None;
        match self.task.take() {
            Some(task) => {
                task.abort();
                info!(channel = %self.kind, session_id = %self.session_id, "channel closed");
                true
            }
            None => false,
        }
    }
}

impl<M> Drop for StreamChannel<M> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump<T, M>(
    transport: Arc<T>,
    kind: ChannelKind,
    endpoint: String,
    tx: mpsc::Sender<ChannelEvent<M>>,
    max_consecutive_decode_failures: u32,
) where
    T: Transport,
    M: DeserializeOwned + Send + 'static,
{
    use futures::StreamExt;

    let mut frames = match transport.subscribe(&endpoint).await {
        Ok(frames) => frames,
        Err(err) => {
            warn!(channel = %kind, error = %err, "subscription failed");
            let _ = tx.send(ChannelEvent::Failed(err.into())).await;
            return;
        }
    };

    let mut consecutive = 0u32;
    while let Some(frame) = frames.next().await {
        let event = match frame {
            Ok(data) => match serde_json::from_str::<M>(&data) {
                Ok(message) => {
                    consecutive = 0;
                    ChannelEvent::Message(message)
                }
                Err(err) => {
                    consecutive += 1;
                    warn!(channel = %kind, error = %err, consecutive, "undecodable frame");
                    if consecutive > max_consecutive_decode_failures {
                        let _ = tx
                            .send(ChannelEvent::Failed(ChannelError::DecodeThresholdExceeded {
                                failures: consecutive,
                                limit: max_consecutive_decode_failures,
                            }))
                            .await;
                        return;
                    }
                    ChannelEvent::DecodeFailed {
                        error: err.to_string(),
                        consecutive,
                    }
                }
            },
            Err(err) => {
                warn!(channel = %kind, error = %err, "stream failed");
                let _ = tx.send(ChannelEvent::Failed(err.into())).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            debug!(channel = %kind, "receiver gone, stopping pump");
            return;
        }
    }

    debug!(channel = %kind, "stream ended by server");
    let _ = tx.send(ChannelEvent::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProgressEvent;
    use crate::error::TransportError;
    use crate::test_support::ScriptedTransport;

    fn open(
        transport: &Arc<ScriptedTransport>,
        endpoint: &str,
        limit: u32,
    ) -> StreamChannel<ProgressEvent> {
        StreamChannel::open(
            Arc::clone(transport),
            ChannelKind::Progress,
            "abc",
            endpoint,
            limit,
        )
        .expect("open")
    }

    #[tokio::test]
    async fn blank_session_id_fails_before_subscribing() {
        let transport = Arc::new(ScriptedTransport::new());
        let result = StreamChannel::<ProgressEvent>::open(
            Arc::clone(&transport),
            ChannelKind::Results,
            "  ",
            "assessments/",
            3,
        );
        assert!(matches!(
            result,
            Err(AssessError::SessionIdMissing(ChannelKind::Results))
        ));
        tokio::task::yield_now().await;
        assert_eq!(transport.subscriptions_opened(), 0);
    }

    #[tokio::test]
    async fn bad_frame_is_reported_and_channel_keeps_delivering() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.send_raw("progress/abc", "{not json");
        transport.send("progress/abc", &ProgressEvent::progress("step 1"));
        transport.end("progress/abc");

        let mut channel = open(&transport, "progress/abc", 3);
        assert!(matches!(
            channel.recv().await,
            Some(ChannelEvent::DecodeFailed { consecutive: 1, .. })
        ));
        assert_eq!(
            channel.recv().await,
            Some(ChannelEvent::Message(ProgressEvent::progress("step 1")))
        );
        assert_eq!(channel.recv().await, Some(ChannelEvent::Closed));
        assert!(!channel.is_open());
        assert_eq!(channel.recv().await, None);
    }

    #[tokio::test]
    async fn consecutive_decode_failures_beyond_limit_are_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.send_raw("progress/abc", "garbage");
        }
        transport.send("progress/abc", &ProgressEvent::progress("unreached"));

        let mut channel = open(&transport, "progress/abc", 2);
        assert!(matches!(channel.recv().await, Some(ChannelEvent::DecodeFailed { .. })));
        assert!(matches!(channel.recv().await, Some(ChannelEvent::DecodeFailed { .. })));
        assert_eq!(
            channel.recv().await,
            Some(ChannelEvent::Failed(ChannelError::DecodeThresholdExceeded {
                failures: 3,
                limit: 2
            }))
        );
        assert_eq!(channel.recv().await, None);
        assert!(!channel.close(), "fatal error already released the channel");
    }

    #[tokio::test]
    async fn transport_error_is_reported_once_and_closes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.send("progress/abc", &ProgressEvent::progress("before"));
        transport.fail("progress/abc", TransportError::Connection("reset".to_string()));

        let mut channel = open(&transport, "progress/abc", 3);
        assert!(matches!(channel.recv().await, Some(ChannelEvent::Message(_))));
        assert_eq!(
            channel.recv().await,
            Some(ChannelEvent::Failed(ChannelError::Transport(
                TransportError::Connection("reset".to_string())
            )))
        );
        assert_eq!(channel.recv().await, None);
        assert_eq!(transport.settle_live(0).await, 0);
    }

    #[tokio::test]
    async fn subscribe_failure_is_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.refuse("progress/abc", TransportError::Status {
            url: "progress/abc".to_string(),
            status: 404,
        });
        let mut channel = open(&transport, "progress/abc", 3);
        assert!(matches!(
            channel.recv().await,
            Some(ChannelEvent::Failed(ChannelError::Transport(
                TransportError::Status { status: 404, .. }
            )))
        ));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_once() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut channel = open(&transport, "progress/abc", 3);
        assert_eq!(transport.settle_live(1).await, 1);

        assert!(channel.close());
        assert!(!channel.close());
        drop(channel);

        assert_eq!(transport.settle_live(0).await, 0);
        assert_eq!(transport.subscriptions_opened(), 1);
    }
}
