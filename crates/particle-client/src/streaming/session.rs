//! Event session implementation

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use super::decoder;
use super::parser::FrameParser;
use super::types::{DecodeError, Event, StreamError, StreamResult};

/// Body of an open event stream response
pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_BUFFER: usize = 1;
/// Default capacity of the decode error channel
pub const DEFAULT_ERROR_BUFFER: usize = 16;

/// Lifecycle of an [`EventSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no connection attached
    Idle,
    /// Connection open, `listen()` not started
    Connected,
    /// `listen()` is reading the stream
    Running,
    /// Terminal; the connection is released and the channels are closed
    Stopped,
}

/// Producer halves of the session's channels
struct Outputs {
    events: mpsc::Sender<Event>,
    errors: mpsc::Sender<StreamError>,
}

/// Everything the read loop owns while it runs
struct Producer {
    connection: ByteStream,
    outputs: Outputs,
}

impl Producer {
    /// Close the connection, then the channels
    fn release(self) {
        let Producer {
            connection,
            outputs,
        } = self;
        drop(connection);
        drop(outputs);
    }
}

enum Phase {
    Idle(Outputs),
    Connected(Producer),
    Running,
    Stopped,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle(_) => SessionState::Idle,
            Phase::Connected(_) => SessionState::Connected,
            Phase::Running => SessionState::Running,
            Phase::Stopped => SessionState::Stopped,
        }
    }
}

struct Shared {
    endpoint: String,
    /// Only ever moved out under this lock, so exactly one party releases
    /// the connection and channels
    phase: Mutex<Phase>,
    /// Run flag, checked by the read loop at the top of every iteration
    running: AtomicBool,
    /// Wakes a read loop blocked in a read or a send
    stop_signal: Notify,
    events: Mutex<Option<mpsc::Receiver<Event>>>,
    errors: Mutex<Option<mpsc::Receiver<StreamError>>>,
}

/// A live subscription to a Particle event stream
///
/// Sessions are single-use. Cloning yields another handle to the same
/// session, which is how `listen()` is moved onto its own task while the
/// caller keeps a handle for `stop()`.
///
/// # Example
///
/// ```ignore
/// let session = client.open_events(EventScope::Mine, Some("temp")).await?;
/// let mut events = session.take_events().expect("events not taken yet");
///
/// let listener = session.clone();
/// let handle = tokio::spawn(async move { listener.listen().await });
///
/// while let Some(event) = events.recv().await {
///     println!("{}: {}", event.name, event.data);
///     session.stop();
/// }
///
/// handle.await??;
/// ```
#[derive(Clone)]
pub struct EventSession {
    shared: Arc<Shared>,
}

impl EventSession {
    /// Create an idle session with the given channel capacities
    pub(crate) fn new(endpoint: impl Into<String>, event_buffer: usize, error_buffer: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(error_buffer.max(1));

        Self {
            shared: Arc::new(Shared {
                endpoint: endpoint.into(),
                phase: Mutex::new(Phase::Idle(Outputs {
                    events: events_tx,
                    errors: errors_tx,
                })),
                running: AtomicBool::new(false),
                stop_signal: Notify::new(),
                events: Mutex::new(Some(events_rx)),
                errors: Mutex::new(Some(errors_rx)),
            }),
        }
    }

    /// Hand the open byte stream to the session
    pub(crate) fn attach(&self, connection: ByteStream) -> StreamResult<()> {
        let mut phase = self.shared.phase.lock();

        match std::mem::replace(&mut *phase, Phase::Stopped) {
            Phase::Idle(outputs) => {
                *phase = Phase::Connected(Producer {
                    connection,
                    outputs,
                });
                Ok(())
            }
            Phase::Stopped => Err(StreamError::Stopped),
            other => {
                *phase = other;
                Err(StreamError::AlreadyConnected)
            }
        }
    }

    /// Endpoint this session is subscribed to
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.phase.lock().state()
    }

    /// Whether the read loop has been started and not told to stop
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Take the receiving end of the event channel
    ///
    /// Returns `None` if it was already taken. The channel closes once the
    /// session stops.
    pub fn take_events(&self) -> Option<mpsc::Receiver<Event>> {
        self.shared.events.lock().take()
    }

    /// Take the receiving end of the decode error channel
    ///
    /// Only [`StreamError::Decode`] is reported here; fatal errors are
    /// returned from [`listen`](Self::listen). Errors are dropped (and logged)
    /// when this channel is not drained.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<StreamError>> {
        self.shared.errors.lock().take()
    }

    /// Read the stream and publish events until stopped or the stream fails
    ///
    /// Returns `Ok(())` after [`stop`](Self::stop) or when the event receiver
    /// is dropped, and the fatal error otherwise. The connection and the
    /// channels are released before this returns.
    pub async fn listen(&self) -> StreamResult<()> {
        let producer = {
            let mut phase = self.shared.phase.lock();

            match std::mem::replace(&mut *phase, Phase::Running) {
                Phase::Connected(producer) => {
                    self.shared.running.store(true, Ordering::SeqCst);
                    producer
                }
                other => {
                    let err = match other.state() {
                        SessionState::Idle => StreamError::NotConnected,
                        SessionState::Running => StreamError::AlreadyListening,
                        _ => StreamError::Stopped,
                    };
                    *phase = other;
                    return Err(err);
                }
            }
        };

        debug!(endpoint = %self.shared.endpoint, "Listening for events");

        let result = self.run(producer).await;

        {
            let mut phase = self.shared.phase.lock();
            self.shared.running.store(false, Ordering::SeqCst);
            *phase = Phase::Stopped;
        }

        match &result {
            Ok(()) => debug!(endpoint = %self.shared.endpoint, "Event session stopped"),
            Err(e) => debug!(endpoint = %self.shared.endpoint, error = %e, "Event session failed"),
        }

        result
    }

    /// Stop the session
    ///
    /// Idempotent. A running `listen()` is woken even if it is blocked on the
    /// network; it releases the connection, closes the channels and only then
    /// reports [`SessionState::Stopped`]. A session that was never listened
    /// to is released here.
    pub fn stop(&self) {
        let previous = {
            let mut phase = self.shared.phase.lock();
            self.shared.running.store(false, Ordering::SeqCst);

            // The read loop owns the resources; its epilogue publishes Stopped
            if matches!(*phase, Phase::Running) {
                self.shared.stop_signal.notify_one();
                return;
            }
            std::mem::replace(&mut *phase, Phase::Stopped)
        };

        match previous {
            Phase::Idle(outputs) => drop(outputs),
            Phase::Connected(producer) => {
                debug!(endpoint = %self.shared.endpoint, "Releasing unused event stream");
                producer.release();
            }
            Phase::Running | Phase::Stopped => {}
        }
    }

    async fn run(&self, producer: Producer) -> StreamResult<()> {
        let Producer {
            mut connection,
            outputs,
        } = producer;
        let mut parser = FrameParser::new();

        let result = 'read: loop {
            if !self.shared.running.load(Ordering::SeqCst) {
                break Ok(());
            }

            let chunk = tokio::select! {
                biased;
                _ = self.shared.stop_signal.notified() => continue,
                chunk = connection.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => break Err(StreamError::Read(e)),
                None => break Err(StreamError::Closed),
            };
            trace!(len = bytes.len(), "Stream chunk");

            for record in parser.feed(&bytes) {
                let event = match decoder::decode(record) {
                    Ok(event) => event,
                    Err(e) => {
                        report_decode_error(&outputs.errors, e);
                        continue;
                    }
                };

                tokio::select! {
                    biased;
                    _ = self.shared.stop_signal.notified() => break 'read Ok(()),
                    sent = outputs.events.send(event) => {
                        if sent.is_err() {
                            debug!("Event receiver dropped");
                            break 'read Ok(());
                        }
                    }
                }
            }
        };

        if parser.has_partial() {
            trace!("Discarding partially received record");
        }

        drop(connection);
        drop(outputs);

        result
    }
}

fn report_decode_error(errors: &mpsc::Sender<StreamError>, error: DecodeError) {
    warn!(event = %error.name, error = %error.source, "Failed to decode event");

    match errors.try_send(StreamError::Decode(error)) {
        Ok(()) => {}
        Err(TrySendError::Full(e)) | Err(TrySendError::Closed(e)) => {
            debug!(error = %e, "Decode error not delivered: error channel not drained");
        }
    }
}

impl fmt::Debug for EventSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSession")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const RECORD: &str =
        "event: temp\ndata: {\"data\":\"21.5\",\"ttl\":60,\"published_at\":\"2023-01-01T00:00:00Z\"}\n\n";

    fn pending_stream() -> ByteStream {
        Box::pin(futures::stream::pending::<Result<Bytes, reqwest::Error>>())
    }

    fn connected(chunks: Vec<&'static str>, hold_open: bool) -> EventSession {
        let items = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from_static(c.as_bytes()))),
        );
        let stream: ByteStream = if hold_open {
            Box::pin(items.chain(futures::stream::pending()))
        } else {
            Box::pin(items)
        };

        let session = EventSession::new("test", DEFAULT_EVENT_BUFFER, DEFAULT_ERROR_BUFFER);
        session.attach(stream).unwrap();
        session
    }

    #[test]
    fn test_state_transitions_without_listen() {
        let session = EventSession::new("test", 1, 1);
        assert_eq!(session.state(), SessionState::Idle);

        session.attach(pending_stream()).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(!session.is_running());

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);

        // Idempotent
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_attach_twice() {
        let session = connected(vec![], true);
        let result = session.attach(pending_stream());
        assert!(matches!(result, Err(StreamError::AlreadyConnected)));
    }

    #[test]
    fn test_receivers_handed_out_once() {
        let session = EventSession::new("test", 1, 1);
        assert!(session.take_events().is_some());
        assert!(session.take_events().is_none());
        assert!(session.take_errors().is_some());
        assert!(session.take_errors().is_none());
    }

    #[tokio::test]
    async fn test_listen_without_connection() {
        let session = EventSession::new("test", 1, 1);
        assert!(matches!(session.listen().await, Err(StreamError::NotConnected)));
    }

    #[tokio::test]
    async fn test_stop_before_listen_closes_channel() {
        let session = connected(vec![RECORD], true);
        let mut events = session.take_events().unwrap();

        session.stop();

        assert!(events.recv().await.is_none());
        assert!(matches!(session.listen().await, Err(StreamError::Stopped)));
    }

    #[tokio::test]
    async fn test_events_then_closed() {
        let session = connected(vec![RECORD, RECORD], false);
        let mut events = session.take_events().unwrap();

        let listener = session.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].name, "temp");
        assert_eq!(received[0].ttl, 60);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(StreamError::Closed)));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_stop_unblocks_pending_read() {
        let session = connected(vec!["event: temp\ndata: {\"da"], true);
        let mut events = session.take_events().unwrap();

        let listener = session.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while !session.is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        session.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listen did not return after stop")
            .unwrap();
        assert!(result.is_ok());

        // No partial event, channel closed
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stopped_only_after_loop_releases() {
        let session = connected(vec![RECORD, RECORD, RECORD], true);
        let mut events = session.take_events().unwrap();

        let listener = session.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        // Let the loop fill the channel and park on the next send
        let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap();
        assert!(first.is_some());
        tokio::task::yield_now().await;
        assert_eq!(session.state(), SessionState::Running);

        // Single-threaded runtime: the loop cannot run until we await
        session.stop();
        assert!(!session.is_running());
        assert_eq!(session.state(), SessionState::Running);

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listen did not return after stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(session.state(), SessionState::Stopped);

        while events.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_stop_unblocks_pending_send() {
        let session = connected(vec![RECORD, RECORD, RECORD], true);
        let mut events = session.take_events().unwrap();

        let listener = session.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        // Capacity 1: the loop parks on the second send until we read or stop
        let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap();
        assert!(first.is_some());

        session.stop();
        session.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listen did not return after stop")
            .unwrap();
        assert!(result.is_ok());

        // At most the one event already queued, then closed
        let mut remaining = 0;
        while events.recv().await.is_some() {
            remaining += 1;
        }
        assert!(remaining <= 1);
    }

    #[tokio::test]
    async fn test_second_listen_is_rejected() {
        let session = connected(vec![], true);

        let listener = session.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while session.state() != SessionState::Running {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(
            session.listen().await,
            Err(StreamError::AlreadyListening)
        ));

        session.stop();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_receiver_ends_listen() {
        let session = connected(vec![RECORD], true);
        drop(session.take_events());

        let result = tokio::time::timeout(Duration::from_secs(2), session.listen())
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_decode_errors_on_side_channel() {
        let session = connected(vec!["event: bad\ndata: {nope\n\n", RECORD], false);
        let mut events = session.take_events().unwrap();
        let mut errors = session.take_errors().unwrap();

        let listener = session.clone();
        let handle = tokio::spawn(async move { listener.listen().await });

        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "temp");
        assert!(events.recv().await.is_none());

        match errors.recv().await {
            Some(StreamError::Decode(e)) => assert_eq!(e.name, "bad"),
            other => panic!("expected decode error, got {:?}", other),
        }

        assert!(matches!(handle.await.unwrap(), Err(StreamError::Closed)));
    }
}
