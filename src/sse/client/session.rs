use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::StreamExt;
use snafu::prelude::*;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use super::{
    liveness::{Liveness, LivenessMonitor},
    retry::RetryScheduler,
    state::{ConnectionState, ConnectionStateMachine, ConnectionStatus},
    transport::{ByteStream, HttpTransport, StreamRequest, Transport, TransportError},
};
use crate::{
    config::{ConfigError, SessionConfig},
    sse::{event::StreamEvent, parser::EventStreamParser},
};

/// Why a stream attempt, or the whole session, failed
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(stream_error), context(suffix(false)))]
pub enum StreamError {
    /// open the stream failed
    #[snafu(display("open stream failed: {source}"))]
    Open {
        /// source error
        source: TransportError,
    },

    /// stream did not open in time
    #[snafu(display("connection timeout after {timeout:?}"))]
    ConnectTimeout {
        /// configured connection timeout
        timeout: Duration,
        /// source error
        source: tokio::time::error::Elapsed,
    },

    /// open stream broken
    #[snafu(display("stream broken: {source}"))]
    Transport {
        /// source error
        source: TransportError,
    },

    /// no data within the message timeout
    #[snafu(display("message timeout, no data in {timeout:?}"))]
    MessageTimeout {
        /// configured message timeout
        timeout: Duration,
    },

    /// failed attempts in a row reached the limit
    #[snafu(display("connection failed after {attempts} attempts, last error: {last}"))]
    Exhausted {
        /// failed attempts in a row
        attempts: u32,
        /// message of the last failure
        last: String,
    },
}

/// Receives events of a [`StreamSession`].
///
/// Both methods run on the session's task. A panic is caught and logged, the
/// session keeps going.
pub trait EventHandler: Send + 'static {
    /// Called for every decoded event, in stream order.
    fn on_event(&mut self, event: StreamEvent);

    /// Called once when the session gives up.
    fn on_error(&mut self, _error: &str) {}
}

impl<F> EventHandler for F
where
    F: FnMut(StreamEvent) + Send + 'static,
{
    fn on_event(&mut self, event: StreamEvent) {
        self(event)
    }
}

#[derive(Debug)]
struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A reconnecting event stream.
///
/// One session runs at most one request at a time. [`connect`] starts a
/// background task that opens the stream, decodes events into the handler
/// and reconnects with backoff until the stream closes normally, the attempts
/// run out, or [`disconnect`] is called. Dropping the session disconnects it.
///
/// [`connect`]: StreamSession::connect
/// [`disconnect`]: StreamSession::disconnect
#[derive(Debug)]
pub struct StreamSession<T: Transport = HttpTransport> {
    config: Arc<SessionConfig>,
    transport: Arc<T>,
    state: Arc<watch::Sender<ConnectionState>>,
    running: Option<Running>,
}

impl<T: Transport> StreamSession<T> {
    /// Create an idle session.
    pub fn new(config: SessionConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let (state, _) = watch::channel(ConnectionState::default());

        Ok(Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            state: Arc::new(state),
            running: None,
        })
    }

    /// The session config.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch the connection state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Status for a connection indicator.
    pub fn status(&self) -> ConnectionStatus {
        self.state
            .borrow()
            .status(self.config.max_reconnect_attempts)
    }

    /// Start streaming `payload` to `handler`, replacing any running attempt.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect<H: EventHandler>(&mut self, payload: serde_json::Value, handler: H) {
        self.stop();

        log::info!("Connect to {}", self.config.url);

        let cancel = CancellationToken::new();
        let machine = ConnectionStateMachine::new(Arc::clone(&self.state), cancel.clone());

        self.state.send_replace(ConnectionState::default());
        machine.connecting();

        let driver = Driver {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            request: StreamRequest {
                url: self.config.url.clone(),
                payload,
            },
            retry: RetryScheduler::new(&self.config),
            handler,
            machine,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(driver.run());

        self.running = Some(Running { cancel, task });
    }

    /// Stop streaming and reset the state to idle.
    ///
    /// Safe to call at any time, any number of times.
    pub fn disconnect(&mut self) {
        if self.stop() {
            log::info!("Disconnected from {}", self.config.url);
        }
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::default() {
                return false;
            }
            *state = ConnectionState::default();
            true
        });
    }

    fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                log::debug!("Cancel running stream task");
                running.cancel.cancel();
                running.task.abort();
                true
            }
            None => false,
        }
    }
}

impl<T: Transport> Drop for StreamSession<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How an attempt ended without error.
enum Exit {
    /// server closed or sent a terminal event
    Closed,
    /// the session was disconnected or reconnected
    Cancelled,
}

struct Driver<T, H> {
    config: Arc<SessionConfig>,
    transport: Arc<T>,
    request: StreamRequest,
    retry: RetryScheduler,
    handler: H,
    machine: ConnectionStateMachine,
    cancel: CancellationToken,
}

impl<T: Transport, H: EventHandler> Driver<T, H> {
    async fn run(mut self) {
        log::debug!("Stream task start");

        loop {
            let error = match self.attempt().await {
                Ok(Exit::Closed) => {
                    if self.machine.closed(None) {
                        log::info!("Stream of {} closed", self.request.url);
                    }
                    return;
                }
                Ok(Exit::Cancelled) => {
                    log::debug!("Stream task cancelled, stop");
                    return;
                }
                Err(err) => err,
            };

            log::warn!("Stream attempt failed: {}", error);

            let failures = match self.machine.failed(error.to_string()) {
                Some(failures) => failures,
                None => return,
            };

            let max = self.config.max_reconnect_attempts;
            if failures >= max {
                let error = stream_error::Exhausted {
                    attempts: failures,
                    last: error.to_string(),
                }
                .build()
                .to_string();

                log::error!("Give up streaming {}: {}", self.request.url, error);

                if self.machine.closed(Some(error.clone())) {
                    self.notify_error(&error);
                }
                return;
            }

            if !self.machine.reconnecting() {
                return;
            }

            let retry = self.retry.schedule(failures, Instant::now());
            log::info!(
                "Reconnect in {:?}, attempt {} of {}",
                retry.delay,
                failures,
                max
            );

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.retry.cancel();
                    log::debug!("Stream task cancelled while waiting retry, stop");
                    return;
                }

                _ = self.retry.elapsed() => {
                    log::trace!("Retry timer fired");
                }
            }

            if !self.machine.connecting() {
                return;
            }
        }
    }

    /// One open-read cycle.
    async fn attempt(&mut self) -> Result<Exit, StreamError> {
        log::debug!("Opening stream {}", self.request.url);

        let timeout = self.config.connection_timeout;
        let opening = tokio::time::timeout(timeout, self.transport.open(&self.request));

        let stream = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => return Ok(Exit::Cancelled),

            result = opening => result
                .context(stream_error::ConnectTimeout { timeout })?
                .context(stream_error::Open)?,
        };

        let now = Instant::now();
        if !self.machine.opened(now) {
            return Ok(Exit::Cancelled);
        }

        log::info!("Stream of {} opened", self.request.url);

        self.read(stream, now).await
    }

    async fn read(&mut self, mut stream: ByteStream, opened: Instant) -> Result<Exit, StreamError> {
        let mut parser = EventStreamParser::new(self.config.default_event_type.as_str());
        let mut liveness = LivenessMonitor::start(&self.config, opened);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(Exit::Cancelled),

                chunk = stream.next() => match chunk {
                    Some(chunk) => {
                        let chunk = chunk.context(stream_error::Transport)?;
                        log::trace!("Received {} bytes", chunk.len());

                        // keep-alive comments count as activity too
                        let now = Instant::now();
                        liveness.record_activity(now);
                        self.machine.touch(now);

                        for event in parser.feed(&chunk) {
                            if self.deliver(event) {
                                return Ok(Exit::Closed);
                            }
                        }
                    }
                    None => {
                        log::debug!("Server closed the stream");
                        if let Some(event) = parser.finish() {
                            self.deliver(event);
                        }
                        return Ok(Exit::Closed);
                    }
                },

                _ = tokio::time::sleep_until(liveness.message_deadline()) => {
                    return stream_error::MessageTimeout {
                        timeout: self.config.message_timeout,
                    }
                    .fail();
                }

                // expiry is caught by the message deadline above, ticks only log
                health = liveness.heartbeat() => match health {
                    Liveness::Healthy => {}
                    Liveness::Degraded { silence } | Liveness::Expired { silence } => {
                        log::warn!("No data for {:?}, connection may be stalled", silence);
                    }
                },
            }
        }
    }

    /// Hand one event to the handler, returns true if it ends the stream.
    fn deliver(&mut self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            log::trace!("Drop {} event of cancelled stream", event.event_type);
            return false;
        }

        let terminal = event.is_terminal();

        log::trace!("Dispatch {} event", event.event_type);

        let handler = &mut self.handler;
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event))) {
            log::error!("Event handler panicked: {}", panic_message(&*panic));
        }

        if terminal {
            log::debug!("Received terminal event");
        }

        terminal
    }

    fn notify_error(&mut self, error: &str) {
        let handler = &mut self.handler;
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_error(error))) {
            log::error!("Error handler panicked: {}", panic_message(&*panic));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::VecDeque,
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        task::{Context, Poll},
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{future, stream, Stream};
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::sse::{client::state::Phase, event::Payload};

    /// What the mock server does for one request.
    enum Reply {
        /// answer with a non-2xx status
        Status(reqwest::StatusCode),
        /// never answer
        Hang,
        /// open, send chunks, then close or stay silent
        Body(Vec<&'static str>, bool),
        /// open, forward chunks from the channel, close when it drops
        Channel(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
    }

    #[derive(Debug)]
    struct Live(Arc<AtomicUsize>);

    impl Live {
        fn enter(counter: &Arc<AtomicUsize>) -> Self {
            counter.fetch_add(1, Ordering::SeqCst);
            Self(Arc::clone(counter))
        }
    }

    impl Drop for Live {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct Tracked {
        inner: ByteStream,
        _live: Live,
    }

    impl Stream for Tracked {
        type Item = Result<Bytes, TransportError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.poll_next_unpin(cx)
        }
    }

    #[derive(Default)]
    struct MockTransport {
        script: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<StreamRequest>>,
        live: Arc<AtomicUsize>,
    }

    impl std::fmt::Debug for MockTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockTransport").finish()
        }
    }

    #[async_trait]
    impl Transport for Arc<MockTransport> {
        async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self.script.lock().unwrap().pop_front();
            let live = Live::enter(&self.live);

            let inner: ByteStream = match reply {
                None => {
                    return Err(TransportError::HTTPStatusNotOK {
                        url: request.url.clone(),
                        status_code: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    })
                }
                Some(Reply::Status(status_code)) => {
                    return Err(TransportError::HTTPStatusNotOK {
                        url: request.url.clone(),
                        status_code,
                    })
                }
                Some(Reply::Hang) => return future::pending().await,
                Some(Reply::Body(chunks, close)) => {
                    let chunks = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))));
                    if close {
                        chunks.boxed()
                    } else {
                        chunks.chain(stream::pending()).boxed()
                    }
                }
                Some(Reply::Channel(rx)) => {
                    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
                        .boxed()
                }
            };

            Ok(Tracked { inner, _live: live }.boxed())
        }
    }

    impl MockTransport {
        fn new(script: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn opens(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    fn session(
        config: SessionConfig,
        script: Vec<Reply>,
    ) -> (StreamSession<Arc<MockTransport>>, Arc<MockTransport>) {
        let mock = MockTransport::new(script);
        let session = StreamSession::new(config, Arc::clone(&mock)).unwrap();
        (session, mock)
    }

    fn research() -> SessionConfig {
        SessionConfig::research("http://localhost:5000/api/research")
    }

    fn collector() -> (
        impl EventHandler,
        mpsc::UnboundedReceiver<StreamEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |event: StreamEvent| {
                let _ = tx.send(event);
            },
            rx,
        )
    }

    async fn wait_phase(session: &StreamSession<Arc<MockTransport>>, phase: Phase) -> ConnectionState {
        let mut rx = session.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(3600), rx.wait_for(|s| s.phase == phase))
            .await
            .expect("phase not reached")
            .unwrap()
            .clone();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path() {
        let (mut session, mock) = session(
            SessionConfig::query("http://localhost:5000/api/query"),
            vec![Reply::Body(
                vec!["event: result\ndata: {\"Targeted User\":\"x\"}\n\n"],
                true,
            )],
        );
        let (handler, mut events) = collector();

        session.connect(json!({"query": "test"}), handler);
        let state = wait_phase(&session, Phase::Closed).await;

        assert_eq!(
            events.recv().await.unwrap(),
            StreamEvent::new("result", json!({"Targeted User": "x"}))
        );
        assert!(events.try_recv().is_err());
        assert!(!state.is_connected());
        assert_eq!(state.error, None);
        assert_eq!(session.status(), ConnectionStatus::Closed);

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload, json!({"query": "test"}));
        assert_eq!(requests[0].url, "http://localhost:5000/api/query");
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_timeout_schedules_reconnect() {
        let (mut session, _mock) = session(
            research().message_timeout(Duration::from_millis(100)),
            vec![Reply::Body(vec![], false)],
        );
        let (handler, _events) = collector();

        session.connect(json!({"query": "test"}), handler);
        wait_phase(&session, Phase::Connected).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        let state = session.state();
        assert_eq!(state.phase, Phase::Reconnecting);
        assert_eq!(state.reconnect_attempts, 1);
        assert!(state.error.unwrap().contains("message timeout"));
        assert_eq!(
            session.status(),
            ConnectionStatus::Reconnecting {
                attempt: 1,
                max_attempts: 5
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_comments_hold_the_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (mut session, mock) = session(research(), vec![Reply::Channel(rx)]);
        let (handler, mut events) = collector();

        session.connect(json!({"query": "test"}), handler);
        wait_phase(&session, Phase::Connected).await;

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(15)).await;
            tx.send(Ok(Bytes::from(": ping\n\n"))).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = session.state();
        assert_eq!(state.phase, Phase::Connected);
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.error, None);
        assert!(state.last_activity.is_some());
        assert_eq!(mock.opens(), 1);
        assert_eq!(mock.live(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_silence_only_degrades() {
        let (mut session, mock) = session(
            research().heartbeat_interval(Duration::from_secs(10)),
            vec![Reply::Body(vec![], false)],
        );
        let (handler, _events) = collector();

        session.connect(json!({"query": "test"}), handler);
        wait_phase(&session, Phase::Connected).await;

        // degraded ticks at 20s, 30s and 40s
        tokio::time::sleep(Duration::from_secs(45)).await;
        let state = session.state();
        assert_eq!(state.phase, Phase::Connected);
        assert_eq!(state.error, None);
        assert_eq!(mock.opens(), 1);

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        let state = session.state();
        assert_eq!(state.phase, Phase::Reconnecting);
        assert_eq!(state.reconnect_attempts, 1);
        assert!(state.error.unwrap().contains("message timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop_mid_stream() {
        let (mut session, mock) = session(research(), vec![Reply::Body(vec![], false)]);
        let (handler, _events) = collector();

        session.connect(json!({"query": "test"}), handler);
        wait_phase(&session, Phase::Connected).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.disconnect();

        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(session.state(), ConnectionState::default());
        assert_eq!(mock.opens(), 1);
        assert_eq!(mock.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnection_bound() {
        struct Failures(mpsc::UnboundedSender<String>);

        impl EventHandler for Failures {
            fn on_event(&mut self, _event: StreamEvent) {}

            fn on_error(&mut self, error: &str) {
                let _ = self.0.send(error.to_string());
            }
        }

        let (mut session, mock) = session(research(), vec![]);
        let (tx, mut errors) = mpsc::unbounded_channel();

        session.connect(json!({"query": "test"}), Failures(tx));
        let state = wait_phase(&session, Phase::Closed).await;

        assert_eq!(mock.opens(), 5);
        assert!(!state.is_connecting());
        assert!(state.is_failed());
        assert!(state.error.as_deref().unwrap().contains("after 5 attempts"));
        assert_eq!(session.status(), ConnectionStatus::Failed);

        let error = errors.recv().await.unwrap();
        assert_eq!(Some(error), state.error);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(mock.opens(), 5);
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_request() {
        let (mut session, mock) = session(
            research(),
            vec![Reply::Hang, Reply::Hang, Reply::Hang],
        );

        for _ in 0..3 {
            let (handler, _events) = collector();
            session.connect(json!({"query": "test"}), handler);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(mock.opens(), 3);
        assert_eq!(mock.live(), 1);
        assert_eq!(session.state().phase, Phase::Connecting);

        drop(session);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_in_order_across_chunks() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (mut session, _mock) = session(research(), vec![Reply::Channel(rx)]);
        let (handler, mut events) = collector();

        session.connect(json!({"query": "test"}), handler);
        wait_phase(&session, Phase::Connected).await;

        for chunk in ["data: 1\n\nda", "ta: 2\n\ndata: 3", "\n\n"] {
            tx.send(Ok(Bytes::from(chunk))).unwrap();
        }

        for expected in ["1", "2", "3"] {
            let event = events.recv().await.unwrap();
            assert_eq!(event.event_type, "chunk");
            assert_eq!(event.data, Payload::from(expected));
        }
        assert!(session.state().last_activity.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_disconnect() {
        let (mut session, _mock) = session(research(), vec![Reply::Body(vec![], false)]);

        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), ConnectionState::default());

        let (handler, _events) = collector();
        session.connect(json!({}), handler);
        wait_phase(&session, Phase::Connected).await;

        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), ConnectionState::default());
        assert_eq!(session.status(), ConnectionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_panic_is_contained() {
        let (mut session, _mock) = session(
            research(),
            vec![Reply::Body(vec!["data: boom\n\ndata: ok\n\n"], true)],
        );
        let (tx, mut events) = mpsc::unbounded_channel();

        session.connect(json!({}), move |event: StreamEvent| {
            if event.data == Payload::from("boom") {
                panic!("handler failure");
            }
            let _ = tx.send(event);
        });

        let state = wait_phase(&session, Phase::Closed).await;
        assert_eq!(events.recv().await.unwrap().data, Payload::from("ok"));
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_event_closes_stream() {
        let (mut session, mock) = session(
            research(),
            vec![Reply::Body(
                vec!["data: a\n\nevent: end\ndata: done\n\ndata: after\n\n"],
                false,
            )],
        );
        let (handler, mut events) = collector();

        session.connect(json!({}), handler);
        let state = wait_phase(&session, Phase::Closed).await;

        assert_eq!(events.recv().await.unwrap().data, Payload::from("a"));
        assert_eq!(events.recv().await.unwrap().event_type, "end");
        assert!(events.recv().await.is_none());
        assert_eq!(state.error, None);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.live(), 0);
        assert_eq!(mock.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_marker_closes_stream() {
        let (mut session, _mock) = session(
            SessionConfig::chat("http://localhost:5000/api/inspiration/chat"),
            vec![Reply::Body(
                vec!["data: {\"content\": \"Hi\"}\n\ndata: [DONE]\n\n"],
                false,
            )],
        );
        let (handler, mut events) = collector();

        session.connect(json!({}), handler);
        let state = wait_phase(&session, Phase::Closed).await;

        assert_eq!(
            events.recv().await.unwrap().data,
            Payload::Json(json!({"content": "Hi"}))
        );
        assert!(events.recv().await.unwrap().is_terminal());
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let (mut session, _mock) = session(
            SessionConfig::query("http://x/api/query").connection_timeout(Duration::from_secs(1)),
            vec![Reply::Hang],
        );
        let (handler, _events) = collector();

        session.connect(json!({}), handler);
        let state = wait_phase(&session, Phase::Closed).await;

        assert!(state.is_failed());
        assert!(state.error.unwrap().contains("connection timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_failures_resets_attempts() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (mut session, mock) = session(
            research(),
            vec![
                Reply::Status(reqwest::StatusCode::BAD_GATEWAY),
                Reply::Channel(rx),
                Reply::Body(vec!["data: x\n\n"], true),
            ],
        );
        let (handler, mut events) = collector();

        session.connect(json!({"query": "again"}), handler);
        wait_phase(&session, Phase::Connected).await;
        assert_eq!(session.state().reconnect_attempts, 0);

        tx.send(Err(TransportError::BodyBroken {
            source: "connection reset".into(),
        }))
        .unwrap();

        let state = wait_phase(&session, Phase::Reconnecting).await;
        assert_eq!(state.reconnect_attempts, 1);
        assert!(state.error.unwrap().contains("connection reset"));

        let state = wait_phase(&session, Phase::Closed).await;
        assert_eq!(events.recv().await.unwrap().data, Payload::from("x"));
        assert_eq!(state.error, None);
        assert_eq!(state.reconnect_attempts, 0);

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.payload == json!({"query": "again"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_running_stream() {
        let (mut session, mock) = session(
            research(),
            vec![
                Reply::Body(vec![], false),
                Reply::Body(vec!["data: second\n\n"], false),
            ],
        );

        let (first, mut first_events) = collector();
        session.connect(json!({"n": 1}), first);
        wait_phase(&session, Phase::Connected).await;

        let (second, mut second_events) = collector();
        session.connect(json!({"n": 2}), second);

        assert_eq!(second_events.recv().await.unwrap().data, Payload::from("second"));
        assert!(first_events.recv().await.is_none());
        assert_eq!(mock.live(), 1);
        assert_eq!(session.state().phase, Phase::Connected);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = StreamSession::new(SessionConfig::default(), MockTransport::new(vec![]));
        assert!(matches!(result, Err(ConfigError::EmptyUrl)));
    }
}
