use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt as _, StreamExt as _};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::errors::{ClientError, STREAM_ABORTED_UNEXPECTEDLY, STREAM_CANCELLED};
use crate::state::{SessionSnapshot, StreamSessionState};
use crate::transport::{ChatRequest, Transport};

/// Handle used to request cancellation of a running session.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The in-flight read is abandoned and the session finishes with a
    /// `stream cancelled` error result.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Updates published by a running session, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// First update of every session.
    Started { session_id: uuid::Uuid },
    /// A chunk produced one or more events.
    Progress {
        session_id: uuid::Uuid,
        snapshot: SessionSnapshot,
    },
    /// Terminal update; `snapshot.final_result` is always set.
    Finished {
        session_id: uuid::Uuid,
        snapshot: SessionSnapshot,
    },
}

/// Streaming handle returned by `StreamClient::start`.
///
/// Use `next_update()` to observe snapshots as they arrive and `finish()` to
/// obtain the final snapshot.
pub struct SessionStream {
    session_id: uuid::Uuid,
    rx: mpsc::Receiver<SessionUpdate>,
    final_rx: oneshot::Receiver<SessionSnapshot>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl SessionStream {
    pub(crate) fn spawn(
        transport: Arc<dyn Transport>,
        request: ChatRequest,
        buffer_capacity: usize,
    ) -> Self {
        let session_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        tokio::spawn(run_session(
            transport, request, session_id, tx, final_tx, abort_rx,
        ));
        Self {
            session_id,
            rx,
            final_rx,
            abort_handle: AbortHandle {
                tx: Arc::new(abort_tx),
            },
            saw_terminal: false,
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a handle that can cancel the session.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next update; `None` after the terminal update.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let update = self.rx.recv().await;
        if let Some(SessionUpdate::Finished { .. }) = &update {
            self.saw_terminal = true;
        }
        update
    }

    /// Drains remaining updates and returns the final snapshot.
    pub async fn finish(mut self) -> Result<SessionSnapshot, ClientError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(SessionUpdate::Finished { .. }) => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }
        self.final_rx.await.map_err(|_| {
            ClientError::protocol_msg(format!(
                "session {} ended without a final snapshot",
                self.session_id
            ))
        })
    }
}

async fn run_session(
    transport: Arc<dyn Transport>,
    request: ChatRequest,
    session_id: uuid::Uuid,
    tx: mpsc::Sender<SessionUpdate>,
    final_tx: oneshot::Sender<SessionSnapshot>,
    mut abort_rx: watch::Receiver<bool>,
) {
    info!(%session_id, user_id = %request.user_id, "stream session started");
    let mut state = StreamSessionState::new();

    if send_update(&tx, SessionUpdate::Started { session_id }).await {
        let driven = drive(&*transport, &request, session_id, &mut state, &tx, &mut abort_rx);
        if AssertUnwindSafe(driven).catch_unwind().await.is_err() {
            error!(%session_id, "stream session panicked while reading");
            state.fail(STREAM_ABORTED_UNEXPECTEDLY);
        }
    } else {
        state.fail(STREAM_CANCELLED);
    }
    if !state.is_finished() {
        state.finish();
    }

    let snapshot = state.snapshot();
    info!(
        %session_id,
        events = snapshot.event_count,
        complete = snapshot.is_complete,
        error = ?snapshot.final_result.as_ref().and_then(|r| r.error_message()),
        "stream session finished"
    );
    let _ = send_update(
        &tx,
        SessionUpdate::Finished {
            session_id,
            snapshot: snapshot.clone(),
        },
    )
    .await;
    let _ = final_tx.send(snapshot);
}

/// Reads the stream one chunk at a time until it ends, fails, or is aborted.
///
/// Dropping the consumer's `SessionStream` counts as an abort, even while a
/// read is pending. Leaves `state` finished on failure or cancellation; on a
/// clean end of stream the caller resolves the result.
async fn drive(
    transport: &dyn Transport,
    request: &ChatRequest,
    session_id: uuid::Uuid,
    state: &mut StreamSessionState,
    tx: &mpsc::Sender<SessionUpdate>,
    abort_rx: &mut watch::Receiver<bool>,
) {
    let opened = tokio::select! {
        _ = cancelled(abort_rx) => {
            debug!(%session_id, "session cancelled before the stream opened");
            state.fail(STREAM_CANCELLED);
            return;
        }
        _ = tx.closed() => {
            debug!(%session_id, "session consumer dropped before the stream opened");
            state.fail(STREAM_CANCELLED);
            return;
        }
        opened = transport.open(request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%session_id, error = %err, "could not open stream");
            state.fail(err.final_message());
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancelled(abort_rx) => {
                debug!(%session_id, "session cancelled");
                state.fail(STREAM_CANCELLED);
                return;
            }
            _ = tx.closed() => {
                debug!(%session_id, "session consumer dropped");
                state.fail(STREAM_CANCELLED);
                return;
            }
            next = stream.next() => match next {
                Some(Ok(chunk)) => {
                    let appended = state.ingest_chunk(&chunk).len();
                    debug!(%session_id, bytes = chunk.len(), appended, "stream chunk decoded");
                    if appended == 0 {
                        continue;
                    }
                    let update = SessionUpdate::Progress { session_id, snapshot: state.snapshot() };
                    if !send_update(tx, update).await {
                        debug!(%session_id, "session consumer dropped");
                        state.fail(STREAM_CANCELLED);
                        return;
                    }
                }
                Some(Err(err)) => {
                    warn!(%session_id, error = %err, "stream read failed");
                    state.fail(err.final_message());
                    return;
                }
                None => return,
            }
        }
    }
}

/// Resolves once cancellation is requested; never resolves if every
/// `AbortHandle` is dropped without aborting. A dropped consumer is caught
/// by `tx.closed()` instead.
async fn cancelled(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow_and_update() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

async fn send_update(tx: &mpsc::Sender<SessionUpdate>, update: SessionUpdate) -> bool {
    tx.send(update).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StreamClient;
    use crate::config::ClientConfig;
    use crate::errors::{NO_FINAL_RESPONSE, TransportError};
    use crate::transport::ChunkStream;
    use futures::stream;
    use std::sync::Mutex;

    enum Script {
        Chunks(Vec<Result<&'static str, TransportError>>),
        OpenError(TransportError),
        /// Emits the chunks, then never yields again.
        ChunksThenPending(Vec<&'static str>),
    }

    struct FakeTransport {
        script: Script,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeTransport {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
            self.requests.lock().expect("lock").push(request.clone());
            match &self.script {
                Script::OpenError(err) => Err(err.clone()),
                Script::Chunks(chunks) => {
                    let items: Vec<_> = chunks
                        .iter()
                        .map(|c| c.clone().map(|s| bytes::Bytes::from_static(s.as_bytes())))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
                Script::ChunksThenPending(chunks) => {
                    let items: Vec<Result<bytes::Bytes, TransportError>> = chunks
                        .iter()
                        .map(|s| Ok(bytes::Bytes::from_static(s.as_bytes())))
                        .collect();
                    Ok(Box::pin(stream::iter(items).chain(stream::pending())))
                }
            }
        }
    }

    /// Signals when the stream holding it is dropped.
    struct ReleaseGuard(Option<oneshot::Sender<()>>);

    impl Drop for ReleaseGuard {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Yields one triage frame and then stalls forever.
    struct StallingTransport {
        released: Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait::async_trait]
    impl Transport for StallingTransport {
        async fn open(&self, _request: &ChatRequest) -> Result<ChunkStream, TransportError> {
            let guard = ReleaseGuard(self.released.lock().expect("lock").take());
            let first: Result<bytes::Bytes, TransportError> =
                Ok(bytes::Bytes::from_static(b"data: {\"step\":\"triage\"}\n\n"));
            let chunks = stream::iter(vec![first])
                .chain(stream::pending())
                .map(move |item| {
                    let _held = &guard;
                    item
                });
            Ok(Box::pin(chunks))
        }
    }

    struct PanickingTransport;

    #[async_trait::async_trait]
    impl Transport for PanickingTransport {
        async fn open(&self, _request: &ChatRequest) -> Result<ChunkStream, TransportError> {
            panic!("transport bug");
        }
    }

    fn client(transport: Arc<FakeTransport>) -> StreamClient {
        StreamClient::with_transport(ClientConfig::default(), transport).expect("client")
    }

    #[tokio::test]
    async fn scenario_triage_then_complete() {
        let transport = FakeTransport::new(Script::Chunks(vec![Ok(concat!(
            "data: {\"step\":\"triage\",\"category\":\"ventas\"}\n\n",
            "data: {\"step\":\"complete\",\"result\":{\"formatted_response\":{\"insight\":\"ok\"}}}\n\n"
        ))]));
        let snapshot = client(transport.clone()).ask("ventas").await.expect("snapshot");

        assert!(snapshot.narrative.iter().any(|l| l.contains("ventas")));
        assert!(snapshot.is_complete);
        assert_eq!(
            snapshot.final_result.map(|r| r.into_value()),
            Some(serde_json::json!({"insight": "ok"}))
        );
        let requests = transport.requests.lock().expect("lock");
        assert_eq!(requests.as_slice(), &[ChatRequest::new("ventas", "anonymous")]);
    }

    #[tokio::test]
    async fn updates_arrive_in_order_with_monotonic_progress() {
        let transport = FakeTransport::new(Script::Chunks(vec![
            Ok("data: {\"step\":\"triage\"}\n\ndata: {\"step\":\"inte"),
            Ok("nt\"}\n\n"),
            Ok(": keepalive\n\n"),
            Ok("data: {\"step\":\"sql_execution\",\"success\":true,\"total_filas\":12}\n\n"),
        ]));
        let mut session = client(transport).start("q").await;

        let mut updates = Vec::new();
        while let Some(update) = session.next_update().await {
            updates.push(update);
        }
        assert!(matches!(updates.first(), Some(SessionUpdate::Started { .. })));
        let percentages: Vec<u8> = updates
            .iter()
            .filter_map(|u| match u {
                SessionUpdate::Progress { snapshot, .. } => Some(snapshot.progress.percentage),
                _ => None,
            })
            .collect();
        assert_eq!(percentages, vec![10, 20, 30]);

        let Some(SessionUpdate::Finished { snapshot, .. }) = updates.last() else {
            panic!("expected terminal update");
        };
        assert_eq!(snapshot.event_count, 3);
        assert_eq!(
            snapshot.narrative.last().map(String::as_str),
            Some("Execution succeeded. Returned 12 rows.")
        );
        assert!(!snapshot.is_complete);
    }

    #[tokio::test]
    async fn empty_stream_finishes_with_missing_response_error() {
        let snapshot = client(FakeTransport::new(Script::Chunks(vec![])))
            .ask("q")
            .await
            .expect("snapshot");
        assert!(!snapshot.is_complete);
        assert_eq!(
            snapshot.final_result.as_ref().and_then(|r| r.error_message()),
            Some(NO_FINAL_RESPONSE)
        );
    }

    #[tokio::test]
    async fn status_error_surfaces_response_text() {
        let transport = FakeTransport::new(Script::OpenError(TransportError::Status {
            status: 503,
            body: "agent busy".into(),
        }));
        let snapshot = client(transport).ask("q").await.expect("snapshot");
        assert_eq!(
            snapshot.final_result.as_ref().and_then(|r| r.error_message()),
            Some("agent busy")
        );
    }

    #[tokio::test]
    async fn read_error_mid_stream_keeps_narrative_and_reports_error() {
        let transport = FakeTransport::new(Script::Chunks(vec![
            Ok("data: {\"step\":\"schema\",\"tables\":[\"ventas\"]}\n\n"),
            Err(TransportError::read("connection reset")),
            Ok("data: {\"step\":\"complete\",\"result\":{\"insight\":\"late\"}}\n\n"),
        ]));
        let snapshot = client(transport).ask("q").await.expect("snapshot");
        assert_eq!(snapshot.narrative, vec!["Prioritized tables: ventas."]);
        assert_eq!(snapshot.event_count, 1);
        assert_eq!(
            snapshot.final_result.as_ref().and_then(|r| r.error_message()),
            Some("connection reset")
        );
    }

    #[tokio::test]
    async fn abort_stops_reading_and_discards_partial_frame() {
        let transport = FakeTransport::new(Script::ChunksThenPending(vec![
            "data: {\"step\":\"triage\"}\n\n",
            "data: {\"step\":\"complete\",\"result\":{\"insight\":\"x\"}}",
        ]));
        let mut session = client(transport).start("q").await;
        let abort = session.abort_handle();

        while let Some(update) = session.next_update().await {
            if matches!(update, SessionUpdate::Progress { .. }) {
                break;
            }
        }
        abort.abort();

        let snapshot = session.finish().await.expect("snapshot");
        assert_eq!(snapshot.event_count, 1);
        assert!(!snapshot.is_complete);
        assert_eq!(
            snapshot.final_result.as_ref().and_then(|r| r.error_message()),
            Some(STREAM_CANCELLED)
        );
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_share_state() {
        let shared = client(FakeTransport::new(Script::Chunks(vec![Ok(
            "data: {\"step\":\"triage\",\"category\":\"ventas\"}\n\n",
        )])));
        let first = shared.start("a").await;
        let second = shared.start("b").await;
        assert_ne!(first.session_id(), second.session_id());

        let (a, b) = tokio::join!(first.finish(), second.finish());
        let (a, b) = (a.expect("a"), b.expect("b"));
        assert_eq!(a.event_count, 1);
        assert_eq!(b.event_count, 1);
        assert_eq!(a.narrative, b.narrative);
    }

    #[tokio::test]
    async fn dropping_the_session_releases_a_stalled_stream() {
        let (released_tx, released_rx) = oneshot::channel();
        let transport = Arc::new(StallingTransport {
            released: Mutex::new(Some(released_tx)),
        });
        let client =
            StreamClient::with_transport(ClientConfig::default(), transport).expect("client");
        let mut session = client.start("q").await;
        while let Some(update) = session.next_update().await {
            if matches!(update, SessionUpdate::Progress { .. }) {
                break;
            }
        }
        drop(session);

        let released =
            tokio::time::timeout(std::time::Duration::from_secs(2), released_rx).await;
        assert!(matches!(released, Ok(Ok(()))), "stalled stream was not released");
    }

    #[tokio::test]
    async fn panicking_transport_ends_with_error_result() {
        let client =
            StreamClient::with_transport(ClientConfig::default(), Arc::new(PanickingTransport))
                .expect("client");
        let snapshot = client.ask("q").await.expect("snapshot");
        assert_eq!(
            snapshot.final_result.as_ref().and_then(|r| r.error_message()),
            Some(STREAM_ABORTED_UNEXPECTEDLY)
        );
        assert_eq!(snapshot.event_count, 0);
    }
}
