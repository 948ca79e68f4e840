//! Connection management: the packet pump, action dispatch and event collection

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    action::{Action, ActionId, ManagerResponse},
    constants::{
        DEFAULT_COLLECT_TIMEOUT_MS, DEFAULT_RESPONSE_TIMEOUT_MS, MAX_EVENT_QUEUE_SIZE,
        SOCKET_BUF_SIZE,
    },
    correlator::{Dispatch, EventCollection, Subscriptions},
    error::{AmiError, AmiResult},
    packet::Packet,
    protocol::{PacketKind, PacketParser},
};

/// Connection status for the Manager client
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// The reader task is running.
    Connected,
    /// The reader task has stopped.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Transport I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// The stream could not be framed any more
    ProtocolError(String),
    /// Clean EOF on the transport
    ConnectionClosed,
    /// Client called disconnect()
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
        }
    }
}

/// Options for the Manager connection.
///
/// Deserializable so applications can keep it in their own config file.
/// Missing keys fall back to [`Default::default()`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmiOptions {
    /// Capacity of the channel delivering unscoped events. Default: 1000.
    pub event_queue_size: usize,
    /// How long to wait for an action's response. Default: 5000ms.
    pub response_timeout_ms: u64,
    /// Deadline for a whole bulk collection. Default: 10000ms.
    pub collect_timeout_ms: u64,
}

impl Default for AmiOptions {
    fn default() -> Self {
        Self {
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            collect_timeout_ms: DEFAULT_COLLECT_TIMEOUT_MS,
        }
    }
}

/// An action written to the wire whose response has not been read yet.
struct PendingAction {
    id: ActionId,
    tx: oneshot::Sender<AmiResult<Packet>>,
}

/// Caller-side half of a pending action.
///
/// The response timeout runs from the moment the action was written, so an
/// entry nobody awaits is dead once `deadline` passes.
struct AwaitingResponse {
    action: String,
    deadline: Instant,
    rx: oneshot::Receiver<AmiResult<Packet>>,
}

/// Shared state between AmiClient handles and the reader task
struct SharedState {
    /// Pending actions in the order they were written
    pending: Mutex<VecDeque<PendingAction>>,
    awaiting: std::sync::Mutex<HashMap<ActionId, AwaitingResponse>>,
    subscriptions: Arc<Subscriptions>,
    next_action_id: AtomicU64,
    response_timeout_ms: AtomicU64,
    collect_timeout_ms: AtomicU64,
    /// Set when events have been dropped due to a full queue
    event_overflow: AtomicBool,
    /// Total count of dropped events
    dropped_event_count: AtomicU64,
    /// Set by disconnect() so the following EOF is reported as requested
    closing: AtomicBool,
}

impl SharedState {
    fn take_awaiting(&self, id: ActionId) -> Option<AwaitingResponse> {
        self.awaiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Route a response packet to its pending action.
    ///
    /// A response whose `ActionID` is absent or unknown means the stream is
    /// out of sync; the oldest live pending action is failed with a protocol
    /// error instead of being handed someone else's response.
    async fn deliver_response(&self, packet: Packet) {
        let mut pending = self
            .pending
            .lock()
            .await;
        pending.retain(|p| !p.tx.is_closed());

        let id = packet
            .action_id()
            .and_then(|raw| {
                raw.parse::<ActionId>()
                    .ok()
            });
        let position = id.and_then(|id| {
            pending
                .iter()
                .position(|p| p.id == id)
        });

        if let Some(action) = position.and_then(|pos| pending.remove(pos)) {
            trace!("[RECV] Response for ActionID {}", action.id);
            // Receiver is gone if the caller timed out; a late reply is dropped.
            let _ = action
                .tx
                .send(Ok(packet));
            return;
        }

        match pending.pop_front() {
            Some(oldest) => {
                warn!(
                    "Response ActionID {:?} does not match pending ActionID {}",
                    packet.action_id(),
                    oldest.id
                );
                let _ = oldest
                    .tx
                    .send(Err(AmiError::protocol_error(format!(
                        "response ActionID {:?} does not match pending ActionID {}",
                        packet.action_id(),
                        oldest.id
                    ))));
            }
            None => warn!(
                "Received response with ActionID {:?} but no action is pending",
                packet.action_id()
            ),
        }
    }

    /// Fail the oldest live pending action with `err`.
    ///
    /// Used when a packet could not be decoded: the reply the oldest caller
    /// is waiting for may be the one that was lost.
    async fn fail_oldest_pending(&self, err: AmiError) {
        let mut pending = self
            .pending
            .lock()
            .await;
        pending.retain(|p| !p.tx.is_closed());
        if let Some(oldest) = pending.pop_front() {
            debug!("[CORRELATE] Failing ActionID {}: {}", oldest.id, err);
            let _ = oldest
                .tx
                .send(Err(err));
        }
    }

    /// Drop the waiter halves whose deadline passed without anyone awaiting
    /// them, then the pending entries nobody can receive any more.
    async fn prune_expired(&self, now: Instant) {
        self.awaiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, w| w.deadline > now);
        self.pending
            .lock()
            .await
            .retain(|p| !p.tx.is_closed());
    }

    async fn forget_pending(&self, id: ActionId) {
        self.pending
            .lock()
            .await
            .retain(|p| p.id != id);
    }

    async fn fail_all_pending(&self) {
        let mut pending = self
            .pending
            .lock()
            .await;
        for action in pending.drain(..) {
            let _ = action
                .tx
                .send(Err(AmiError::ConnectionClosed));
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Manager client handle (Clone + Send)
///
/// Writes are serialized through the writer mutex. A single background
/// reader task owns the read half; it routes responses to pending actions
/// and events to the subscription registered for their `ActionID`, or to the
/// [`AmiEventStream`] when no subscription claims them.
#[derive(Clone)]
pub struct AmiClient {
    writer: Arc<Mutex<BoxedWriter>>,
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for AmiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiClient")
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.active_subscriptions())
            .finish()
    }
}

/// Unscoped event receiver (!Clone)
///
/// Receives events that no bulk collection claimed: events without an
/// `ActionID`, and late events for actions whose collection already ended.
///
/// An `Err(AmiError::QueueFull)` indicates that one or more events were
/// dropped because the application fell behind. Use
/// [`AmiClient::dropped_event_count`] for the exact count.
pub struct AmiEventStream {
    rx: mpsc::Receiver<Result<Packet, AmiError>>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for AmiEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiEventStream")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Try to send an event (or error) to the application via try_send.
///
/// If the channel is full, drop the item, set the overflow flag, and
/// increment the dropped counter. Before each dispatch, check the overflow
/// flag and attempt to deliver a QueueFull error notification first.
/// A closed channel just means nobody listens for unscoped events.
fn dispatch_event(
    event_tx: &mpsc::Sender<Result<Packet, AmiError>>,
    shared: &SharedState,
    item: Result<Packet, AmiError>,
) {
    if event_tx.is_closed() {
        trace!("Event stream dropped, discarding unscoped event");
        return;
    }

    if shared
        .event_overflow
        .load(Ordering::Relaxed)
    {
        match event_tx.try_send(Err(AmiError::QueueFull)) {
            Ok(()) => {
                shared
                    .event_overflow
                    .store(false, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return,
            Err(mpsc::error::TrySendError::Full(_)) => {}
        }
    }

    match event_tx.try_send(item) {
        Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            shared
                .event_overflow
                .store(true, Ordering::Relaxed);
            shared
                .dropped_event_count
                .fetch_add(1, Ordering::Relaxed);
            warn!("Event queue full, dropping event");
        }
    }
}

/// Route one decoded packet.
async fn route_packet(
    shared: &SharedState,
    event_tx: &mpsc::Sender<Result<Packet, AmiError>>,
    packet: Packet,
) {
    match PacketKind::classify(&packet) {
        PacketKind::Response => shared
            .deliver_response(packet)
            .await,
        PacketKind::Event => {
            let id = packet
                .action_id()
                .and_then(|raw| {
                    raw.parse::<ActionId>()
                        .ok()
                });
            let unclaimed = match id {
                Some(id) => shared
                    .subscriptions
                    .route(id, packet)
                    .err(),
                None => Some(packet),
            };
            if let Some(packet) = unclaimed {
                dispatch_event(event_tx, shared, Ok(packet));
            }
        }
        PacketKind::Unknown => {
            debug!("Ignoring packet with neither Response nor Event field");
        }
    }
}

/// Background reader loop
async fn reader_loop<R>(
    reader: R,
    parser: PacketParser,
    shared: Arc<SharedState>,
    status_tx: watch::Sender<ConnectionStatus>,
    event_tx: mpsc::Sender<Result<Packet, AmiError>>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        reader,
        parser,
        shared.clone(),
        event_tx,
    ));
    let reason = match futures_util::FutureExt::catch_unwind(result).await {
        Ok(reason) => reason,
        Err(_) => {
            tracing::error!("reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };

    let _ = status_tx.send(ConnectionStatus::Disconnected(reason));
    shared
        .fail_all_pending()
        .await;
    shared
        .subscriptions
        .fail_all(|| AmiError::ConnectionClosed);
    shared
        .subscriptions
        .close_all();
}

async fn reader_loop_inner<R>(
    mut reader: R,
    mut parser: PacketParser,
    shared: Arc<SharedState>,
    event_tx: mpsc::Sender<Result<Packet, AmiError>>,
) -> DisconnectReason
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    loop {
        // Drain every complete packet before reading more
        match parser.parse_packet() {
            Ok(Some(packet)) => {
                route_packet(&shared, &event_tx, packet).await;
                continue;
            }
            Ok(None) => {}
            Err(AmiError::MalformedPacket { line }) => {
                // Framing is intact; whatever was collecting is now suspect.
                warn!("Malformed packet line {:?}", line);
                shared
                    .fail_oldest_pending(AmiError::MalformedPacket { line: line.clone() })
                    .await;
                shared
                    .subscriptions
                    .fail_all(|| AmiError::MalformedPacket { line: line.clone() });
                dispatch_event(&event_tx, &shared, Err(AmiError::MalformedPacket { line }));
                continue;
            }
            Err(e) => {
                warn!("Parser error: {}", e);
                return DisconnectReason::ProtocolError(e.to_string());
            }
        }

        match reader
            .read(&mut read_buffer)
            .await
        {
            Ok(0) => {
                info!("Connection closed (EOF)");
                if shared
                    .closing
                    .load(Ordering::Relaxed)
                {
                    return DisconnectReason::ClientRequested;
                }
                return DisconnectReason::ConnectionClosed;
            }
            Ok(n) => {
                trace!("[RECV] Read {} bytes", n);
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("Buffer error: {}", e);
                    return DisconnectReason::ProtocolError(e.to_string());
                }
            }
            Err(e) => {
                warn!("Read error: {}", e);
                return DisconnectReason::IoError(e.to_string());
            }
        }
    }
}

/// Hand one routed item to `collection`. `Some` ends the collection.
fn feed<A>(
    collection: &mut EventCollection<A>,
    item: Option<AmiResult<Packet>>,
) -> Option<AmiResult<()>> {
    match item {
        Some(Ok(packet)) => match collection.dispatch(&packet) {
            Dispatch::Continue => None,
            Dispatch::Done => Some(Ok(())),
            Dispatch::Failed(e) => Some(Err(e)),
        },
        Some(Err(e)) => Some(Err(e)),
        None => Some(Err(AmiError::ConnectionClosed)),
    }
}

impl AmiClient {
    /// Start a client on an already-authenticated transport.
    ///
    /// Spawns the reader task, so this must be called inside a tokio runtime.
    pub fn start<S>(stream: S) -> (Self, AmiEventStream)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start_with_options(stream, AmiOptions::default())
    }

    /// Start a client with custom options.
    pub fn start_with_options<S>(stream: S, options: AmiOptions) -> (Self, AmiEventStream)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let queue_size = options
            .event_queue_size
            .max(1);

        let (read_half, write_half) = tokio::io::split(stream);

        let shared = Arc::new(SharedState {
            pending: Mutex::new(VecDeque::new()),
            awaiting: std::sync::Mutex::new(HashMap::new()),
            subscriptions: Arc::new(Subscriptions::default()),
            next_action_id: AtomicU64::new(1),
            response_timeout_ms: AtomicU64::new(options.response_timeout_ms),
            collect_timeout_ms: AtomicU64::new(options.collect_timeout_ms),
            event_overflow: AtomicBool::new(false),
            dropped_event_count: AtomicU64::new(0),
            closing: AtomicBool::new(false),
        });

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let status_rx2 = status_tx.subscribe();
        let (event_tx, event_rx) = mpsc::channel(queue_size);

        tokio::spawn(reader_loop(
            read_half,
            PacketParser::new(),
            shared.clone(),
            status_tx,
            event_tx,
        ));
        info!("Manager client started");

        let writer: BoxedWriter = Box::new(write_half);
        let client = AmiClient {
            writer: Arc::new(Mutex::new(writer)),
            shared,
            status_rx,
        };

        let stream = AmiEventStream {
            rx: event_rx,
            status_rx: status_rx2,
        };

        (client, stream)
    }

    fn next_action_id(&self) -> ActionId {
        ActionId::new(
            self.shared
                .next_action_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    /// Register `id` as pending and write the action.
    ///
    /// The writer lock is held while the pending entry is queued so the
    /// pending queue order always equals the wire order.
    async fn write_action(&self, action: &Action, id: ActionId) -> AmiResult<()> {
        if !self.is_connected() {
            return Err(AmiError::NotConnected);
        }

        let wire = action.to_wire_format(id)?;
        debug!("[SEND] {} ActionID {}", action.name(), id);

        let mut writer = self
            .writer
            .lock()
            .await;

        let now = Instant::now();
        self.shared
            .prune_expired(now)
            .await;
        let deadline = now
            + Duration::from_millis(
                self.shared
                    .response_timeout_ms
                    .load(Ordering::Relaxed),
            );

        let (tx, rx) = oneshot::channel();
        self.shared
            .awaiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                AwaitingResponse {
                    action: action
                        .name()
                        .to_string(),
                    deadline,
                    rx,
                },
            );
        self.shared
            .pending
            .lock()
            .await
            .push_back(PendingAction { id, tx });

        let written = async {
            writer
                .write_all(wire.as_bytes())
                .await?;
            writer
                .flush()
                .await
        }
        .await;

        if let Err(e) = written {
            drop(writer);
            self.shared
                .take_awaiting(id);
            self.shared
                .forget_pending(id)
                .await;
            return Err(AmiError::Io(e));
        }
        Ok(())
    }

    /// Write an action and return its freshly allocated [`ActionId`].
    ///
    /// Does not wait for the response; pair every call with
    /// [`await_response`](Self::await_response).
    pub async fn send_action(&self, action: &Action) -> AmiResult<ActionId> {
        let id = self.next_action_id();
        self.write_action(action, id)
            .await?;
        Ok(id)
    }

    /// Wait for the response to a previously sent action.
    ///
    /// Fails with [`AmiError::ActionFailed`] on `Response: Error`, with
    /// [`AmiError::Protocol`] if the reader saw a response for a different
    /// `ActionID` first, with [`AmiError::MalformedPacket`] if the reply
    /// could not be decoded, and with [`AmiError::Timeout`] once the
    /// response timeout, counted from the send, passes.
    ///
    /// An action not awaited within the response timeout is forgotten on a
    /// later send; awaiting it then fails with [`AmiError::Protocol`].
    pub async fn await_response(&self, id: ActionId) -> AmiResult<Packet> {
        Ok(self
            .await_manager_response(id)
            .await?
            .into_packet())
    }

    async fn await_manager_response(&self, id: ActionId) -> AmiResult<ManagerResponse> {
        let waiter = self
            .shared
            .take_awaiting(id)
            .ok_or_else(|| {
                AmiError::protocol_error(format!("no pending action with ActionID {}", id))
            })?;

        let timeout_ms = self
            .shared
            .response_timeout_ms
            .load(Ordering::Relaxed);
        let packet = match timeout_at(waiter.deadline, waiter.rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(AmiError::ConnectionClosed),
            Err(_) => {
                self.shared
                    .forget_pending(id)
                    .await;
                warn!(
                    "No response to {} ActionID {} after {}ms",
                    waiter.action, id, timeout_ms
                );
                return Err(AmiError::Timeout { timeout_ms });
            }
        };

        let response = ManagerResponse::new(waiter.action, packet)?;
        debug!("[RECV] ActionID {} status {:?}", id, response.status());
        response.into_result()
    }

    /// Send an action and wait for its response.
    pub async fn send(&self, action: &Action) -> AmiResult<ManagerResponse> {
        let id = self
            .send_action(action)
            .await?;
        self.await_manager_response(id)
            .await
    }

    /// Run a bulk query with the default collection deadline.
    ///
    /// See [`collect_with_deadline`](Self::collect_with_deadline).
    pub async fn collect<A: Send>(
        &self,
        action: &Action,
        collection: EventCollection<A>,
    ) -> AmiResult<A> {
        let deadline = Duration::from_millis(
            self.shared
                .collect_timeout_ms
                .load(Ordering::Relaxed),
        );
        self.collect_with_deadline(action, collection, deadline)
            .await
    }

    /// Send `action` and feed its correlated events through `collection`
    /// until a handler reports [`Dispatch::Done`].
    ///
    /// The route for the new `ActionID` is registered before the action is
    /// written, so no event can slip past. It is removed again before this
    /// returns on every path, including errors and `deadline` expiry. On
    /// failure the partially built accumulator is discarded.
    ///
    /// `deadline` starts once the action is fully written. Events that beat
    /// the response are held back until the response confirms the action,
    /// but an error routed to the collection ends it at once.
    pub async fn collect_with_deadline<A: Send>(
        &self,
        action: &Action,
        mut collection: EventCollection<A>,
        deadline: Duration,
    ) -> AmiResult<A> {
        if !self.is_connected() {
            return Err(AmiError::NotConnected);
        }

        let id = self.next_action_id();
        let mut subscription = self
            .shared
            .subscriptions
            .subscribe(id)?;
        collection.bind(id);
        debug!(
            "[COLLECT] {} ActionID {} with {} handlers",
            action.name(),
            id,
            collection.handler_count()
        );

        // Written outside the deadline: a write cut short would leave half an
        // action on the wire.
        self.write_action(action, id)
            .await?;

        let outcome = timeout(deadline, async {
            let mut early = Vec::new();
            let response = self.await_manager_response(id);
            tokio::pin!(response);
            loop {
                tokio::select! {
                    biased;
                    result = &mut response => {
                        result?;
                        break;
                    }
                    item = subscription.recv() => match item {
                        Some(Ok(packet)) => early.push(packet),
                        Some(Err(e)) => return Err(e),
                        None => return Err(AmiError::ConnectionClosed),
                    },
                }
            }

            for packet in early {
                if let Some(result) = feed(&mut collection, Some(Ok(packet))) {
                    return result;
                }
            }
            loop {
                let item = subscription
                    .recv()
                    .await;
                if let Some(result) = feed(&mut collection, item) {
                    return result;
                }
            }
        })
        .await;

        drop(subscription);

        match outcome {
            Ok(Ok(())) => Ok(collection.into_accumulator()),
            Ok(Err(e)) => {
                debug!("[COLLECT] ActionID {} failed: {}", id, e);
                Err(e)
            }
            Err(_) => {
                let timeout_ms = deadline.as_millis() as u64;
                warn!(
                    "[COLLECT] {} ActionID {} not complete after {}ms",
                    action.name(),
                    id,
                    timeout_ms
                );
                Err(AmiError::Timeout { timeout_ms })
            }
        }
    }

    /// Number of live event subscriptions (bulk collections in progress).
    pub fn active_subscriptions(&self) -> usize {
        self.shared
            .subscriptions
            .len()
    }

    /// Number of unscoped events dropped due to a full event queue.
    pub fn dropped_event_count(&self) -> u64 {
        self.shared
            .dropped_event_count
            .load(Ordering::Relaxed)
    }

    /// Set the response timeout (default: 5 seconds).
    pub fn set_response_timeout(&self, duration: Duration) {
        self.shared
            .response_timeout_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set the default deadline for [`collect`](Self::collect) (default: 10 seconds).
    pub fn set_collect_timeout(&self, duration: Duration) {
        self.shared
            .collect_timeout_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the connection is alive (not yet disconnected).
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    /// Shut down the write half of the transport.
    ///
    /// The reader task stops once the PBX closes its side.
    pub async fn disconnect(&self) -> AmiResult<()> {
        info!("Client requested disconnect");
        self.shared
            .closing
            .store(true, Ordering::Relaxed);
        let mut writer = self
            .writer
            .lock()
            .await;
        writer
            .shutdown()
            .await
            .map_err(AmiError::Io)?;
        Ok(())
    }
}

impl AmiEventStream {
    /// Receive the next unscoped event, or None once the reader task stopped.
    ///
    /// Returns `Err(AmiError::QueueFull)` once per overflow episode, and
    /// `Err(AmiError::MalformedPacket)` for packets that could not be decoded.
    pub async fn recv(&mut self) -> Option<Result<Packet, AmiError>> {
        self.rx
            .recv()
            .await
    }

    /// Whether the connection is alive (not yet disconnected).
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }
}

impl futures_util::Stream for AmiEventStream {
    type Item = Result<Packet, AmiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}
