use crate::device::DeviceState;
use crate::error::Dfr22Error;
use crate::framing::FrameDecoder;
use crate::parser::parse_response;
use crate::subscription::Event;
use crate::transport::Connector;
use crate::types::{ConnectionState, DeviceAddress, SocketStatus};
use futures_util::StreamExt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::FramedRead;

/// Frames that may wait for the socket writer before further sends are dropped
pub(crate) const OUTBOUND_QUEUE_LEN: usize = 32;

/// Lifecycle bookkeeping shared by the client and its session task
pub(crate) struct Shared {
    pub state: ConnectionState,
    /// Last socket status reported to subscribers
    pub status: SocketStatus,
    pub address: Option<DeviceAddress>,
    pub manual_disconnect: bool,
    pub session: Option<SessionHandle>,
    /// Writer queue of the current link, present only while connected
    pub outbound: Option<mpsc::Sender<Vec<u8>>>,
    /// Bumped whenever a session is torn down so a stale task cannot
    /// overwrite the state of its successor
    pub generation: u64,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            status: SocketStatus::NoConnect,
            address: None,
            manual_disconnect: false,
            session: None,
            outbound: None,
            generation: 0,
        }
    }

    /// Record `status` and publish it while the caller still holds the lock
    pub fn report(&mut self, events: &broadcast::Sender<Event>, status: SocketStatus) {
        tracing::debug!("Socket status {} ({})", status, status.code());
        self.status = status;
        let _ = events.send(Event::ConnectionStatus(status));
    }
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where decoded traffic from the unit ends up
#[derive(Clone)]
pub(crate) struct Inbound {
    pub device: Arc<Mutex<DeviceState>>,
    pub events: broadcast::Sender<Event>,
    pub dropped_frames: Arc<AtomicU64>,
}

impl Inbound {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            device: Arc::new(Mutex::new(DeviceState::new())),
            events,
            dropped_frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Decode one inbound payload into the device state and notify subscribers
    ///
    /// The event is published before the device lock is released, so
    /// subscribers see snapshots in the order they were applied. Returns
    /// whether the payload changed any tracked field.
    pub fn dispatch(&self, payload: &str) -> bool {
        tracing::debug!("Received: {:?}", payload);

        let Some(update) = parse_response(payload) else {
            return false;
        };
        let mut device = lock(&self.device);
        let Some(event) = device.apply(update) else {
            return false;
        };
        let _ = self.events.send(event);
        true
    }
}

/// Timing and buffer settings of a session
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionSettings {
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub read_buffer_size: usize,
}

/// Handle to a running session task
pub(crate) struct SessionHandle {
    stop_tx: broadcast::Sender<()>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Cut a pending reconnect delay short
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Stop the task, closing the socket and cancelling any reconnect timer
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        // the task also exits on its own once the sender is gone
        drop(self.task);
    }
}

/// Outcome of one connect attempt
enum Attempt<S> {
    Opened(S),
    Failed(SocketStatus),
    Superseded,
}

/// Why a connected session ended
enum SessionEnd {
    Stopped,
    Lost(SocketStatus),
}

/// Connection manager task
///
/// Runs connect, pump and reconnect in a single loop so only one receive
/// and at most one reconnect timer exist at any time.
pub(crate) struct Session<C: Connector> {
    connector: Arc<C>,
    address: DeviceAddress,
    settings: SessionSettings,
    generation: u64,
    shared: Arc<Mutex<Shared>>,
    inbound: Inbound,
}

impl<C: Connector> Session<C> {
    pub fn new(
        connector: Arc<C>,
        address: DeviceAddress,
        settings: SessionSettings,
        generation: u64,
        shared: Arc<Mutex<Shared>>,
        inbound: Inbound,
    ) -> Self {
        Self {
            connector,
            address,
            settings,
            generation,
            shared,
            inbound,
        }
    }

    /// Start the task and return its handle
    pub fn spawn(self) -> SessionHandle {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let wake = Arc::new(Notify::new());

        let task = tokio::spawn(self.run(stop_rx, wake.clone()));

        SessionHandle {
            stop_tx,
            wake,
            task,
        }
    }

    async fn run(self, mut stop_rx: broadcast::Receiver<()>, wake: Arc<Notify>) {
        loop {
            if !self.transition(ConnectionState::Connecting, SocketStatus::Waiting, None) {
                break;
            }
            tracing::info!("Connecting to {}", self.address);

            let attempt = tokio::select! {
                _ = stop_rx.recv() => break,
                attempt = self.open() => attempt,
            };

            let status = match attempt {
                Attempt::Superseded => break,
                Attempt::Failed(status) => status,
                Attempt::Opened(stream) => {
                    // a fresh queue per link; frames sent before it existed were dropped
                    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_LEN);
                    if !self.transition(
                        ConnectionState::Connected,
                        SocketStatus::Connected,
                        Some(outbound_tx),
                    ) {
                        break;
                    }
                    tracing::info!("Connected to {}", self.address);

                    match self.pump(stream, &mut stop_rx, outbound_rx).await {
                        SessionEnd::Stopped => break,
                        SessionEnd::Lost(status) => status,
                    }
                }
            };

            if !self.transition(ConnectionState::Disconnected, status, None) {
                break;
            }

            tracing::info!(
                "Reconnecting to {} in {:?}",
                self.address,
                self.settings.reconnect_delay
            );
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = wake.notified() => tracing::debug!("Reconnect requested before delay elapsed"),
                _ = sleep(self.settings.reconnect_delay) => {}
            }
        }

        tracing::debug!("Session for {} finished", self.address);
    }

    /// Resolve the host if the connector needs it, then open the stream
    async fn open(&self) -> Attempt<C::Stream> {
        let resolved = if C::LOOKS_UP_HOST && self.address.host.parse::<IpAddr>().is_err() {
            match self.lookup().await {
                Ok(resolved) => resolved,
                Err(attempt) => return attempt,
            }
        } else {
            Vec::new()
        };

        let connect = self.connector.connect(&self.address, &resolved);
        match timeout(self.settings.connect_timeout, connect).await {
            Ok(Ok(stream)) => Attempt::Opened(stream),
            Ok(Err(e)) => {
                tracing::warn!("Connection attempt to {} failed: {}", self.address, e);
                Attempt::Failed(SocketStatus::ConnectFailed)
            }
            Err(_) => {
                tracing::warn!(
                    "Connection attempt to {} timed out after {:?}",
                    self.address,
                    self.settings.connect_timeout
                );
                Attempt::Failed(SocketStatus::ConnectFailed)
            }
        }
    }

    async fn lookup(&self) -> Result<Vec<SocketAddr>, Attempt<C::Stream>> {
        if !self.transition(ConnectionState::Connecting, SocketStatus::DnsLookup, None) {
            return Err(Attempt::Superseded);
        }

        let lookup = self.connector.lookup(&self.address);
        let error = match timeout(self.settings.connect_timeout, lookup).await {
            Ok(Ok(resolved)) if !resolved.is_empty() => {
                tracing::debug!("Resolved {} to {:?}", self.address.host, resolved);
                if !self.transition(ConnectionState::Connecting, SocketStatus::DnsResolved, None) {
                    return Err(Attempt::Superseded);
                }
                return Ok(resolved);
            }
            Ok(Ok(_)) => "no addresses found".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.settings.connect_timeout),
        };
        tracing::warn!("Lookup of {} failed: {}", self.address.host, error);
        Err(Attempt::Failed(SocketStatus::DnsFailed))
    }

    /// Move to `state` and report `status`, unless this session has been
    /// superseded or manually disconnected
    fn transition(
        &self,
        state: ConnectionState,
        status: SocketStatus,
        outbound: Option<mpsc::Sender<Vec<u8>>>,
    ) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation || shared.manual_disconnect {
            return false;
        }
        shared.state = state;
        shared.outbound = outbound;
        shared.report(&self.inbound.events, status);
        true
    }

    /// Receive frames until the link drops or the session is stopped
    ///
    /// Writes run on their own task so a unit that stops reading cannot
    /// stall the receive side or a stop request.
    async fn pump(
        &self,
        stream: C::Stream,
        stop_rx: &mut broadcast::Receiver<()>,
        outbound_rx: mpsc::Receiver<Vec<u8>>,
    ) -> SessionEnd {
        let (reader, writer) = tokio::io::split(stream);
        let decoder = FrameDecoder::with_drop_counter(self.inbound.dropped_frames.clone());
        let mut frames =
            FramedRead::with_capacity(reader, decoder, self.settings.read_buffer_size);
        let mut writer_task = tokio::spawn(write_frames(writer, outbound_rx));

        let end = loop {
            tokio::select! {
                _ = stop_rx.recv() => break SessionEnd::Stopped,
                written = &mut writer_task => break match written {
                    Ok(Ok(())) => SessionEnd::Stopped,
                    Ok(Err(e)) => {
                        tracing::warn!("Failed to send to {}: {}", self.address, e);
                        SessionEnd::Lost(SocketStatus::from_io_error(&e))
                    }
                    Err(e) => {
                        tracing::error!("Writer for {} failed: {}", self.address, e);
                        SessionEnd::Lost(SocketStatus::LinkLost)
                    }
                },
                frame = frames.next() => match frame {
                    Some(Ok(payload)) => {
                        self.inbound.dispatch(&payload);
                    }
                    Some(Err(Dfr22Error::Io(e))) => {
                        tracing::warn!("Receive from {} failed: {}", self.address, e);
                        break SessionEnd::Lost(SocketStatus::from_io_error(&e));
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Receive from {} failed: {}", self.address, e);
                        break SessionEnd::Lost(SocketStatus::LinkLost);
                    }
                    None => {
                        tracing::info!("Connection closed by {}", self.address);
                        break SessionEnd::Lost(SocketStatus::BrokenRemotely);
                    }
                },
            }
        };

        writer_task.abort();
        end
    }
}

/// Copy queued frames to the socket until the queue closes or a write fails
async fn write_frames<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
) -> io::Result<()> {
    while let Some(bytes) = outbound.recv().await {
        writer.write_all(&bytes).await?;
        tracing::debug!("Sent: {:?}", String::from_utf8_lossy(&bytes));
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Shutdown of write half failed: {}", e);
    }
    Ok(())
}
