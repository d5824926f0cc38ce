use crate::config::{self, ClientConfig};
use crate::connection::{lock, Inbound, Session, SessionSettings, Shared};
use crate::device::DeviceState;
use crate::error::{Dfr22Error, Result};
use crate::protocol::{analog_to_db, encode_command, Command};
use crate::subscription::{Event, EventReceiver};
use crate::transport::{Connector, TcpConnector};
use crate::types::{ConnectionState, DeviceAddress, DeviceId, GainValue, SocketStatus, Target};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;

/// Client for a DFR22 unit
///
/// The client keeps one TCP session to the unit, reconnects on its own when
/// the link drops and mirrors the unit's reported state. Control methods
/// return as soon as the command is queued; the unit's answer arrives later
/// as an [`Event`].
///
/// Commands issued while the link is down are dropped, not queued. While
/// connected, a short queue absorbs bursts; sends beyond it are dropped
/// until the unit reads again.
///
/// # Example
///
/// ```no_run
/// use dfr22::{Dfr22Client, Event, Target};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Dfr22Client::new();
///     client.initialize("10.0.0.5", 2202, 1)?;
///     let mut events = client.subscribe();
///     client.connect()?;
///
///     while let Ok(event) = events.recv().await {
///         if let Event::ConnectionStatus(status) = event {
///             if status.is_connected() {
///                 client.set_volume(Target::Input(1), -10.0)?;
///                 client.query_status()?;
///             }
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct Dfr22Client<C: Connector = TcpConnector> {
    connector: Arc<C>,
    shared: Arc<Mutex<Shared>>,
    inbound: Inbound,
    settings: Mutex<SessionSettings>,
}

impl Dfr22Client<TcpConnector> {
    /// Create an uninitialized client that talks plain TCP
    pub fn new() -> Self {
        Self::with_connector(TcpConnector)
    }
}

impl Default for Dfr22Client<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> Dfr22Client<C> {
    /// Create an uninitialized client using a custom connector
    pub fn with_connector(connector: C) -> Self {
        Self::build(connector, default_settings(), config::default_event_capacity())
    }

    fn build(connector: C, settings: SessionSettings, event_capacity: usize) -> Self {
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Mutex::new(Shared::new())),
            inbound: Inbound::new(event_capacity),
            settings: Mutex::new(settings),
        }
    }

    /// Create a client with a custom connector and initialize it from `config`
    pub fn from_config(connector: C, config: &ClientConfig) -> Result<Self> {
        let client = Self::build(connector, settings_from(config), config.event_capacity);
        client.initialize_with(config)?;
        Ok(client)
    }

    /// Set the unit's address with default timings
    ///
    /// Fails if the client is already initialized, the host is empty, the
    /// port is zero or the device id has more than three digits.
    pub fn initialize(&self, host: impl Into<String>, port: u16, device_id: u16) -> Result<()> {
        let device_id = DeviceId::new(device_id)?;
        self.initialize_with(&ClientConfig::new(host, port, device_id))
    }

    /// Set the unit's address and timings from a config
    pub fn initialize_with(&self, config: &ClientConfig) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.state != ConnectionState::Uninitialized {
            tracing::warn!("Ignoring initialize: client is already initialized");
            return Err(Dfr22Error::AlreadyInitialized);
        }
        let address = config.address().inspect_err(|e| {
            tracing::warn!("Client can't be initialized: {}", e);
        })?;
        *lock(&self.settings) = settings_from(config);

        tracing::info!("Client initialized for {}", address);
        shared.address = Some(address);
        shared.state = ConnectionState::Initialized;
        shared.status = SocketStatus::NoConnect;
        let _ = self.inbound.events.send(Event::InitializedStatus(true));
        Ok(())
    }

    /// Start connecting to the unit
    ///
    /// Returns immediately; progress is reported through
    /// [`Event::ConnectionStatus`]. While the link is down the client retries
    /// after the configured delay until [`disconnect`](Self::disconnect) is
    /// called. Calling this while a retry is pending triggers the retry now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        let state = shared.state;
        match state {
            ConnectionState::Uninitialized => {
                tracing::warn!("Ignoring connect: client is not initialized");
                Err(Dfr22Error::NotInitialized)
            }
            state @ (ConnectionState::Connecting | ConnectionState::Connected) => {
                tracing::debug!("Ignoring connect: already {}", state.name());
                Err(Dfr22Error::AlreadyConnected(state.name()))
            }
            ConnectionState::Disconnected if shared.session.is_some() => {
                shared.manual_disconnect = false;
                if let Some(session) = &shared.session {
                    session.wake();
                }
                Ok(())
            }
            ConnectionState::Initialized | ConnectionState::Disconnected => {
                let address = shared.address.clone().ok_or(Dfr22Error::NotInitialized)?;
                shared.manual_disconnect = false;
                shared.generation += 1;
                shared.state = ConnectionState::Connecting;

                let session = Session::new(
                    self.connector.clone(),
                    address,
                    *lock(&self.settings),
                    shared.generation,
                    self.shared.clone(),
                    self.inbound.clone(),
                );
                shared.session = Some(session.spawn());
                Ok(())
            }
        }
    }

    /// Close the link and stop reconnecting
    ///
    /// The client returns to the uninitialized state; call
    /// [`initialize`](Self::initialize) again before reconnecting. A pending
    /// reconnect timer is cancelled.
    pub fn disconnect(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.state == ConnectionState::Uninitialized {
            tracing::debug!("Ignoring disconnect: client is not initialized");
            return Err(Dfr22Error::NotInitialized);
        }
        shared.manual_disconnect = true;
        shared.generation += 1;
        shared.state = ConnectionState::Uninitialized;
        shared.outbound = None;
        if let Some(address) = shared.address.take() {
            tracing::info!("Disconnecting from {}", address);
        }

        let _ = self.inbound.events.send(Event::InitializedStatus(false));
        if let Some(session) = shared.session.take() {
            session.stop();
            shared.report(&self.inbound.events, SocketStatus::BrokenLocally);
        }
        Ok(())
    }

    /// Current lifecycle state
    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Last socket status reported through [`Event::ConnectionStatus`]
    ///
    /// `NoConnect` until the first connect attempt.
    pub fn socket_status(&self) -> SocketStatus {
        lock(&self.shared).status
    }

    /// Address the client was initialized with
    pub fn address(&self) -> Option<DeviceAddress> {
        lock(&self.shared).address.clone()
    }

    /// Snapshot of the last known device state
    pub fn device_state(&self) -> DeviceState {
        lock(&self.inbound.device).clone()
    }

    /// Inbound frames discarded as malformed since the client was created
    pub fn dropped_frames(&self) -> u64 {
        self.inbound.dropped_frames.load(Ordering::Relaxed)
    }

    /// Subscribe to events
    ///
    /// Multiple subscriptions can be active simultaneously; each sees every
    /// event published after it subscribed.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.inbound.events.subscribe())
    }

    // ========== Level Control ==========

    /// Set the gain of a channel, mix point or fader in dB
    ///
    /// Values outside [-107.5, 10] dB are clamped.
    pub fn set_volume(&self, target: Target, db: GainValue) -> Result<()> {
        self.send_command(&Command::SetLevel { target, db })
    }

    /// Set a channel gain from a 16-bit analog level, channels numbered 1..=4
    pub fn set_volume_analog(&self, channel: u16, value: u16) -> Result<()> {
        self.set_volume(Target::from_channel_number(channel)?, analog_to_db(value))
    }

    /// Set the gain of the mix point routing `input` to `output`
    pub fn set_mix_point_volume(&self, input: u8, output: u8, db: GainValue) -> Result<()> {
        self.set_volume(Target::MixPoint { input, output }, db)
    }

    /// Set the gain of a mix point from a 16-bit analog level
    pub fn set_mix_point_volume_analog(&self, input: u8, output: u8, value: u16) -> Result<()> {
        self.set_mix_point_volume(input, output, analog_to_db(value))
    }

    /// Raise a gain by one device step
    pub fn volume_up(&self, target: Target) -> Result<()> {
        self.send_command(&Command::StepUp(target))
    }

    /// Lower a gain by one device step
    pub fn volume_down(&self, target: Target) -> Result<()> {
        self.send_command(&Command::StepDown(target))
    }

    // ========== Mute Control ==========

    /// Set the mute state of an input or output channel
    pub fn set_mute(&self, target: Target, muted: bool) -> Result<()> {
        self.send_command(&Command::SetMute { target, muted })
    }

    /// Toggle the mute state of an input or output channel
    pub fn toggle_mute(&self, target: Target) -> Result<()> {
        self.send_command(&Command::ToggleMute(target))
    }

    // ========== Routing ==========

    /// Enable or disable the mix point routing `input` to `output`
    pub fn set_mix_point(&self, input: u8, output: u8, enabled: bool) -> Result<()> {
        self.send_command(&Command::SetRouting {
            input,
            output,
            enabled,
        })
    }

    /// Ask the unit to report all of its current values
    pub fn query_status(&self) -> Result<()> {
        self.send_command(&Command::QueryStatus)
    }

    // ========== Raw Access ==========

    /// Send a string to the unit as-is, without framing
    pub fn send_raw(&self, data: &str) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.send_bytes(data.as_bytes().to_vec())
    }

    /// Feed a status line to the parser as if the unit had sent it
    ///
    /// Returns whether the line changed any tracked value.
    pub fn inject_response(&self, line: &str) -> bool {
        !line.is_empty() && self.inbound.dispatch(line)
    }

    /// Encode `command` for this unit and send it
    pub fn send_command(&self, command: &Command) -> Result<()> {
        let device_id = lock(&self.shared)
            .address
            .as_ref()
            .map(|a| a.device_id)
            .ok_or(Dfr22Error::NotInitialized)?;
        let frame = encode_command(device_id, command).inspect_err(|e| {
            tracing::warn!("Not sending {:?}: {}", command, e);
        })?;
        self.send_bytes(frame)
    }

    fn send_bytes(&self, bytes: Vec<u8>) -> Result<()> {
        let shared = lock(&self.shared);
        match (&shared.outbound, shared.state) {
            (Some(outbound), ConnectionState::Connected) => match outbound.try_send(bytes) {
                Ok(()) => {}
                Err(TrySendError::Full(bytes)) => {
                    tracing::warn!("Dropping {} bytes: unit is not reading", bytes.len());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Dropping send: link has closed");
                }
            },
            (_, state) => {
                tracing::debug!(
                    "Dropping {:?}: client is {}",
                    String::from_utf8_lossy(&bytes),
                    state.name()
                );
            }
        }
        Ok(())
    }
}

impl<C: Connector> Drop for Dfr22Client<C> {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.outbound = None;
        if let Some(session) = shared.session.take() {
            session.stop();
        }
    }
}

fn default_settings() -> SessionSettings {
    SessionSettings {
        reconnect_delay: Duration::from_millis(config::default_reconnect_delay_ms()),
        connect_timeout: Duration::from_millis(config::default_connect_timeout_ms()),
        read_buffer_size: config::default_read_buffer_size(),
    }
}

fn settings_from(config: &ClientConfig) -> SessionSettings {
    SessionSettings {
        reconnect_delay: config.reconnect_delay(),
        connect_timeout: config.connect_timeout(),
        read_buffer_size: config.read_buffer_size(),
    }
}
