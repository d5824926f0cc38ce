use crate::error::{Dfr22Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gain value in decibels
pub type GainValue = f64;

/// Mute state
pub type MuteState = bool;

/// Lowest gain the unit reports (the mute floor)
pub const MIN_DB: GainValue = -107.5;

/// Highest gain the unit accepts
pub const MAX_DB: GainValue = 10.0;

/// Unit address tag embedded in every frame
///
/// The wire carries it as a zero-padded three-digit decimal, so only
/// 0 through 999 are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct DeviceId(u16);

impl DeviceId {
    /// Create a device id, rejecting values that need more than three digits
    pub fn new(id: u16) -> Result<Self> {
        if id > 999 {
            return Err(Dfr22Error::InvalidDeviceId(id));
        }
        Ok(Self(id))
    }

    /// Numeric value of the id
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Wire form of the id, e.g. `001`
    pub fn tag(&self) -> String {
        format!("{:03}", self.0)
    }
}

impl TryFrom<u16> for DeviceId {
    type Error = Dfr22Error;

    fn try_from(id: u16) -> Result<Self> {
        Self::new(id)
    }
}

impl From<DeviceId> for u16 {
    fn from(id: DeviceId) -> u16 {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Network location and id of a unit, fixed once the client is initialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
    pub device_id: DeviceId,
}

impl DeviceAddress {
    /// Validate and build an address
    pub fn new(host: impl Into<String>, port: u16, device_id: DeviceId) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Dfr22Error::InvalidConfig("host must not be empty".to_string()));
        }
        if port == 0 {
            return Err(Dfr22Error::InvalidConfig("port must be positive".to_string()));
        }
        Ok(Self {
            host,
            port,
            device_id,
        })
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (id {})", self.host, self.port, self.device_id)
    }
}

/// Lifecycle of the client's link to the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Uninitialized,
    Initialized,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Initialized => "initialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Socket status reported with every connection-status event
///
/// The numeric codes are the ones host control surfaces key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketStatus {
    NoConnect,
    Waiting,
    Connected,
    ConnectFailed,
    BrokenRemotely,
    BrokenLocally,
    DnsLookup,
    DnsFailed,
    DnsResolved,
    LinkLost,
    SocketNotExist,
}

impl SocketStatus {
    /// Fixed numeric code of the status
    pub fn code(&self) -> u16 {
        match self {
            SocketStatus::NoConnect => 0,
            SocketStatus::Waiting => 1,
            SocketStatus::Connected => 2,
            SocketStatus::ConnectFailed => 3,
            SocketStatus::BrokenRemotely => 4,
            SocketStatus::BrokenLocally => 5,
            SocketStatus::DnsLookup => 6,
            SocketStatus::DnsFailed => 7,
            SocketStatus::DnsResolved => 8,
            SocketStatus::LinkLost => 9,
            SocketStatus::SocketNotExist => 10,
        }
    }

    /// Whether the status means the link is up
    pub fn is_connected(&self) -> bool {
        matches!(self, SocketStatus::Connected)
    }

    /// Classify an I/O error from an established link
    pub(crate) fn from_io_error(error: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => SocketStatus::BrokenRemotely,
            ErrorKind::NotConnected => SocketStatus::SocketNotExist,
            _ => SocketStatus::LinkLost,
        }
    }
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketStatus::NoConnect => "SOCKET_STATUS_NO_CONNECT",
            SocketStatus::Waiting => "SOCKET_STATUS_WAITING",
            SocketStatus::Connected => "SOCKET_STATUS_CONNECTED",
            SocketStatus::ConnectFailed => "SOCKET_STATUS_CONNECT_FAILED",
            SocketStatus::BrokenRemotely => "SOCKET_STATUS_BROKEN_REMOTELY",
            SocketStatus::BrokenLocally => "SOCKET_STATUS_BROKEN_LOCALLY",
            SocketStatus::DnsLookup => "SOCKET_STATUS_DNS_LOOKUP",
            SocketStatus::DnsFailed => "SOCKET_STATUS_DNS_FAILED",
            SocketStatus::DnsResolved => "SOCKET_STATUS_DNS_RESOLVED",
            SocketStatus::LinkLost => "SOCKET_STATUS_LINK_LOST",
            SocketStatus::SocketNotExist => "SOCKET_STATUS_SOCKET_NOT_EXIST",
        };
        f.write_str(name)
    }
}

/// A gain stage or routing cell on the unit
///
/// Indices are 1-based and the DFR22 has two of everything, so valid
/// indices are 1 and 2. Out-of-range values are accepted here and
/// rejected when the target is turned into a wire token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Input channel gain
    Input(u8),
    /// Output channel gain
    Output(u8),
    /// Mix-point gain from an input to an output
    MixPoint { input: u8, output: u8 },
    /// Pre-mix fader for an input channel
    Fader(u8),
}

impl Target {
    /// Map the host surface's channel numbering to a target
    ///
    /// Channels 1 and 2 are the inputs, 3 and 4 the outputs.
    pub fn from_channel_number(channel: u16) -> Result<Self> {
        match channel {
            1 => Ok(Target::Input(1)),
            2 => Ok(Target::Input(2)),
            3 => Ok(Target::Output(1)),
            4 => Ok(Target::Output(2)),
            other => Err(Dfr22Error::InvalidTarget(format!("channel {other}"))),
        }
    }

    /// Key token addressing this target, e.g. `INP001` or `MIX002OUT`
    pub fn key(&self) -> Result<String> {
        match *self {
            Target::Input(n) => Ok(format!("INP{:03}", checked_index(self, n)?)),
            Target::Output(n) => Ok(format!("OUT{:03}", checked_index(self, n)?)),
            Target::MixPoint { input, output } => Ok(format!(
                "MIX{:03}{:03}",
                checked_index(self, input)?,
                checked_index(self, output)?
            )),
            Target::Fader(n) => Ok(format!("MIX{:03}OUT", checked_index(self, n)?)),
        }
    }

    /// Whether the target is an input or output channel
    pub fn is_channel(&self) -> bool {
        matches!(self, Target::Input(_) | Target::Output(_))
    }
}

fn checked_index(target: &Target, index: u8) -> Result<u8> {
    if (1..=2).contains(&index) {
        Ok(index)
    } else {
        Err(Dfr22Error::InvalidTarget(target.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Input(n) => write!(f, "input {n}"),
            Target::Output(n) => write!(f, "output {n}"),
            Target::MixPoint { input, output } => write!(f, "mix point {input}->{output}"),
            Target::Fader(n) => write!(f, "pre-mix fader {n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_tag_is_zero_padded() {
        assert_eq!(DeviceId::new(1).unwrap().tag(), "001");
        assert_eq!(DeviceId::new(42).unwrap().tag(), "042");
        assert_eq!(DeviceId::new(999).unwrap().to_string(), "999");
        assert!(matches!(DeviceId::new(1000), Err(Dfr22Error::InvalidDeviceId(1000))));
    }

    #[test]
    fn test_address_requires_host_and_port() {
        let id = DeviceId::new(1).unwrap();
        assert!(DeviceAddress::new("10.0.0.5", 2202, id).is_ok());
        assert!(matches!(DeviceAddress::new("", 2202, id), Err(Dfr22Error::InvalidConfig(_))));
        assert!(matches!(DeviceAddress::new("10.0.0.5", 0, id), Err(Dfr22Error::InvalidConfig(_))));
    }

    #[test]
    fn test_target_keys() {
        assert_eq!(Target::Input(1).key().unwrap(), "INP001");
        assert_eq!(Target::Output(2).key().unwrap(), "OUT002");
        assert_eq!(Target::MixPoint { input: 2, output: 1 }.key().unwrap(), "MIX002001");
        assert_eq!(Target::Fader(1).key().unwrap(), "MIX001OUT");
    }

    #[test]
    fn test_target_rejects_out_of_range_indices() {
        assert!(Target::Input(0).key().is_err());
        assert!(Target::Output(3).key().is_err());
        assert!(Target::MixPoint { input: 1, output: 3 }.key().is_err());
        assert!(Target::Fader(0).key().is_err());
    }

    #[test]
    fn test_channel_numbering() {
        assert_eq!(Target::from_channel_number(1).unwrap(), Target::Input(1));
        assert_eq!(Target::from_channel_number(4).unwrap(), Target::Output(2));
        assert!(Target::from_channel_number(0).is_err());
        assert!(Target::from_channel_number(5).is_err());
    }

    #[test]
    fn test_socket_status_codes() {
        assert_eq!(SocketStatus::NoConnect.code(), 0);
        assert_eq!(SocketStatus::Connected.code(), 2);
        assert_eq!(SocketStatus::SocketNotExist.code(), 10);
        assert_eq!(SocketStatus::BrokenRemotely.to_string(), "SOCKET_STATUS_BROKEN_REMOTELY");
    }
}
