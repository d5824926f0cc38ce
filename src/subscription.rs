use crate::device::{FaderSnapshot, MixPointSnapshot, MuteSnapshot, VolumeSnapshot};
use crate::error::{Dfr22Error, Result};
use crate::types::SocketStatus;
use tokio::sync::broadcast;

/// Notification from the client
///
/// State events carry the full current snapshot of their category, not
/// only the field that changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An input, output or mix-point gain changed
    VolumeChanged(VolumeSnapshot),

    /// An input or output mute flag changed
    MuteChanged(MuteSnapshot),

    /// A pre-mix fader changed
    FaderChanged(FaderSnapshot),

    /// A mix point was switched on or off
    MixPointChanged(MixPointSnapshot),

    /// The socket reported a new status
    ConnectionStatus(SocketStatus),

    /// The client became initialized (`true`) or was torn down (`false`)
    InitializedStatus(bool),
}

/// Receiver for client events
pub struct EventReceiver {
    rx: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Create a new event receiver
    pub(crate) fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Returns `ConnectionClosed` once the client has been dropped.
    pub async fn recv(&mut self) -> Result<Event> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => Dfr22Error::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                Dfr22Error::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<Event>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(Dfr22Error::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(Dfr22Error::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
