//! Rust library for controlling Shure DFR22 audio processors
//!
//! This library keeps a persistent TCP session to a DFR22 unit and maps its
//! framed ASCII control protocol onto typed values. It supports:
//!
//! - Input, output, mix-point and pre-mix fader gain (absolute and stepped)
//! - Input and output mute (set and toggle)
//! - Mix-point routing
//! - Status queries and raw passthrough
//! - Automatic reconnect with a fixed delay
//! - Change notifications grouped by category
//!
//! # Quick Start
//!
//! ```no_run
//! use dfr22::{Dfr22Client, Event, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Dfr22Client::new();
//!     client.initialize("10.0.0.5", 2202, 1)?;
//!
//!     let mut events = client.subscribe();
//!     client.connect()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             Event::ConnectionStatus(status) if status.is_connected() => {
//!                 client.set_volume(Target::Input(1), -10.0)?;
//!                 client.set_mute(Target::Output(2), false)?;
//!                 client.query_status()?;
//!             }
//!             Event::VolumeChanged(volume) => println!("Input 1 is {} dB", volume.input_1),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Client**: lifecycle (initialize, connect, disconnect) and control API
//! - **Connection**: session task running connect, receive and reconnect, plus a writer task per link
//! - **Transport**: pluggable connector, plain TCP by default
//! - **Framing**: reassembles `0xD0 ... 0xD1` frames from the byte stream
//! - **Parser**: turns status lines into typed updates
//! - **Protocol**: command encoding and dB / device-unit conversion
//! - **Device**: last known state and per-category snapshots

mod client;
mod config;
mod connection;
mod device;
mod error;
mod framing;
mod parser;
mod protocol;
mod subscription;
mod transport;
mod types;

// Public exports
pub use client::Dfr22Client;
pub use config::{ClientConfig, DEFAULT_PORT};
pub use device::{DeviceState, FaderSnapshot, MixPointSnapshot, MuteSnapshot, VolumeSnapshot};
pub use error::{Dfr22Error, Result};
pub use framing::{FrameDecoder, FrameReassembler, MAX_PAYLOAD_LEN};
pub use parser::{parse_response, StatusUpdate};
pub use protocol::{
    analog_to_db, db_to_analog, db_to_device_unit, device_unit_to_db, encode_command,
    encode_frame, Command, END_MARKER, LINE_TERMINATOR, START_MARKER,
};
pub use subscription::{Event, EventReceiver};
pub use transport::{Connector, TcpConnector};
pub use types::{
    ConnectionState, DeviceAddress, DeviceId, GainValue, MuteState, SocketStatus, Target, MAX_DB,
    MIN_DB,
};
