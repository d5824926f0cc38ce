//! DFR22 wire codec
//!
//! Outbound frames look like `0xD0 "DFR22" <id> <token path> 0xD1 CR LF`.
//! Gains travel as a single device-unit byte following a two-segment
//! piecewise linear scale: 2.5 dB per unit below -40 dB and 0.5 dB per unit
//! from -40 dB up to +10 dB.

use crate::error::{Dfr22Error, Result};
use crate::types::{DeviceId, GainValue, Target, MAX_DB, MIN_DB};

/// Frame start marker
pub const START_MARKER: u8 = 0xD0;

/// Frame end marker
pub const END_MARKER: u8 = 0xD1;

/// Line terminator appended to outbound frames
pub const LINE_TERMINATOR: [u8; 2] = [0x0D, 0x0A];

/// Product prefix of every outbound payload
pub const PAYLOAD_PREFIX: &str = "DFR22";

/// Device unit at which the upper (0.5 dB) segment starts
pub const SEGMENT_BOUNDARY_UNIT: u8 = 27;

/// Highest device unit, reached at +10 dB
pub const MAX_DEVICE_UNIT: u8 = 127;

/// Full scale of the 16-bit analog level used by host control surfaces
const ANALOG_FULL_SCALE: f64 = 65535.0;

/// Width of the gain range in dB
const DB_SPAN: f64 = MAX_DB - MIN_DB;

/// A request to the unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Set an absolute gain in dB
    SetLevel { target: Target, db: GainValue },
    /// Raise a gain by one device step
    StepUp(Target),
    /// Lower a gain by one device step
    StepDown(Target),
    /// Set the mute flag of an input or output channel
    SetMute { target: Target, muted: bool },
    /// Flip the mute flag of an input or output channel
    ToggleMute(Target),
    /// Enable or disable routing through a mix point
    SetRouting { input: u8, output: u8, enabled: bool },
    /// Ask the unit to report its current status
    QueryStatus,
}

impl Command {
    /// Token path of the command, i.e. the payload after the address prefix
    ///
    /// Level values are carried as a raw device-unit byte, so the path is
    /// bytes rather than text.
    pub fn token_path(&self) -> Result<Vec<u8>> {
        let path = match *self {
            Command::SetLevel { target, db } => {
                let mut path = format!("{}L00", target.key()?).into_bytes();
                path.push(db_to_device_unit(db));
                path
            }
            Command::StepUp(target) => format!("{}I001", target.key()?).into_bytes(),
            Command::StepDown(target) => format!("{}D001", target.key()?).into_bytes(),
            Command::SetMute { target, muted } => {
                let key = channel_key(target, "mute")?;
                format!("{}M00{}", key, u8::from(muted)).into_bytes()
            }
            Command::ToggleMute(target) => {
                let key = channel_key(target, "mute toggle")?;
                format!("{key}M002").into_bytes()
            }
            Command::SetRouting {
                input,
                output,
                enabled,
            } => {
                let key = Target::MixPoint { input, output }.key()?;
                format!("{}C00{}", key, u8::from(enabled)).into_bytes()
            }
            Command::QueryStatus => b"QRY".to_vec(),
        };
        Ok(path)
    }
}

fn channel_key(target: Target, operation: &'static str) -> Result<String> {
    if !target.is_channel() {
        return Err(Dfr22Error::UnsupportedOperation {
            operation,
            target: target.to_string(),
        });
    }
    target.key()
}

/// Encode a command addressed to `device_id` as a complete outbound frame
pub fn encode_command(device_id: DeviceId, command: &Command) -> Result<Vec<u8>> {
    let mut payload = format!("{}{}", PAYLOAD_PREFIX, device_id.tag()).into_bytes();
    payload.extend_from_slice(&command.token_path()?);
    Ok(encode_frame(&payload))
}

/// Wrap a payload in start/end markers and the line terminator
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(START_MARKER);
    frame.extend_from_slice(payload);
    frame.push(END_MARKER);
    frame.extend_from_slice(&LINE_TERMINATOR);
    frame
}

/// Convert a gain in dB to the unit's device-unit scale
///
/// Input outside [-107.5, 10] is clamped to the nearest boundary.
pub fn db_to_device_unit(db: GainValue) -> u8 {
    let db = if db.is_nan() { MIN_DB } else { db.clamp(MIN_DB, MAX_DB) };
    let unit = if db < -40.0 {
        (db + 105.0) / 2.5 + 1.0
    } else {
        (db + 40.0) / 0.5 + f64::from(SEGMENT_BOUNDARY_UNIT)
    };
    unit.round().clamp(0.0, f64::from(MAX_DEVICE_UNIT)) as u8
}

/// Convert a device unit back to dB
///
/// Units past the top of the scale saturate at +10 dB.
pub fn device_unit_to_db(unit: u8) -> GainValue {
    let db = match unit {
        0 => MIN_DB,
        1..=26 => 2.5 * f64::from(unit) - 107.5,
        _ => 0.5 * f64::from(unit) - 53.5,
    };
    db.min(MAX_DB)
}

/// Convert a 16-bit analog level to dB
pub fn analog_to_db(value: u16) -> GainValue {
    f64::from(value) * DB_SPAN / ANALOG_FULL_SCALE + MIN_DB
}

/// Convert dB to a 16-bit analog level
pub fn db_to_analog(db: GainValue) -> u16 {
    let scaled = (db.clamp(MIN_DB, MAX_DB) - MIN_DB) * ANALOG_FULL_SCALE / DB_SPAN;
    scaled.round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u16) -> DeviceId {
        DeviceId::new(n).unwrap()
    }

    #[test]
    fn test_unit_round_trip_over_whole_scale() {
        for unit in 0..=MAX_DEVICE_UNIT {
            assert_eq!(db_to_device_unit(device_unit_to_db(unit)), unit, "unit {unit}");
        }
    }

    #[test]
    fn test_segment_boundary() {
        assert_eq!(device_unit_to_db(26), -42.5);
        assert_eq!(device_unit_to_db(27), -40.0);
        assert_eq!(db_to_device_unit(-42.5), 26);
        assert_eq!(db_to_device_unit(-40.0), 27);
    }

    #[test]
    fn test_mute_floor() {
        assert_eq!(device_unit_to_db(0), -107.5);
        assert_eq!(db_to_device_unit(-107.5), 0);
    }

    #[test]
    fn test_out_of_range_db_is_clamped() {
        assert_eq!(db_to_device_unit(10.0), 127);
        assert_eq!(db_to_device_unit(25.0), 127);
        assert_eq!(db_to_device_unit(-300.0), 0);
        assert_eq!(db_to_device_unit(f64::NAN), 0);
        assert_eq!(device_unit_to_db(200), MAX_DB);
    }

    #[test]
    fn test_rounds_to_nearest_unit() {
        // -10 dB is exactly unit 87; -9.8 dB sits 0.4 units above it
        assert_eq!(db_to_device_unit(-10.0), 87);
        assert_eq!(db_to_device_unit(-9.8), 87);
        assert_eq!(db_to_device_unit(-9.7), 88);
    }

    #[test]
    fn test_encode_set_level() {
        let frame = encode_command(
            id(1),
            &Command::SetLevel {
                target: Target::Input(1),
                db: -10.0,
            },
        )
        .unwrap();

        let mut expected = vec![START_MARKER];
        expected.extend_from_slice(b"DFR22001INP001L00");
        expected.push(db_to_device_unit(-10.0));
        expected.extend_from_slice(&[END_MARKER, 0x0D, 0x0A]);
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_token_paths() {
        let path = |c: Command| String::from_utf8(c.token_path().unwrap()).unwrap();

        assert_eq!(path(Command::StepUp(Target::Output(2))), "OUT002I001");
        assert_eq!(path(Command::StepDown(Target::Fader(1))), "MIX001OUTD001");
        assert_eq!(
            path(Command::StepUp(Target::MixPoint { input: 2, output: 2 })),
            "MIX002002I001"
        );
        assert_eq!(
            path(Command::SetMute {
                target: Target::Input(2),
                muted: true
            }),
            "INP002M001"
        );
        assert_eq!(path(Command::ToggleMute(Target::Output(1))), "OUT001M002");
        assert_eq!(
            path(Command::SetRouting {
                input: 1,
                output: 2,
                enabled: true
            }),
            "MIX001002C001"
        );
        assert_eq!(path(Command::QueryStatus), "QRY");
    }

    #[test]
    fn test_invalid_targets_yield_no_command() {
        let bad_channel = Command::SetLevel {
            target: Target::Input(3),
            db: 0.0,
        };
        assert!(matches!(
            encode_command(id(1), &bad_channel),
            Err(Dfr22Error::InvalidTarget(_))
        ));

        let bad_routing = Command::SetRouting {
            input: 0,
            output: 1,
            enabled: true,
        };
        assert!(bad_routing.token_path().is_err());

        let mute_fader = Command::SetMute {
            target: Target::Fader(1),
            muted: true,
        };
        assert!(matches!(
            mute_fader.token_path(),
            Err(Dfr22Error::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_analog_scaling() {
        assert_eq!(db_to_analog(MIN_DB), 0);
        assert_eq!(db_to_analog(MAX_DB), 65535);
        assert_eq!(analog_to_db(0), MIN_DB);
        assert_eq!(analog_to_db(65535), MAX_DB);
        assert_eq!(db_to_analog(analog_to_db(32768)), 32768);
    }
}
