//! Status line parser
//!
//! The unit reports changes as lines like `DFR22001INP001L00<unit>`,
//! `OUT002M001` or `MIX002001C000`: a key naming the stage, a family
//! opcode (`L00` level, `M00` mute, `C00` routing) and a value. Families are
//! tried in that order and the first family whose opcode occurs in the line
//! decides how it is read, even if the key before it turns out unknown.

use crate::protocol::device_unit_to_db;
use crate::types::{GainValue, Target};

/// Decoded change reported by the unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusUpdate {
    /// A gain stage has a new level
    Level { target: Target, db: GainValue },
    /// An input or output channel changed mute state
    Mute { target: Target, muted: bool },
    /// A mix point was switched on or off
    Routing { input: u8, output: u8, enabled: bool },
}

/// Opcode families in match priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Level,
    Mute,
    Routing,
}

impl Family {
    const PRIORITY: [Family; 3] = [Family::Level, Family::Mute, Family::Routing];

    fn opcode(&self) -> &'static str {
        match self {
            Family::Level => "L00",
            Family::Mute => "M00",
            Family::Routing => "C00",
        }
    }

    fn keys(&self) -> &'static [(&'static str, Target)] {
        match self {
            Family::Level => &LEVEL_KEYS,
            Family::Mute => &CHANNEL_KEYS,
            Family::Routing => &MIX_KEYS,
        }
    }
}

const CHANNEL_KEYS: [(&str, Target); 4] = [
    ("INP001", Target::Input(1)),
    ("INP002", Target::Input(2)),
    ("OUT001", Target::Output(1)),
    ("OUT002", Target::Output(2)),
];

const MIX_KEYS: [(&str, Target); 4] = [
    ("MIX001001", Target::MixPoint { input: 1, output: 1 }),
    ("MIX001002", Target::MixPoint { input: 1, output: 2 }),
    ("MIX002001", Target::MixPoint { input: 2, output: 1 }),
    ("MIX002002", Target::MixPoint { input: 2, output: 2 }),
];

const LEVEL_KEYS: [(&str, Target); 10] = [
    CHANNEL_KEYS[0],
    CHANNEL_KEYS[1],
    CHANNEL_KEYS[2],
    CHANNEL_KEYS[3],
    MIX_KEYS[0],
    MIX_KEYS[1],
    MIX_KEYS[2],
    MIX_KEYS[3],
    ("MIX001OUT", Target::Fader(1)),
    ("MIX002OUT", Target::Fader(2)),
];

/// A line split into key, family and the text after the opcode
#[derive(Debug, PartialEq)]
struct Tokens<'a> {
    family: Family,
    target: Option<Target>,
    value: &'a str,
}

fn tokenize(line: &str) -> Option<Tokens<'_>> {
    let (family, at) = Family::PRIORITY
        .iter()
        .find_map(|family| line.find(family.opcode()).map(|at| (*family, at)))?;

    let head = &line[..at];
    let target = family
        .keys()
        .iter()
        .find(|(key, _)| head.ends_with(key))
        .map(|(_, target)| *target);

    Some(Tokens {
        family,
        target,
        value: &line[at + family.opcode().len()..],
    })
}

/// Parse one frame payload, returning `None` for anything not tracked
pub fn parse_response(line: &str) -> Option<StatusUpdate> {
    let tokens = tokenize(line)?;
    let Some(target) = tokens.target else {
        tracing::trace!("No known key before {:?} in {:?}", tokens.family, line);
        return None;
    };
    let value = tokens.value.chars().next()?;

    match tokens.family {
        Family::Level => {
            // level values are one raw device-unit byte
            let unit = u8::try_from(u32::from(value)).ok()?;
            Some(StatusUpdate::Level {
                target,
                db: device_unit_to_db(unit),
            })
        }
        Family::Mute => Some(StatusUpdate::Mute {
            target,
            muted: flag(value)?,
        }),
        Family::Routing => match target {
            Target::MixPoint { input, output } => Some(StatusUpdate::Routing {
                input,
                output,
                enabled: flag(value)?,
            }),
            _ => None,
        },
    }
}

fn flag(value: char) -> Option<bool> {
    match value {
        '1' => Some(true),
        '0' => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_line(key: &str, unit: u8) -> String {
        let mut line = format!("{key}L00");
        line.push(char::from(unit));
        line
    }

    #[test]
    fn test_level_for_every_key() {
        for (key, target) in LEVEL_KEYS {
            assert_eq!(
                parse_response(&level_line(key, 27)),
                Some(StatusUpdate::Level { target, db: -40.0 }),
                "{key}"
            );
        }
    }

    #[test]
    fn test_level_with_address_prefix() {
        assert_eq!(
            parse_response(&level_line("DFR22001OUT002", 127)),
            Some(StatusUpdate::Level {
                target: Target::Output(2),
                db: 10.0
            })
        );
    }

    #[test]
    fn test_truncated_level_is_ignored() {
        assert_eq!(parse_response("INP001L00"), None);
    }

    #[test]
    fn test_mute_lines() {
        assert_eq!(
            parse_response("OUT002M001"),
            Some(StatusUpdate::Mute {
                target: Target::Output(2),
                muted: true
            })
        );
        assert_eq!(
            parse_response("DFR22001INP001M000"),
            Some(StatusUpdate::Mute {
                target: Target::Input(1),
                muted: false
            })
        );
        // toggle echo carries no state
        assert_eq!(parse_response("INP001M002"), None);
    }

    #[test]
    fn test_routing_lines() {
        assert_eq!(
            parse_response("MIX002001C000"),
            Some(StatusUpdate::Routing {
                input: 2,
                output: 1,
                enabled: false
            })
        );
        assert_eq!(
            parse_response("DFR22001MIX001002C001"),
            Some(StatusUpdate::Routing {
                input: 1,
                output: 2,
                enabled: true
            })
        );
        assert_eq!(parse_response("INP001C001"), None);
    }

    #[test]
    fn test_level_family_wins_over_mute() {
        let line = format!("{}OUT002M001", level_line("INP002", 87));
        assert_eq!(
            parse_response(&line),
            Some(StatusUpdate::Level {
                target: Target::Input(2),
                db: -10.0
            })
        );
    }

    #[test]
    fn test_first_matching_family_decides_even_without_key() {
        // L00 is present but not preceded by a key, so the mute part is not consulted
        assert_eq!(parse_response("XYZL00AOUT001M001"), None);
    }

    #[test]
    fn test_unrecognized_lines() {
        assert_eq!(parse_response(""), None);
        assert_eq!(parse_response("DFR22001QRY"), None);
        assert_eq!(parse_response("VER 1.2"), None);
    }

    #[test]
    fn test_tokenize_splits_key_and_value() {
        let tokens = tokenize("DFR22001MIX001OUTL00Z").unwrap();
        assert_eq!(tokens.family, Family::Level);
        assert_eq!(tokens.target, Some(Target::Fader(1)));
        assert_eq!(tokens.value, "Z");
    }
}
