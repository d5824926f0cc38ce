use crate::parser::StatusUpdate;
use crate::protocol::db_to_analog;
use crate::subscription::Event;
use crate::types::{GainValue, MuteState, Target};
use serde::{Deserialize, Serialize};

/// Last known state of the unit's gain stages and switches
///
/// Fields start at 0 dB / off and are overwritten one at a time as the unit
/// reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub volume: VolumeSnapshot,
    pub mute: MuteSnapshot,
    pub fader: FaderSnapshot,
    pub mix_point: MixPointSnapshot,
}

/// Channel and mix-point gains in dB
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub input_1: GainValue,
    pub input_2: GainValue,
    pub output_1: GainValue,
    pub output_2: GainValue,
    pub mix_1_1: GainValue,
    pub mix_1_2: GainValue,
    pub mix_2_1: GainValue,
    pub mix_2_2: GainValue,
}

impl VolumeSnapshot {
    /// All eight gains in event order: inputs, outputs, then mix 1-1, 1-2, 2-1, 2-2
    pub fn values(&self) -> [GainValue; 8] {
        [
            self.input_1,
            self.input_2,
            self.output_1,
            self.output_2,
            self.mix_1_1,
            self.mix_1_2,
            self.mix_2_1,
            self.mix_2_2,
        ]
    }

    /// Gains as 16-bit analog levels
    pub fn analog(&self) -> [u16; 8] {
        self.values().map(db_to_analog)
    }
}

/// Input and output mute flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteSnapshot {
    pub input_1: MuteState,
    pub input_2: MuteState,
    pub output_1: MuteState,
    pub output_2: MuteState,
}

/// Pre-mix fader gains in dB
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaderSnapshot {
    pub channel_1: GainValue,
    pub channel_2: GainValue,
}

impl FaderSnapshot {
    /// Faders as 16-bit analog levels
    pub fn analog(&self) -> [u16; 2] {
        [db_to_analog(self.channel_1), db_to_analog(self.channel_2)]
    }
}

/// Routing-enabled flags per input/output pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixPointSnapshot {
    pub in_1_to_out_1: bool,
    pub in_1_to_out_2: bool,
    pub in_2_to_out_1: bool,
    pub in_2_to_out_2: bool,
}

impl MixPointSnapshot {
    /// Routing state of one mix point, `None` for indices outside 1..=2
    pub fn get(&self, input: u8, output: u8) -> Option<bool> {
        match (input, output) {
            (1, 1) => Some(self.in_1_to_out_1),
            (1, 2) => Some(self.in_1_to_out_2),
            (2, 1) => Some(self.in_2_to_out_1),
            (2, 2) => Some(self.in_2_to_out_2),
            _ => None,
        }
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded update and return the change event for its category
    ///
    /// The event carries the whole category so subscribers always see a
    /// consistent set of values. Updates naming a stage the unit does not
    /// have leave the state untouched and return `None`.
    pub fn apply(&mut self, update: StatusUpdate) -> Option<Event> {
        match update {
            StatusUpdate::Level { target, db } => {
                if let Target::Fader(n) = target {
                    *self.fader_slot(n)? = db;
                    tracing::debug!("Pre-mix fader {} from unit is {} dB", n, db);
                    return Some(Event::FaderChanged(self.fader));
                }
                *self.volume_slot(target)? = db;
                tracing::debug!("{} from unit is {} dB", target, db);
                Some(Event::VolumeChanged(self.volume))
            }
            StatusUpdate::Mute { target, muted } => {
                *self.mute_slot(target)? = muted;
                tracing::debug!("Mute state changed: {:?}", self.mute);
                Some(Event::MuteChanged(self.mute))
            }
            StatusUpdate::Routing {
                input,
                output,
                enabled,
            } => {
                *self.routing_slot(input, output)? = enabled;
                tracing::debug!("Mix point state changed: {:?}", self.mix_point);
                Some(Event::MixPointChanged(self.mix_point))
            }
        }
    }

    fn volume_slot(&mut self, target: Target) -> Option<&mut GainValue> {
        let v = &mut self.volume;
        match target {
            Target::Input(1) => Some(&mut v.input_1),
            Target::Input(2) => Some(&mut v.input_2),
            Target::Output(1) => Some(&mut v.output_1),
            Target::Output(2) => Some(&mut v.output_2),
            Target::MixPoint { input, output } => match (input, output) {
                (1, 1) => Some(&mut v.mix_1_1),
                (1, 2) => Some(&mut v.mix_1_2),
                (2, 1) => Some(&mut v.mix_2_1),
                (2, 2) => Some(&mut v.mix_2_2),
                _ => None,
            },
            _ => None,
        }
    }

    fn fader_slot(&mut self, channel: u8) -> Option<&mut GainValue> {
        match channel {
            1 => Some(&mut self.fader.channel_1),
            2 => Some(&mut self.fader.channel_2),
            _ => None,
        }
    }

    fn mute_slot(&mut self, target: Target) -> Option<&mut MuteState> {
        let m = &mut self.mute;
        match target {
            Target::Input(1) => Some(&mut m.input_1),
            Target::Input(2) => Some(&mut m.input_2),
            Target::Output(1) => Some(&mut m.output_1),
            Target::Output(2) => Some(&mut m.output_2),
            _ => None,
        }
    }

    fn routing_slot(&mut self, input: u8, output: u8) -> Option<&mut bool> {
        let r = &mut self.mix_point;
        match (input, output) {
            (1, 1) => Some(&mut r.in_1_to_out_1),
            (1, 2) => Some(&mut r.in_1_to_out_2),
            (2, 1) => Some(&mut r.in_2_to_out_1),
            (2, 2) => Some(&mut r.in_2_to_out_2),
            _ => None,
        }
    }
}
