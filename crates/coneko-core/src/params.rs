//! The processor's parameter surface.
//!
//! Every parameter lives in its own atomic cell. The control context writes,
//! the audio context reads once per block; neither side ever takes a lock.
//! Values are clamped on write and again on read, so a reader never sees an
//! out-of-range value even if a cell was written through another path.

use crate::lockfree::{AtomicFlag, AtomicFloat};
use crate::parameter::ParameterRange;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of parameters in [`ParamId::ALL`].
pub const PARAM_COUNT: usize = 12;

/// Stable parameter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    InputGain,
    OutputGain,
    DryWetMix,
    DecayTime,
    PreDelayTime,
    StereoWidth,
    LowShelfFreq,
    LowShelfGain,
    HighShelfFreq,
    HighShelfGain,
    Reversed,
    Bypassed,
}

impl ParamId {
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::InputGain,
        ParamId::OutputGain,
        ParamId::DryWetMix,
        ParamId::DecayTime,
        ParamId::PreDelayTime,
        ParamId::StereoWidth,
        ParamId::LowShelfFreq,
        ParamId::LowShelfGain,
        ParamId::HighShelfFreq,
        ParamId::HighShelfGain,
        ParamId::Reversed,
        ParamId::Bypassed,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Key used by hosts and persisted state.
    pub const fn key(self) -> &'static str {
        match self {
            ParamId::InputGain => "InputGain",
            ParamId::OutputGain => "OutputGain",
            ParamId::DryWetMix => "DryWetMix",
            ParamId::DecayTime => "DecayTime",
            ParamId::PreDelayTime => "PreDelayTime",
            ParamId::StereoWidth => "StereoWidth",
            ParamId::LowShelfFreq => "LowShelfFreq",
            ParamId::LowShelfGain => "LowShelfGain",
            ParamId::HighShelfFreq => "HighShelfFreq",
            ParamId::HighShelfGain => "HighShelfGain",
            ParamId::Reversed => "Reversed",
            ParamId::Bypassed => "Bypassed",
        }
    }

    pub fn from_key(key: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.key() == key)
            .ok_or_else(|| Error::UnknownParameter(key.to_string()))
    }

    pub const fn name(self) -> &'static str {
        match self {
            ParamId::InputGain => "Input Gain",
            ParamId::OutputGain => "Output Gain",
            ParamId::DryWetMix => "Mix",
            ParamId::DecayTime => "Decay",
            ParamId::PreDelayTime => "Pre-delay",
            ParamId::StereoWidth => "Width",
            ParamId::LowShelfFreq => "Low Shelf Freq",
            ParamId::LowShelfGain => "Low Shelf Gain",
            ParamId::HighShelfFreq => "High Shelf Freq",
            ParamId::HighShelfGain => "High Shelf Gain",
            ParamId::Reversed => "Reverse",
            ParamId::Bypassed => "Bypass",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            ParamId::InputGain
            | ParamId::OutputGain
            | ParamId::LowShelfGain
            | ParamId::HighShelfGain => "dB",
            ParamId::DryWetMix | ParamId::StereoWidth => "%",
            ParamId::DecayTime => "s",
            ParamId::PreDelayTime => "ms",
            ParamId::LowShelfFreq | ParamId::HighShelfFreq => "Hz",
            ParamId::Reversed | ParamId::Bypassed => "",
        }
    }

    pub const fn is_toggle(self) -> bool {
        matches!(self, ParamId::Reversed | ParamId::Bypassed)
    }

    /// Parameters whose change requires a new kernel.
    pub const fn requires_rebuild(self) -> bool {
        matches!(self, ParamId::DecayTime | ParamId::Reversed)
    }

    pub fn range(self) -> ParameterRange {
        match self {
            ParamId::InputGain | ParamId::OutputGain => {
                ParameterRange::new(-72.0, 36.0, 0.1, 0.0).with_centre(0.0)
            }
            ParamId::DryWetMix => ParameterRange::new(0.0, 100.0, 1.0, 100.0).with_centre(50.0),
            ParamId::DecayTime => ParameterRange::new(0.1, 8.0, 0.01, 3.0).with_centre(3.0),
            ParamId::PreDelayTime => ParameterRange::new(0.0, 1000.0, 1.0, 0.0).with_skew(0.5),
            ParamId::StereoWidth => ParameterRange::new(0.0, 200.0, 1.0, 100.0),
            ParamId::LowShelfFreq => {
                ParameterRange::new(20.0, 2000.0, 1.0, 20.0).with_centre(200.0)
            }
            ParamId::HighShelfFreq => {
                ParameterRange::new(200.0, 20000.0, 1.0, 20000.0).with_centre(2000.0)
            }
            ParamId::LowShelfGain | ParamId::HighShelfGain => {
                ParameterRange::new(-24.0, 24.0, 0.1, 0.0)
            }
            ParamId::Reversed | ParamId::Bypassed => ParameterRange::toggle(false),
        }
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug)]
enum Cell {
    Float(AtomicFloat),
    Flag(AtomicFlag),
}

/// Shared parameter state, one atomic cell per [`ParamId`].
///
/// Wrap in an `Arc` and hand one clone to each context.
#[derive(Debug)]
pub struct ParameterStore {
    ranges: [ParameterRange; PARAM_COUNT],
    cells: [Cell; PARAM_COUNT],
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    /// All parameters at their defaults.
    pub fn new() -> Self {
        let ranges = ParamId::ALL.map(ParamId::range);
        let cells = ParamId::ALL.map(|id| {
            let default = ranges[id.index()].default;
            if id.is_toggle() {
                Cell::Flag(AtomicFlag::new(default >= 0.5))
            } else {
                Cell::Float(AtomicFloat::new(default))
            }
        });
        Self { ranges, cells }
    }

    #[inline]
    pub fn range(&self, id: ParamId) -> &ParameterRange {
        &self.ranges[id.index()]
    }

    /// Current value in real units, clamped. Toggles read as 0.0 / 1.0.
    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        match &self.cells[id.index()] {
            Cell::Float(cell) => self.ranges[id.index()].clamp(cell.get()),
            Cell::Flag(flag) => {
                if flag.get() {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    #[inline]
    pub fn get_bool(&self, id: ParamId) -> bool {
        match &self.cells[id.index()] {
            Cell::Float(cell) => cell.get() >= 0.5,
            Cell::Flag(flag) => flag.get(),
        }
    }

    /// Store `value` clamped to range and return what was stored. NaN writes
    /// are ignored. Toggles switch on at 0.5 and above.
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        if value.is_nan() {
            return self.get(id);
        }
        match &self.cells[id.index()] {
            Cell::Float(cell) => {
                let clamped = self.ranges[id.index()].clamp(value);
                cell.set(clamped);
                clamped
            }
            Cell::Flag(flag) => {
                let on = value >= 0.5;
                flag.set(on);
                if on {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Store a toggle and return the previous state.
    pub fn set_bool(&self, id: ParamId, on: bool) -> bool {
        match &self.cells[id.index()] {
            Cell::Flag(flag) => flag.swap(on),
            Cell::Float(cell) => {
                let range = &self.ranges[id.index()];
                let previous = cell.swap(if on { range.max } else { range.min });
                previous >= 0.5
            }
        }
    }

    #[inline]
    pub fn get_normalised(&self, id: ParamId) -> f32 {
        self.range(id).to_normalised(self.get(id))
    }

    /// Host-automation write: denormalise, snap to step, store.
    pub fn set_normalised(&self, id: ParamId, normalised: f32) -> f32 {
        let range = self.range(id);
        self.set(id, range.snap(range.from_normalised(normalised)))
    }

    pub fn reset_to_defaults(&self) {
        for id in ParamId::ALL {
            self.set(id, self.range(id).default);
        }
    }

    /// `(id, value)` pairs for every parameter.
    pub fn values(&self) -> impl Iterator<Item = (ParamId, f32)> + '_ {
        ParamId::ALL.into_iter().map(move |id| (id, self.get(id)))
    }
}
