// src/shaping.rs - Gain and washout shaping for movement commands
//!
//! Shaping scales every axis by its gain and runs the yaw channel through a
//! leaky integrator (washout) so a sustained yaw cue drifts back to centre.
//!
//! ```toml
//! # equivalent `config` message fields
//! gainYaw = 0.8
//! washoutYaw = 0.99
//! ```

use std::fmt;

use crate::command::MovementCommand;

/// Width of the normalised yaw circle; yaw wraps at +/-1.
const YAW_RANGE: f32 = 2.0;

/// Names of every field a `config` message may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigField {
    GainX,
    GainY,
    GainZ,
    GainRoll,
    GainPitch,
    GainYaw,
    Gain,
    WashoutX,
    WashoutY,
    WashoutZ,
    WashoutRoll,
    WashoutPitch,
    WashoutYaw,
}

impl ConfigField {
    pub const ALL: [ConfigField; 13] = [
        ConfigField::GainX,
        ConfigField::GainY,
        ConfigField::GainZ,
        ConfigField::GainRoll,
        ConfigField::GainPitch,
        ConfigField::GainYaw,
        ConfigField::Gain,
        ConfigField::WashoutX,
        ConfigField::WashoutY,
        ConfigField::WashoutZ,
        ConfigField::WashoutRoll,
        ConfigField::WashoutPitch,
        ConfigField::WashoutYaw,
    ];

    /// Key used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            ConfigField::GainX => "gainX",
            ConfigField::GainY => "gainY",
            ConfigField::GainZ => "gainZ",
            ConfigField::GainRoll => "gainRoll",
            ConfigField::GainPitch => "gainPitch",
            ConfigField::GainYaw => "gainYaw",
            ConfigField::Gain => "gain",
            ConfigField::WashoutX => "washoutX",
            ConfigField::WashoutY => "washoutY",
            ConfigField::WashoutZ => "washoutZ",
            ConfigField::WashoutRoll => "washoutRoll",
            ConfigField::WashoutPitch => "washoutPitch",
            ConfigField::WashoutYaw => "washoutYaw",
        }
    }

    pub fn is_washout(self) -> bool {
        matches!(
            self,
            ConfigField::WashoutX
                | ConfigField::WashoutY
                | ConfigField::WashoutZ
                | ConfigField::WashoutRoll
                | ConfigField::WashoutPitch
                | ConfigField::WashoutYaw
        )
    }

    /// Check a candidate value before it is stored.
    pub fn validate(self, value: f32) -> Result<f32, String> {
        if !value.is_finite() {
            return Err(format!("{} must be finite, got {}", self.name(), value));
        }
        if self.is_washout() && (value <= 0.0 || value > 1.0) {
            return Err(format!("{} must be in (0, 1], got {}", self.name(), value));
        }
        Ok(value)
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process-wide shaping parameters, replaced field by field via `config` messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapingConfig {
    pub gain_x: f32,
    pub gain_y: f32,
    pub gain_z: f32,
    pub gain_roll: f32,
    pub gain_pitch: f32,
    pub gain_yaw: f32,
    /// Applied to every axis on top of the per-axis gain.
    pub gain: f32,

    pub washout_x: f32,
    pub washout_y: f32,
    pub washout_z: f32,
    pub washout_roll: f32,
    pub washout_pitch: f32,
    pub washout_yaw: f32,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            gain_x: 1.0,
            gain_y: 1.0,
            gain_z: 1.0,
            gain_roll: 1.0,
            gain_pitch: 1.0,
            gain_yaw: 1.0,
            gain: 1.0,
            washout_x: 1.0,
            washout_y: 1.0,
            washout_z: 0.996,
            washout_roll: 0.996,
            washout_pitch: 0.996,
            washout_yaw: 0.996,
        }
    }
}

impl ShapingConfig {
    fn field_mut(&mut self, field: ConfigField) -> &mut f32 {
        match field {
            ConfigField::GainX => &mut self.gain_x,
            ConfigField::GainY => &mut self.gain_y,
            ConfigField::GainZ => &mut self.gain_z,
            ConfigField::GainRoll => &mut self.gain_roll,
            ConfigField::GainPitch => &mut self.gain_pitch,
            ConfigField::GainYaw => &mut self.gain_yaw,
            ConfigField::Gain => &mut self.gain,
            ConfigField::WashoutX => &mut self.washout_x,
            ConfigField::WashoutY => &mut self.washout_y,
            ConfigField::WashoutZ => &mut self.washout_z,
            ConfigField::WashoutRoll => &mut self.washout_roll,
            ConfigField::WashoutPitch => &mut self.washout_pitch,
            ConfigField::WashoutYaw => &mut self.washout_yaw,
        }
    }

    pub fn get(&self, field: ConfigField) -> f32 {
        match field {
            ConfigField::GainX => self.gain_x,
            ConfigField::GainY => self.gain_y,
            ConfigField::GainZ => self.gain_z,
            ConfigField::GainRoll => self.gain_roll,
            ConfigField::GainPitch => self.gain_pitch,
            ConfigField::GainYaw => self.gain_yaw,
            ConfigField::Gain => self.gain,
            ConfigField::WashoutX => self.washout_x,
            ConfigField::WashoutY => self.washout_y,
            ConfigField::WashoutZ => self.washout_z,
            ConfigField::WashoutRoll => self.washout_roll,
            ConfigField::WashoutPitch => self.washout_pitch,
            ConfigField::WashoutYaw => self.washout_yaw,
        }
    }

    /// Overwrite only the fields present in `update`. Returns how many changed.
    pub fn apply(&mut self, update: &ConfigUpdate) -> usize {
        let mut changed = 0;
        for (field, value) in update.iter() {
            let slot = self.field_mut(field);
            if *slot != value {
                *slot = value;
                changed += 1;
            }
        }
        changed
    }

    fn axis_gains(&self) -> [f32; 6] {
        [
            self.gain_x,
            self.gain_y,
            self.gain_z,
            self.gain_roll,
            self.gain_pitch,
            self.gain_yaw,
        ]
    }
}

impl fmt::Display for ShapingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in ConfigField::ALL {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", field, self.get(field))?;
            first = false;
        }
        Ok(())
    }
}

/// Partial replacement for [`ShapingConfig`]. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    values: Vec<(ConfigField, f32)>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: ConfigField, value: f32) {
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = value,
            None => self.values.push((field, value)),
        }
    }

    pub fn with(mut self, field: ConfigField, value: f32) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: ConfigField) -> Option<f32> {
        self.values.iter().find(|(f, _)| *f == field).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConfigField, f32)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Washout history carried between successive movement commands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterState {
    /// Last raw (gain-scaled, unwrapped) yaw; `None` until the first sample.
    pub previous_yaw: Option<f32>,
    pub washed_yaw: f32,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.previous_yaw = None;
        self.washed_yaw = 0.0;
    }

    pub fn is_cold(&self) -> bool {
        self.previous_yaw.is_none()
    }
}

/// Shortest-path difference between two yaw samples on the normalised circle.
pub fn unwrap_yaw_delta(previous: f32, current: f32) -> f32 {
    let mut delta = current - previous;
    if delta < -YAW_RANGE / 2.0 {
        delta += YAW_RANGE;
    }
    if delta > YAW_RANGE / 2.0 {
        delta -= YAW_RANGE;
    }
    delta
}

/// Apply gain to all axes and washout to yaw, advancing `state`.
pub fn shape(cmd: MovementCommand, cfg: &ShapingConfig, state: &mut FilterState) -> MovementCommand {
    let gains = cfg.axis_gains();
    let mut axes = cmd.to_array();
    for (value, gain) in axes.iter_mut().zip(gains) {
        *value *= gain * cfg.gain;
    }

    let yaw = axes[5];
    let previous = *state.previous_yaw.get_or_insert(yaw);
    let delta = unwrap_yaw_delta(previous, yaw);
    state.washed_yaw = cfg.washout_yaw * (state.washed_yaw + delta);
    state.previous_yaw = Some(yaw);
    axes[5] = state.washed_yaw;

    MovementCommand::from_array(axes)
}

/// Stateful wrapper owned by the dispatch loop.
#[derive(Debug, Default)]
pub struct ShapingFilter {
    state: FilterState,
}

impl ShapingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(&mut self, cmd: MovementCommand, cfg: &ShapingConfig) -> MovementCommand {
        shape(cmd, cfg, &mut self.state)
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }
}
