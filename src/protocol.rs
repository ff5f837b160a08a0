// src/protocol.rs - Line-oriented JSON message codec
//!
//! Each line from the client is one JSON object selected by its `method` key:
//!
//! ```text
//! {"method":"xyzrpy","units":"norm","args":[x,y,z,roll,pitch,yaw]}
//! {"method":"config","gainX":1.5,"washoutYaw":0.99}
//! {"method":"activate","active":true}
//! {"method":"raw","args":[...]}
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use crate::command::{ActivationCommand, MovementCommand};
use crate::shaping::{ConfigField, ConfigUpdate};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string 'method' key")]
    MissingMethod,
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
    #[error("missing 'args' array")]
    MissingArgs,
    #[error("expected {expected} args, got {actual}")]
    ArgCount { expected: usize, actual: usize },
    #[error("argument {index} is not a number: {value}")]
    NonNumericArg { index: usize, value: String },
    #[error("missing or non-boolean 'active' flag")]
    MissingActiveFlag,
}

/// Unit interpretation of an `xyzrpy` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Normalized,
    Real,
}

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Move { command: MovementCommand, units: Units },
    Activate(ActivationCommand),
    Config(ConfigUpdate),
    /// Reserved for raw-unit delivery; accepted and ignored.
    Raw,
}

const XYZRPY_ARGS: usize = 6;

/// Decode a single protocol line.
pub fn decode(line: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError::Json(e.to_string()))?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingMethod)?;

    match method {
        "config" => Ok(Message::Config(decode_config(obj))),
        "xyzrpy" => decode_xyzrpy(obj),
        "activate" => decode_activate(obj),
        "raw" => Ok(Message::Raw),
        other => Err(DecodeError::UnknownMethod(other.to_string())),
    }
}

fn decode_units(obj: &Map<String, Value>) -> Units {
    match obj.get("units") {
        None => Units::Normalized,
        Some(Value::String(s)) if s == "norm" => Units::Normalized,
        Some(Value::String(s)) if s == "real" => Units::Real,
        Some(other) => {
            tracing::warn!("Unrecognised units {}, treating as normalized", other);
            Units::Normalized
        }
    }
}

fn decode_xyzrpy(obj: &Map<String, Value>) -> Result<Message, DecodeError> {
    let units = decode_units(obj);
    let args = obj
        .get("args")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingArgs)?;
    if args.len() != XYZRPY_ARGS {
        return Err(DecodeError::ArgCount { expected: XYZRPY_ARGS, actual: args.len() });
    }

    let mut axes = [0.0f32; XYZRPY_ARGS];
    for (index, arg) in args.iter().enumerate() {
        axes[index] = number(arg).ok_or_else(|| DecodeError::NonNumericArg {
            index,
            value: arg.to_string(),
        })?;
    }

    Ok(Message::Move { command: MovementCommand::from_array(axes), units })
}

fn decode_activate(obj: &Map<String, Value>) -> Result<Message, DecodeError> {
    let flag = obj.get("active").or_else(|| {
        obj.get("args")
            .and_then(Value::as_array)
            .and_then(|args| args.first())
    });
    let active = flag.and_then(Value::as_bool).ok_or(DecodeError::MissingActiveFlag)?;
    Ok(Message::Activate(ActivationCommand { active }))
}

/// Pick the known shaping fields out of a `config` object.
///
/// Fields that do not parse as a usable float are skipped so the rest of the
/// message still applies.
fn decode_config(obj: &Map<String, Value>) -> ConfigUpdate {
    let mut update = ConfigUpdate::new();
    for field in ConfigField::ALL {
        let Some(raw) = obj.get(field.name()) else {
            continue;
        };
        let parsed = number(raw)
            .ok_or_else(|| format!("{} is not a number: {}", field, raw))
            .and_then(|v| field.validate(v));
        match parsed {
            Ok(value) => update.set(field, value),
            Err(reason) => tracing::warn!("Ignoring config field: {}", reason),
        }
    }
    update
}

/// JSON numbers, or strings holding a number. Anything that is not finite
/// once narrowed to `f32` is refused.
fn number(value: &Value) -> Option<f32> {
    let v = match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }?;
    v.is_finite().then_some(v)
}
