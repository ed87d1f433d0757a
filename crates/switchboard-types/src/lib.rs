//! Message and value types for the switchboard message fabric.
//!
//! Every component of switchboard talks through [`Message`] values: a
//! `(namespace, id)` discriminator, a header [`Dictionary`] and an ordered
//! argument list of tagged [`Value`]s. All types are serializable so state
//! snapshots and messages can be persisted or inspected as JSON.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Reserved namespace and message ids.
pub mod ids {
    /// Namespace of the generic commands understood by every sink.
    pub const NS_GENERIC: u32 = 1;
    /// Stops `Sink::iteration` and every loop built on it.
    pub const CMD_QUIT: u32 = 1;

    /// Namespace of the state synchronization messages.
    pub const NS_STATE: u32 = 2;
    /// A state variable changed (server to clients).
    pub const STATE_CHANGED: u32 = 1;
    /// Set a state variable (client to server).
    pub const CMD_SET_STATE: u32 = 100;
    /// Add a delta to a numeric state variable (client to server).
    pub const CMD_SET_STATE_REL: u32 = 101;
}

/// Reserved header keys.
pub mod keys {
    /// Addressed recipient of a message, used for unicast routing.
    pub const CLIENT_ID: &str = "client_id";
    /// Correlation id linking a function call to its replies.
    pub const FUNCTION_TAG: &str = "function_tag";
    /// State context of a state message.
    pub const CONTEXT: &str = "context";
    /// State variable of a state message.
    pub const VAR: &str = "var";
}

/// Errors from numeric value operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("value of type {0} is not numeric")]
    NotNumeric(&'static str),

    #[error("operand of type {0} is not compatible")]
    IncompatibleOperand(&'static str),

    #[error("minimum is not below maximum")]
    InvalidRange,
}

/// Tagged value carried in headers, arguments and state dictionaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f64),
    String(String),
    Dictionary(Dictionary),
    Array(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Dictionary(_) => "dictionary",
            Value::Array(_) => "array",
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Long(_) | Value::Float(_))
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of `Int` and `Long` values.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    // Longs beyond 2^53 lose precision; only used for ordering and float arithmetic
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dictionary_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Order two numeric values. Integers compare exactly, anything involving
    /// a float compares as `f64`. Non-numeric values have no ordering.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => Some(self.as_i64()?.cmp(&other.as_i64()?)),
        }
    }

    /// Clamp a numeric value into `[min, max]` in place.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotNumeric` for non-numeric values,
    /// `ValueError::IncompatibleOperand` if a bound is not numeric and
    /// `ValueError::InvalidRange` if `min > max`.
    pub fn clamp(&mut self, min: &Value, max: &Value) -> Result<(), ValueError> {
        match self {
            Value::Int(v) => {
                let (lo, hi) = integer_bounds(min, max)?;
                let clamped = i64::from(*v).clamp(lo, hi);
                *v = i32::try_from(clamped).unwrap_or(if clamped < 0 { i32::MIN } else { i32::MAX });
            }
            Value::Long(v) => {
                let (lo, hi) = integer_bounds(min, max)?;
                *v = (*v).clamp(lo, hi);
            }
            Value::Float(v) => {
                let lo = min
                    .as_f64()
                    .ok_or(ValueError::IncompatibleOperand(min.type_name()))?;
                let hi = max
                    .as_f64()
                    .ok_or(ValueError::IncompatibleOperand(max.type_name()))?;
                if lo.is_nan() || hi.is_nan() || lo > hi {
                    return Err(ValueError::InvalidRange);
                }
                *v = v.clamp(lo, hi);
            }
            other => return Err(ValueError::NotNumeric(other.type_name())),
        }
        Ok(())
    }

    /// Flip a numeric value between 0 and 1. Any non-zero value becomes 0.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotNumeric` for non-numeric values.
    // Exact zero is the "off" value of a float toggle
    #[allow(clippy::float_cmp)]
    pub fn toggle(&mut self) -> Result<(), ValueError> {
        match self {
            Value::Int(v) => *v = i32::from(*v == 0),
            Value::Long(v) => *v = i64::from(*v == 0),
            Value::Float(v) => *v = if *v == 0.0 { 1.0 } else { 0.0 },
            other => return Err(ValueError::NotNumeric(other.type_name())),
        }
        Ok(())
    }

    /// Add `delta` in place. Integer addition saturates.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotNumeric` for non-numeric values and
    /// `ValueError::IncompatibleOperand` when `delta` cannot be added without
    /// changing the type of `self` (e.g. a float delta on an int).
    pub fn add(&mut self, delta: &Value) -> Result<(), ValueError> {
        match (self, delta) {
            (Value::Int(v), Value::Int(d)) => *v = v.saturating_add(*d),
            (Value::Long(v), Value::Int(d)) => *v = v.saturating_add(i64::from(*d)),
            (Value::Long(v), Value::Long(d)) => *v = v.saturating_add(*d),
            (Value::Float(v), d) => {
                *v += d
                    .as_f64()
                    .ok_or(ValueError::IncompatibleOperand(d.type_name()))?;
            }
            (v, d) if v.is_numeric() => {
                return Err(ValueError::IncompatibleOperand(d.type_name()));
            }
            (v, _) => return Err(ValueError::NotNumeric(v.type_name())),
        }
        Ok(())
    }
}

// Float bounds on integer values are rounded towards zero; saturating by `as`
#[allow(clippy::cast_possible_truncation)]
fn integer_bound(bound: &Value) -> Result<i64, ValueError> {
    match bound {
        Value::Float(f) => Ok(*f as i64),
        other => other
            .as_i64()
            .ok_or(ValueError::IncompatibleOperand(other.type_name())),
    }
}

fn integer_bounds(min: &Value, max: &Value) -> Result<(i64, i64), ValueError> {
    let lo = integer_bound(min)?;
    let hi = integer_bound(max)?;
    if lo > hi {
        return Err(ValueError::InvalidRange);
    }
    Ok((lo, hi))
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(i32::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Dictionary> for Value {
    fn from(v: Dictionary) -> Self {
        Value::Dictionary(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// String-keyed map of values with deterministic (sorted) iteration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary(BTreeMap<String, Value>);

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_dictionary(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Value::as_dictionary)
    }

    pub fn get_dictionary_mut(&mut self, key: &str) -> Option<&mut Dictionary> {
        self.get_mut(key).and_then(Value::as_dictionary_mut)
    }

    /// Child dictionary under `key`, created (or replacing a non-dictionary
    /// value) when missing.
    pub fn get_dictionary_create(&mut self, key: &str) -> &mut Dictionary {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Dictionary(Dictionary::new()));
        if !matches!(entry, Value::Dictionary(_)) {
            *entry = Value::Dictionary(Dictionary::new());
        }
        match entry {
            Value::Dictionary(d) => d,
            _ => unreachable!("entry was just made a dictionary"),
        }
    }

    /// Descend a `/`-separated path of nested dictionaries. Empty segments are
    /// ignored, so `"a//b/"` is the same as `"a/b"`.
    #[must_use]
    pub fn get_path_dictionary(&self, path: &str) -> Option<&Dictionary> {
        path_segments(path).try_fold(self, |dict, segment| dict.get_dictionary(segment))
    }

    pub fn get_path_dictionary_mut(&mut self, path: &str) -> Option<&mut Dictionary> {
        path_segments(path).try_fold(self, |dict, segment| dict.get_dictionary_mut(segment))
    }

    pub fn get_path_dictionary_create(&mut self, path: &str) -> &mut Dictionary {
        path_segments(path).fold(self, |dict, segment| dict.get_dictionary_create(segment))
    }

    /// Deep merge: nested dictionaries are merged key by key, every other
    /// collision is overwritten by `src`.
    pub fn merge(&mut self, src: &Dictionary) {
        for (key, value) in src.iter() {
            match (self.0.get_mut(key), value) {
                (Some(Value::Dictionary(dst)), Value::Dictionary(child)) => dst.merge(child),
                _ => {
                    self.0.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

impl FromIterator<(String, Value)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decoded `(namespace, id)` of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Generic quit command
    Quit,
    /// State variable changed notification
    StateChanged,
    /// Absolute state set command
    SetState,
    /// Relative state set command
    SetStateRel,
    /// Application defined message
    Other { namespace: u32, id: u32 },
}

impl MessageKind {
    #[must_use]
    pub fn from_ids(namespace: u32, id: u32) -> Self {
        match (namespace, id) {
            (ids::NS_GENERIC, ids::CMD_QUIT) => MessageKind::Quit,
            (ids::NS_STATE, ids::STATE_CHANGED) => MessageKind::StateChanged,
            (ids::NS_STATE, ids::CMD_SET_STATE) => MessageKind::SetState,
            (ids::NS_STATE, ids::CMD_SET_STATE_REL) => MessageKind::SetStateRel,
            (namespace, id) => MessageKind::Other { namespace, id },
        }
    }

    #[must_use]
    pub fn ids(self) -> (u32, u32) {
        match self {
            MessageKind::Quit => (ids::NS_GENERIC, ids::CMD_QUIT),
            MessageKind::StateChanged => (ids::NS_STATE, ids::STATE_CHANGED),
            MessageKind::SetState => (ids::NS_STATE, ids::CMD_SET_STATE),
            MessageKind::SetStateRel => (ids::NS_STATE, ids::CMD_SET_STATE_REL),
            MessageKind::Other { namespace, id } => (namespace, id),
        }
    }
}

/// A self-contained message: discriminator, header and arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub namespace: u32,
    pub id: u32,
    #[serde(default)]
    pub header: Dictionary,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Message {
    #[must_use]
    pub fn new(namespace: u32, id: u32) -> Self {
        Self {
            namespace,
            id,
            header: Dictionary::new(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_kind(kind: MessageKind) -> Self {
        let (namespace, id) = kind.ids();
        Self::new(namespace, id)
    }

    /// The generic quit command.
    #[must_use]
    pub fn quit() -> Self {
        Self::from_kind(MessageKind::Quit)
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_ids(self.namespace, self.id)
    }

    #[must_use]
    pub fn is_quit(&self) -> bool {
        self.kind() == MessageKind::Quit
    }

    /// Builder-style argument append.
    #[must_use]
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn push_arg(&mut self, value: impl Into<Value>) {
        self.args.push(value.into());
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Addressed recipient, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.header.get_str(keys::CLIENT_ID)
    }

    pub fn set_client_id(&mut self, id: impl Into<String>) {
        self.header.set(keys::CLIENT_ID, id.into());
    }

    /// Copy one header entry from `src`, removing it here if `src` lacks it.
    pub fn copy_header_field(&mut self, src: &Message, key: &str) {
        match src.header.get(key) {
            Some(value) => {
                self.header.set(key, value.clone());
            }
            None => {
                self.header.remove(key);
            }
        }
    }
}
