//! Two-level `context → variable → value` store with change notification.
//!
//! Mutations report whether the stored value changed and, when a sink is
//! given, announce the change as a state message. Per-variable ranges live
//! next to the variables under the reserved `$min`/`$max` keys of each
//! context and are never announced themselves.

mod message;

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use switchboard_types::{Dictionary, Message, MessageKind, Value, ids};
use tracing::{debug, trace};

use crate::sink::Sink;
use crate::{Error, Result};

pub use message::{StateChange, state_message};

/// Reserved key of the per-context minimum values.
pub const MIN_KEY: &str = "$min";
/// Reserved key of the per-context maximum values.
pub const MAX_KEY: &str = "$max";

fn is_reserved(key: &str) -> bool {
    key == MIN_KEY || key == MAX_KEY
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Dictionary);

impl State {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_dictionary(dict: Dictionary) -> Self {
        Self(dict)
    }

    #[must_use]
    pub fn as_dictionary(&self) -> &Dictionary {
        &self.0
    }

    #[must_use]
    pub fn into_dictionary(self) -> Dictionary {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Store `value` and announce it through `sink`.
    ///
    /// The notification is sent when `last` is set or the value changed, so
    /// an unchanged value with `last == false` is a complete no-op. Returns
    /// whether the stored value changed.
    pub fn set(
        &mut self,
        last: bool,
        context: &str,
        var: &str,
        value: Value,
        sink: Option<&Sink>,
        msg_id: u32,
    ) -> bool {
        let vars = self.0.get_dictionary_create(context);
        let changed = vars.get(var) != Some(&value);

        let notification = sink
            .filter(|_| last || changed)
            .map(|sink| (sink, state_message(msg_id, last, context, var, value.clone())));

        if changed {
            trace!("State {}/{} = {:?}", context, var, value);
            vars.set(var, value);
        }

        if let Some((sink, msg)) = notification {
            sink.put(msg);
        }
        changed
    }

    /// Look up a variable. `context` names a context directly or, failing
    /// that, is read as a `/` path descending into nested dictionaries
    /// (`"player/track"` reaches into the `track` variable of `player`).
    #[must_use]
    pub fn get(&self, context: &str, var: &str) -> Option<&Value> {
        self.0
            .get_dictionary(context)
            .or_else(|| self.0.get_path_dictionary(context))?
            .get(var)
    }

    /// Replay every variable as a `last = true` message.
    pub fn apply(&self, sink: &Sink, msg_id: u32) {
        for (context, vars) in self.0.iter() {
            if let Value::Dictionary(vars) = vars {
                apply_vars(context, vars, sink, msg_id);
            }
        }
    }

    /// Replay the variables of one context as `last = true` messages.
    pub fn apply_ctx(&self, context: &str, sink: &Sink, msg_id: u32) {
        match self.0.get_dictionary(context) {
            Some(vars) => apply_vars(context, vars, sink, msg_id),
            None => debug!("No state context {} to apply", context),
        }
    }

    pub fn set_range(&mut self, context: &str, var: &str, min: Value, max: Value) {
        let vars = self.0.get_dictionary_create(context);
        vars.get_dictionary_create(MIN_KEY).set(var, min);
        vars.get_dictionary_create(MAX_KEY).set(var, max);
    }

    #[must_use]
    pub fn get_range(&self, context: &str, var: &str) -> Option<(&Value, &Value)> {
        let vars = self.0.get_dictionary(context)?;
        let min = vars.get_dictionary(MIN_KEY)?.get(var)?;
        let max = vars.get_dictionary(MAX_KEY)?.get(var)?;
        Some((min, max))
    }

    /// Clamp `value` into the stored range of `context/var`. Without a
    /// stored range the value is left alone.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` if the stored minimum is not strictly
    /// below the maximum (the value is not modified) and
    /// `Error::UnsupportedType` for non-numeric values.
    pub fn clamp_value(&self, context: &str, var: &str, value: &mut Value) -> Result<()> {
        let Some((min, max)) = self.get_range(context, var) else {
            return Ok(());
        };

        if min.compare(max) != Some(Ordering::Less) {
            return Err(Error::InvalidRange {
                context: context.to_string(),
                var: var.to_string(),
            });
        }

        value.clamp(min, max)?;
        Ok(())
    }

    /// Like `clamp_value`, but an invalid stored range skips clamping.
    fn clamp_if_ranged(&self, context: &str, var: &str, value: &mut Value) -> Result<()> {
        match self.clamp_value(context, var, value) {
            Err(Error::InvalidRange { .. }) => {
                debug!("Ignoring invalid range of {}/{}", context, var);
                Ok(())
            }
            other => other,
        }
    }

    fn current(&self, context: &str, var: &str) -> Result<Value> {
        self.get(context, var)
            .cloned()
            .ok_or_else(|| Error::NoSuchVariable {
                context: context.to_string(),
                var: var.to_string(),
            })
    }

    /// Current value flipped between 0 and 1. The store is not modified.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchVariable` if the variable is not set and
    /// `Error::UnsupportedType` for non-numeric values.
    pub fn toggle_value(&self, context: &str, var: &str) -> Result<Value> {
        let mut value = self.current(context, var)?;
        value.toggle()?;
        Ok(value)
    }

    /// Current value plus `delta`, clamped into the stored range. The store
    /// is not modified.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchVariable` if the variable is not set and
    /// `Error::UnsupportedType` if the value or delta is not numeric.
    pub fn add_value(&self, context: &str, var: &str, delta: &Value) -> Result<Value> {
        let mut value = self.current(context, var)?;
        value.add(delta)?;
        self.clamp_if_ranged(context, var, &mut value)?;
        Ok(value)
    }

    /// Merge `src` context by context and variable by variable; `src` wins
    /// on collisions. Ranges are merged per variable as well.
    pub fn merge(&mut self, src: &State) {
        for (context, vars) in src.0.iter() {
            let Value::Dictionary(vars) = vars else {
                continue;
            };
            let dst = self.0.get_dictionary_create(context);
            for (var, value) in vars.iter() {
                match value {
                    Value::Dictionary(bounds) if is_reserved(var) => {
                        dst.get_dictionary_create(var).merge(bounds);
                    }
                    _ => {
                        dst.set(var.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// Apply a `SetState` or `SetStateRel` command and announce the result
    /// through `sink` as `StateChanged`. Returns `Ok(false)` for messages
    /// that are not state commands.
    ///
    /// # Errors
    ///
    /// Returns `Error::Malformed` for a broken state layout and the errors of
    /// `add_value`/`clamp_value` for values that cannot be applied.
    pub fn handle_command(&mut self, msg: &Message, sink: Option<&Sink>) -> Result<bool> {
        let kind = msg.kind();
        if !matches!(kind, MessageKind::SetState | MessageKind::SetStateRel) {
            return Ok(false);
        }

        let change = StateChange::from_message(msg)?;
        let value = if kind == MessageKind::SetStateRel {
            self.add_value(&change.context, &change.var, &change.value)?
        } else {
            let mut value = change.value;
            self.clamp_if_ranged(&change.context, &change.var, &mut value)?;
            value
        };

        self.set(
            change.last,
            &change.context,
            &change.var,
            value,
            sink,
            ids::STATE_CHANGED,
        );
        Ok(true)
    }

    /// Load a state snapshot. A missing file is an empty state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save a state snapshot as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn apply_vars(context: &str, vars: &Dictionary, sink: &Sink, msg_id: u32) {
    for (var, value) in vars.iter().filter(|(var, _)| !is_reserved(var)) {
        sink.put(state_message(msg_id, true, context, var, value.clone()));
    }
}
