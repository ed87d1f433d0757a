//! Wire layout of state messages.
//!
//! `StateChanged`, `SetState` and `SetStateRel` share one layout: the context
//! and variable travel in the header, the arguments are `[last, value]`.

use switchboard_types::{Message, Value, ids, keys};

use crate::{Error, Result};

/// Build a state message with the given id in the state namespace.
#[must_use]
pub fn state_message(msg_id: u32, last: bool, context: &str, var: &str, value: Value) -> Message {
    let mut msg = Message::new(ids::NS_STATE, msg_id);
    msg.header.set(keys::CONTEXT, context);
    msg.header.set(keys::VAR, var);
    msg.push_arg(last);
    msg.push_arg(value);
    msg
}

/// Decoded state message
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub last: bool,
    pub context: String,
    pub var: String,
    pub value: Value,
}

impl StateChange {
    /// Decode the state layout. The message kind is not checked, so the same
    /// decoder serves notifications and set commands.
    ///
    /// # Errors
    ///
    /// Returns `Error::Malformed` if a header field or argument is missing.
    pub fn from_message(msg: &Message) -> Result<Self> {
        let context = msg
            .header
            .get_str(keys::CONTEXT)
            .ok_or_else(|| Error::Malformed("state message without context".to_string()))?;
        let var = msg
            .header
            .get_str(keys::VAR)
            .ok_or_else(|| Error::Malformed("state message without var".to_string()))?;
        let last = msg
            .arg(0)
            .and_then(Value::as_int)
            .ok_or_else(|| Error::Malformed("state message without last flag".to_string()))?;
        let value = msg
            .arg(1)
            .ok_or_else(|| Error::Malformed("state message without value".to_string()))?;

        Ok(Self {
            last: last != 0,
            context: context.to_string(),
            var: var.to_string(),
            value: value.clone(),
        })
    }

    #[must_use]
    pub fn into_message(self, msg_id: u32) -> Message {
        state_message(msg_id, self.last, &self.context, &self.var, self.value)
    }
}
