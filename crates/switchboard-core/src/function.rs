//! Request/response correlation over fire-and-forget messages.
//!
//! A function call carries a unique tag in its header; the server copies the
//! tag into its replies. The client either matches replies against the
//! request directly ([`is_reply_to`]) or, when several calls are in flight,
//! parks per-call data in [`PendingCalls`] keyed by the tag.

use switchboard_types::{Dictionary, Message, keys};
use tracing::trace;

use crate::utils::new_id;

/// Tag `msg` as a function call. Already tagged messages keep their tag.
pub fn add_function_tag(msg: &mut Message) {
    if msg.header.contains_key(keys::FUNCTION_TAG) {
        return;
    }
    msg.header.set(keys::FUNCTION_TAG, new_id());
}

#[must_use]
pub fn function_tag(msg: &Message) -> Option<&str> {
    msg.header.get_str(keys::FUNCTION_TAG)
}

/// Copy the function tag of `src` onto the reply `dst`.
pub fn copy_function_tag(dst: &mut Message, src: &Message) {
    dst.copy_header_field(src, keys::FUNCTION_TAG);
}

/// Whether `reply` carries the function tag of `request`. Untagged messages
/// never match.
#[must_use]
pub fn is_reply_to(reply: &Message, request: &Message) -> bool {
    matches!(
        (function_tag(reply), function_tag(request)),
        (Some(a), Some(b)) if a == b
    )
}

#[derive(Debug, Clone)]
struct PendingCall {
    tag: String,
    data: Dictionary,
}

/// In-flight function calls with per-call scratch data.
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    calls: Vec<PendingCall>,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `msg` and register a call for it. Returns the call's data
    /// dictionary for the caller to fill.
    pub fn push(&mut self, msg: &mut Message) -> &mut Dictionary {
        add_function_tag(msg);
        let tag = function_tag(msg).unwrap_or_default().to_string();
        trace!("Pending function call {}", tag);

        let idx = self.calls.len();
        self.calls.push(PendingCall {
            tag,
            data: Dictionary::new(),
        });
        &mut self.calls[idx].data
    }

    /// Find the call `msg` replies to. Returns its index (for
    /// [`PendingCalls::remove`]) and its data.
    pub fn get(&mut self, msg: &Message) -> Option<(usize, &mut Dictionary)> {
        let tag = function_tag(msg)?;
        self.calls
            .iter_mut()
            .enumerate()
            .find(|(_, call)| call.tag == tag)
            .map(|(idx, call)| (idx, &mut call.data))
    }

    /// Forget a finished call. Out-of-range indices are ignored.
    pub fn remove(&mut self, idx: usize) -> Option<Dictionary> {
        (idx < self.calls.len()).then(|| self.calls.remove(idx).data)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

pub fn function_push<'a>(calls: &'a mut PendingCalls, msg: &mut Message) -> &'a mut Dictionary {
    calls.push(msg)
}

pub fn function_get<'a>(
    calls: &'a mut PendingCalls,
    msg: &Message,
) -> Option<(usize, &'a mut Dictionary)> {
    calls.get(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_types::Value;

    #[test]
    fn test_add_function_tag_is_idempotent() {
        let mut msg = Message::new(42, 1);
        add_function_tag(&mut msg);
        let tag = function_tag(&msg).unwrap().to_string();
        add_function_tag(&mut msg);
        assert_eq!(function_tag(&msg), Some(tag.as_str()));
    }

    #[test]
    fn test_is_reply_to() {
        let mut request = Message::new(42, 1);
        add_function_tag(&mut request);

        let mut reply = Message::new(42, 2);
        assert!(!is_reply_to(&reply, &request));
        copy_function_tag(&mut reply, &request);
        assert!(is_reply_to(&reply, &request));

        assert!(!is_reply_to(&Message::new(42, 3), &Message::new(42, 4)));
    }

    #[test]
    fn test_pending_calls_round_trip() {
        let mut calls = PendingCalls::new();
        let mut first = Message::new(42, 1);
        let mut second = Message::new(42, 1);
        function_push(&mut calls, &mut first).set("path", "/music");
        function_push(&mut calls, &mut second).set("path", "/video");
        assert_eq!(calls.len(), 2);

        let mut reply = Message::new(42, 2);
        copy_function_tag(&mut reply, &second);

        let (idx, data) = function_get(&mut calls, &reply).unwrap();
        assert_eq!(data.get("path"), Some(&Value::from("/video")));
        assert_eq!(idx, 1);

        let data = calls.remove(idx).unwrap();
        assert_eq!(data.get_str("path"), Some("/video"));
        assert_eq!(calls.len(), 1);
        assert!(calls.get(&reply).is_none());
        assert!(calls.remove(5).is_none());
    }

    #[test]
    fn test_get_returns_stored_dictionary() {
        let mut calls = PendingCalls::new();
        let mut msg = Message::new(42, 1);
        let pushed: *const Dictionary = calls.push(&mut msg);
        let (_, found) = calls.get(&msg).unwrap();
        assert!(std::ptr::eq(pushed, found));
    }

    #[test]
    fn test_untagged_reply_matches_nothing() {
        let mut calls = PendingCalls::new();
        calls.push(&mut Message::new(42, 1));
        assert!(calls.get(&Message::new(42, 2)).is_none());
    }
}
