//! Tests for the state store: change notification, ranges, commands and
//! persistence

use super::fixtures::recording_sink;
use crate::state::{MAX_KEY, MIN_KEY, state_message};
use crate::{Error, Message, State, StateChange, Value, ids};
use tempfile::TempDir;

fn set_state(var: &str, value: impl Into<Value>) -> Message {
    state_message(ids::CMD_SET_STATE, false, "mixer", var, value.into())
}

fn set_state_rel(var: &str, delta: impl Into<Value>) -> Message {
    state_message(ids::CMD_SET_STATE_REL, false, "mixer", var, delta.into())
}

fn volume_state() -> State {
    let mut state = State::new();
    state.set(false, "mixer", "volume", Value::Int(5), None, ids::STATE_CHANGED);
    state.set_range("mixer", "volume", Value::Int(0), Value::Int(10));
    state
}

#[test]
fn test_set_unchanged_is_noop() {
    let mut state = volume_state();
    let (sink, recorder) = recording_sink(true);

    assert!(!state.set(false, "mixer", "volume", Value::Int(5), Some(&*sink), ids::STATE_CHANGED));
    assert_eq!(recorder.len(), 0);

    // `last` forces the notification even without a change
    assert!(!state.set(true, "mixer", "volume", Value::Int(5), Some(&*sink), ids::STATE_CHANGED));
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_set_changed_notifies() {
    let mut state = volume_state();
    let (sink, recorder) = recording_sink(true);

    assert!(state.set(false, "mixer", "volume", Value::Int(6), Some(&*sink), ids::STATE_CHANGED));
    let change = StateChange::from_message(&recorder.messages()[0]).unwrap();
    assert_eq!(
        change,
        StateChange {
            last: false,
            context: "mixer".to_string(),
            var: "volume".to_string(),
            value: Value::Int(6),
        }
    );
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(6)));
}

#[test]
fn test_set_type_change_counts_as_change() {
    let mut state = volume_state();
    assert!(state.set(false, "mixer", "volume", Value::Long(5), None, ids::STATE_CHANGED));
}

#[test]
fn test_clamp_boundaries() {
    let state = volume_state();
    for (input, expected) in [(15, 10), (-5, 0), (7, 7), (0, 0), (10, 10)] {
        let mut value = Value::Int(input);
        state.clamp_value("mixer", "volume", &mut value).unwrap();
        assert_eq!(value, Value::Int(expected), "clamping {input}");
    }
}

#[test]
fn test_clamp_without_range_is_untouched() {
    let state = volume_state();
    let mut value = Value::Int(1000);
    state.clamp_value("mixer", "balance", &mut value).unwrap();
    assert_eq!(value, Value::Int(1000));
}

#[test]
fn test_clamp_rejects_degenerate_range() {
    let mut state = volume_state();
    state.set_range("mixer", "volume", Value::Int(3), Value::Int(3));

    let mut value = Value::Int(9);
    let err = state.clamp_value("mixer", "volume", &mut value).unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));
    assert_eq!(value, Value::Int(9));
}

#[test]
fn test_clamp_string_is_unsupported() {
    let state = volume_state();
    let mut value = Value::from("loud");
    let err = state.clamp_value("mixer", "volume", &mut value).unwrap_err();
    assert!(matches!(err, Error::UnsupportedType(_)));
}

#[test]
fn test_toggle_and_add() {
    let mut state = volume_state();
    state.set(false, "mixer", "mute", Value::Int(0), None, ids::STATE_CHANGED);

    assert_eq!(state.toggle_value("mixer", "mute").unwrap(), Value::Int(1));
    assert_eq!(state.add_value("mixer", "volume", &Value::Int(3)).unwrap(), Value::Int(8));
    assert_eq!(state.add_value("mixer", "volume", &Value::Int(30)).unwrap(), Value::Int(10));
    assert_eq!(state.add_value("mixer", "volume", &Value::Int(-30)).unwrap(), Value::Int(0));

    // Neither helper writes back
    assert_eq!(state.get("mixer", "mute"), Some(&Value::Int(0)));
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(5)));
}

#[test]
fn test_missing_variable_errors() {
    let state = volume_state();
    assert!(matches!(
        state.toggle_value("mixer", "missing"),
        Err(Error::NoSuchVariable { .. })
    ));
    assert!(matches!(
        state.add_value("nowhere", "volume", &Value::Int(1)),
        Err(Error::NoSuchVariable { .. })
    ));
}

#[test]
fn test_get_with_path_context() {
    let mut state = State::new();
    let mut track = crate::Dictionary::new();
    track.set("title", "Blue in Green");
    state.set(false, "player", "track", Value::Dictionary(track), None, ids::STATE_CHANGED);

    assert_eq!(
        state.get("player/track", "title"),
        Some(&Value::from("Blue in Green"))
    );
    assert!(state.get("player/track", "artist").is_none());
    assert!(state.get("player/queue", "title").is_none());
}

#[test]
fn test_apply_skips_ranges() {
    let mut state = volume_state();
    state.set(false, "player", "status", Value::from("playing"), None, ids::STATE_CHANGED);
    let (sink, recorder) = recording_sink(true);

    state.apply(&sink, ids::STATE_CHANGED);
    let changes: Vec<_> = recorder
        .messages()
        .iter()
        .map(|m| StateChange::from_message(m).unwrap())
        .collect();

    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.last));
    assert!(changes.iter().all(|c| c.var != MIN_KEY && c.var != MAX_KEY));

    let (ctx_sink, ctx_recorder) = recording_sink(true);
    state.apply_ctx("player", &ctx_sink, ids::STATE_CHANGED);
    assert_eq!(ctx_recorder.len(), 1);
    state.apply_ctx("missing", &ctx_sink, ids::STATE_CHANGED);
    assert_eq!(ctx_recorder.len(), 1);
}

#[test]
fn test_merge_keeps_ranges_of_both_sides() {
    let mut dst = volume_state();
    let mut src = State::new();
    src.set(false, "mixer", "volume", Value::Int(9), None, ids::STATE_CHANGED);
    src.set(false, "mixer", "mute", Value::Int(1), None, ids::STATE_CHANGED);
    src.set_range("mixer", "balance", Value::Int(-1), Value::Int(1));

    dst.merge(&src);

    assert_eq!(dst.get("mixer", "volume"), Some(&Value::Int(9)));
    assert_eq!(dst.get("mixer", "mute"), Some(&Value::Int(1)));
    assert!(dst.get_range("mixer", "volume").is_some());
    assert!(dst.get_range("mixer", "balance").is_some());
}

#[test]
fn test_handle_set_state_clamps_and_notifies() {
    let mut state = volume_state();
    let (sink, recorder) = recording_sink(true);

    assert!(state.handle_command(&set_state("volume", 15), Some(&*sink)).unwrap());
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(10)));

    let notification = &recorder.messages()[0];
    assert_eq!(notification.kind(), crate::MessageKind::StateChanged);
    assert_eq!(notification.arg(1), Some(&Value::Int(10)));
}

#[test]
fn test_handle_set_state_rel() {
    let mut state = volume_state();
    state.handle_command(&set_state_rel("volume", 2), None).unwrap();
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(7)));
    state.handle_command(&set_state_rel("volume", 100), None).unwrap();
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(10)));

    assert!(matches!(
        state.handle_command(&set_state_rel("missing", 1), None),
        Err(Error::NoSuchVariable { .. })
    ));
}

#[test]
fn test_handle_command_ignores_invalid_range() {
    let mut state = volume_state();
    state.set_range("mixer", "volume", Value::Int(10), Value::Int(0));
    state.handle_command(&set_state("volume", 42), None).unwrap();
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(42)));
}

#[test]
fn test_handle_command_ignores_other_messages() {
    let mut state = volume_state();
    assert!(!state.handle_command(&Message::new(42, 1), None).unwrap());
    let notification = state_message(ids::STATE_CHANGED, true, "mixer", "volume", Value::Int(1));
    assert!(!state.handle_command(&notification, None).unwrap());
    assert_eq!(state.get("mixer", "volume"), Some(&Value::Int(5)));
}

#[test]
fn test_handle_command_rejects_malformed() {
    let mut state = volume_state();
    let mut msg = set_state("volume", 1);
    msg.args.clear();
    assert!(matches!(
        state.handle_command(&msg, None),
        Err(Error::Malformed(_))
    ));
}

#[test]
fn test_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    let state = volume_state();

    state.save(&path).unwrap();
    let loaded = State::load(&path).unwrap();

    assert_eq!(loaded, state);
    assert_eq!(
        loaded.get_range("mixer", "volume"),
        Some((&Value::Int(0), &Value::Int(10)))
    );
}

#[test]
fn test_load_missing_file_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let state = State::load(&temp_dir.path().join("missing.json")).unwrap();
    assert!(state.is_empty());
}
