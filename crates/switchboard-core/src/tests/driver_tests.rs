//! Tests for a driver-hosted controllable serving several controls

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::fixtures::{Recorder, recording_sink, wait_until};
use crate::state::state_message;
use crate::{
    Control, Controllable, Driver, Hub, Message, MessageKind, Sink, State, StateChange, Value, ids,
};

/// Mixer server: applies state commands and announces the results
fn mixer() -> Arc<Controllable> {
    let hub = Hub::new(true);
    let events = hub.clone();
    let mut state = State::new();
    state.set(false, "mixer", "volume", Value::Int(5), Some(&**hub.sink()), ids::STATE_CHANGED);
    state.set_range("mixer", "volume", Value::Int(0), Value::Int(10));

    let cmd_sink = Sink::queued(move |msg: &Message| {
        if let Err(e) = state.handle_command(msg, Some(&**events.sink())) {
            warn!("Mixer rejected command: {}", e);
        }
        true
    });
    Arc::new(Controllable::new(cmd_sink, hub))
}

fn client(server: &Controllable) -> (Control, Recorder) {
    let (evt_sink, recorder) = recording_sink(true);
    let control = Control::new(Some(evt_sink));
    server.connect(&control);
    (control, recorder)
}

fn volumes(recorder: &Recorder) -> Vec<Value> {
    recorder
        .messages()
        .iter()
        .filter(|m| m.kind() == MessageKind::StateChanged)
        .filter_map(|m| StateChange::from_message(m).ok())
        .filter(|c| c.var == "volume")
        .map(|c| c.value)
        .collect()
}

#[test]
fn test_state_commands_reach_every_client() {
    let server = mixer();
    let driver = Driver::spawn("mixer", server.clone(), Duration::from_millis(5)).unwrap();

    let (a, seen_a) = client(&server);
    let (b, seen_b) = client(&server);
    assert_eq!(volumes(&seen_a), vec![Value::Int(5)]);

    a.send(state_message(ids::CMD_SET_STATE, false, "mixer", "volume", Value::Int(15)))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || volumes(&seen_b).len() == 2));
    assert_eq!(volumes(&seen_b), vec![Value::Int(5), Value::Int(10)]);

    b.send(state_message(ids::CMD_SET_STATE_REL, false, "mixer", "volume", Value::Int(-3)))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || volumes(&seen_a).len() == 3));
    assert_eq!(volumes(&seen_a).last(), Some(&Value::Int(7)));

    // A late client starts from the current value
    let (c, seen_c) = client(&server);
    assert_eq!(volumes(&seen_c), vec![Value::Int(7)]);
    assert_eq!(server.evt_hub().state().get("mixer", "volume"), Some(&Value::Int(7)));

    for control in [&a, &b, &c] {
        server.disconnect(control);
    }
    driver.stop();
}

#[test]
fn test_unchanged_value_is_not_rebroadcast() {
    let server = mixer();
    let driver = Driver::spawn("mixer", server.clone(), Duration::from_millis(5)).unwrap();
    let (a, seen) = client(&server);

    a.send(state_message(ids::CMD_SET_STATE, false, "mixer", "volume", Value::Int(5)))
        .unwrap();
    a.send(state_message(ids::CMD_SET_STATE, false, "mixer", "volume", Value::Int(6)))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || volumes(&seen).len() == 2));
    assert_eq!(volumes(&seen), vec![Value::Int(5), Value::Int(6)]);

    server.disconnect(&a);
    driver.stop();
}

#[test]
fn test_function_call_served_by_driver() {
    let hub = Hub::new(true);
    let events = hub.clone();
    let cmd_sink = Sink::queued(move |msg: &Message| {
        let mut reply = Message::new(msg.namespace, msg.id + 1);
        reply.copy_header_field(msg, crate::keys::CLIENT_ID);
        crate::copy_function_tag(&mut reply, msg);
        events.sink().put(reply);
        true
    });
    let server = Arc::new(Controllable::new(cmd_sink, hub));
    let driver = Driver::spawn("rpc", server.clone(), Duration::from_millis(5)).unwrap();

    let result = server.call_function(
        Message::new(42, 60),
        |msg: &Message| msg.id != 61,
        Duration::from_secs(5),
    );
    assert!(result.is_ok());
    assert_eq!(server.evt_hub().num_sinks(), 0);

    driver.stop();
}
