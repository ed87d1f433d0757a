//! Mixer demo: one controllable on a driver thread, several clients.
//!
//! The mixer keeps `mixer/volume` (0..=100) and `mixer/mute` in a state
//! store, applies `SetState`/`SetStateRel` commands and answers a
//! `describe` function call with its full state.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use switchboard_core::config::BusConfig;
use switchboard_core::state::state_message;
use switchboard_core::{
    Control, Controllable, Dictionary, Driver, Hub, Message, MessageKind, Sink, State,
    StateChange, Value, add_function_tag, copy_function_tag, ids, is_reply_to, keys,
};
use tracing::{debug, info, warn};

/// Namespace of the demo's own messages
const NS_MIXER: u32 = 100;
const FN_DESCRIBE: u32 = 1;
const FN_DESCRIBE_REPLY: u32 = 2;

const CONTEXT: &str = "mixer";

fn initial_state() -> State {
    let mut state = State::new();
    state.set(false, CONTEXT, "volume", Value::Int(50), None, ids::STATE_CHANGED);
    state.set(false, CONTEXT, "mute", Value::Int(0), None, ids::STATE_CHANGED);
    state.set_range(CONTEXT, "volume", Value::Int(0), Value::Int(100));
    state
}

fn describe_reply(request: &Message, state: &State) -> Message {
    let mut reply = Message::new(NS_MIXER, FN_DESCRIBE_REPLY);
    reply.copy_header_field(request, keys::CLIENT_ID);
    copy_function_tag(&mut reply, request);
    reply.push_arg(Value::Dictionary(state.as_dictionary().clone()));
    reply
}

/// Build the mixer controllable. Its command sink is queued so a driver can
/// host it.
fn mixer(config: &BusConfig) -> Arc<Controllable> {
    let hub = Hub::new(true);
    let events = hub.sink().clone();
    let mut state = initial_state();
    state.apply(&events, ids::STATE_CHANGED);

    let cmd_sink = Sink::with_mode(
        move |msg: &Message| {
            match state.handle_command(msg, Some(&*events)) {
                Ok(true) => {}
                Ok(false) if msg.namespace == NS_MIXER && msg.id == FN_DESCRIBE => {
                    debug!("describe requested by {:?}", msg.client_id());
                    events.put(describe_reply(msg, &state));
                }
                Ok(false) => debug!("Mixer ignores message {}:{}", msg.namespace, msg.id),
                Err(e) => warn!("Mixer rejected command: {}", e),
            }
            true
        },
        config.queued_mode(),
        config.routing.table_capacity,
    );

    Arc::new(Controllable::new(cmd_sink, hub))
}

struct Client {
    control: Control,
    log: Arc<Mutex<Vec<String>>>,
}

impl Client {
    fn connect(server: &Controllable) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_cb = log.clone();
        let evt_sink = Sink::queued(move |msg: &Message| {
            if msg.kind() == MessageKind::StateChanged
                && let Ok(change) = StateChange::from_message(msg)
                && let Ok(mut log) = log_cb.lock()
            {
                log.push(format!(
                    "{}/{} = {}",
                    change.context,
                    change.var,
                    show(&change.value)
                ));
            }
            true
        });

        let control = Control::new(Some(evt_sink));
        server.connect(&control);
        Self { control, log }
    }

    fn set(&self, var: &str, value: Value) -> Result<()> {
        self.control
            .send(state_message(ids::CMD_SET_STATE, false, CONTEXT, var, value))?;
        Ok(())
    }

    fn add(&self, var: &str, delta: Value) -> Result<()> {
        self.control
            .send(state_message(ids::CMD_SET_STATE_REL, false, CONTEXT, var, delta))?;
        Ok(())
    }

    fn drain(&self) -> Vec<String> {
        if let Some(evt_sink) = self.control.evt_sink() {
            evt_sink.iteration();
        }
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

fn show(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::String(s) => format!("{s:?}"),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.type_name().to_string()),
    }
}

fn describe(server: &Controllable, config: &BusConfig, timeout: Duration) -> Result<Dictionary> {
    let mut request = Message::new(NS_MIXER, FN_DESCRIBE);
    add_function_tag(&mut request);
    let expected = request.clone();

    let reply = Arc::new(Mutex::new(None));
    let reply_cb = reply.clone();
    server
        .call_function_with(
            request,
            move |msg: &Message| {
                if !is_reply_to(msg, &expected) {
                    return true;
                }
                if let Ok(mut reply) = reply_cb.lock() {
                    *reply = msg.arg(0).and_then(Value::as_dictionary).cloned();
                }
                false
            },
            timeout,
            config.function.poll_interval(),
        )
        .context("describe call failed")?;

    let reply = reply.lock().map(|mut reply| reply.take()).unwrap_or_default();
    match reply {
        Some(dict) => Ok(dict),
        None => bail!("describe reply carried no state"),
    }
}

/// Run the demo with `clients` connected controls.
///
/// # Errors
///
/// Returns an error if the driver cannot start, a command cannot be sent,
/// the describe call fails or the state snapshot cannot be saved.
pub fn run(
    config: &BusConfig,
    clients: usize,
    timeout: Duration,
    save_state: Option<&Path>,
) -> Result<()> {
    let server = mixer(config);
    let driver = Driver::spawn("mixer", server.clone(), config.driver.poll_interval())?;

    let clients: Vec<Client> = (0..clients.max(1)).map(|_| Client::connect(&server)).collect();
    info!("Connected {} client(s)", clients.len());

    clients[0].set("volume", Value::Int(80))?;
    clients[clients.len() - 1].add("volume", Value::Int(-30))?;
    clients[0].set("mute", Value::Int(1))?;
    // Above the range; clamped to 100
    clients[clients.len() / 2].set("volume", Value::Int(250))?;

    // Commands are handled in order, so the reply implies all of them ran
    let snapshot = describe(&server, config, timeout)?;
    println!("mixer state: {}", serde_json::to_string(&snapshot)?);

    for client in &clients {
        println!("client {}:", client.control.id());
        for line in client.drain() {
            println!("  {line}");
        }
    }

    if let Some(path) = save_state {
        server
            .evt_hub()
            .state()
            .save(path)
            .with_context(|| format!("Failed to save state to {}", path.display()))?;
        println!("state saved to {}", path.display());
    }

    for client in &clients {
        server.disconnect(&client.control);
    }
    driver.stop();
    Ok(())
}
