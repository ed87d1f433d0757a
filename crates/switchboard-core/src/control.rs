//! Server and client ends of a control channel.
//!
//! A [`Controllable`] is the server side: it receives commands through its
//! command sink and publishes events through its event hub. A [`Control`] is
//! one client: commands written into its command sink are stamped with the
//! control's id and forwarded to the connected controllable, and the
//! controllable's events reach the control's event sink through the hub.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use switchboard_types::Message;
use tracing::{debug, error, trace, warn};

use crate::function::add_function_tag;
use crate::hub::Hub;
use crate::sink::Sink;
use crate::utils::{duration_millis, lock, new_id};
use crate::{Error, Result};

/// Delay between reply polls of [`Controllable::call_function`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Periodic hook run by the driver loop. Returns how many events it produced.
pub type PingCallback = Box<dyn FnMut() -> usize + Send>;

pub struct Controllable {
    cmd_sink: Arc<Sink>,
    evt_hub: Hub,
    ping: Mutex<Option<PingCallback>>,
}

impl Controllable {
    #[must_use]
    pub fn new(cmd_sink: Arc<Sink>, evt_hub: Hub) -> Self {
        Self {
            cmd_sink,
            evt_hub,
            ping: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn cmd_sink(&self) -> &Arc<Sink> {
        &self.cmd_sink
    }

    #[must_use]
    pub fn evt_hub(&self) -> &Hub {
        &self.evt_hub
    }

    /// Ingress of the event hub: events written here reach every control.
    #[must_use]
    pub fn evt_sink(&self) -> &Arc<Sink> {
        self.evt_hub.sink()
    }

    /// Attach `control`. Its commands are forwarded here from now on and its
    /// event sink (if any) subscribes to the event hub, receiving the cached
    /// state first.
    pub fn connect(&self, control: &Control) {
        {
            let mut target = lock(&control.shared.target);
            if target.is_some() {
                warn!("Control {} is already connected", control.id());
                return;
            }
            *target = Some(self.cmd_sink.clone());
        }

        if let Some(evt_sink) = &control.shared.evt_sink {
            self.evt_hub.connect_sink(evt_sink);
        }
        debug!("Control {} connected", control.id());
    }

    /// Detach `control`. Controls that are not connected to this
    /// controllable are left alone.
    pub fn disconnect(&self, control: &Control) {
        {
            let mut target = lock(&control.shared.target);
            let connected_here = match target.as_ref() {
                None => {
                    debug!("Control {} is not connected", control.id());
                    return;
                }
                Some(sink) => Arc::ptr_eq(sink, &self.cmd_sink),
            };
            if !connected_here {
                debug!("Control {} is connected elsewhere", control.id());
                return;
            }
            *target = None;
        }

        if let Some(evt_sink) = &control.shared.evt_sink {
            self.evt_hub.disconnect_sink(evt_sink);
        }
        debug!("Control {} disconnected", control.id());
    }

    pub fn set_ping<F>(&self, ping: F)
    where
        F: FnMut() -> usize + Send + 'static,
    {
        *lock(&self.ping) = Some(Box::new(ping));
    }

    /// Run the ping hook. Returns 0 when none is installed.
    pub fn ping(&self) -> usize {
        lock(&self.ping).as_mut().map_or(0, |ping| ping())
    }

    /// Synchronous call over the asynchronous channel.
    ///
    /// `msg` is tagged with a function tag and sent through a temporary
    /// control. `reply_cb` sees everything that control receives (cached
    /// state included) and returns `false` once it has consumed the matching
    /// reply, which ends the call successfully.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if `reply_cb` has not stopped the call within
    /// `timeout`.
    pub fn call_function<F>(&self, msg: Message, reply_cb: F, timeout: Duration) -> Result<()>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        self.call_function_with(msg, reply_cb, timeout, DEFAULT_POLL_INTERVAL)
    }

    /// [`Controllable::call_function`] with an explicit poll interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if `reply_cb` has not stopped the call within
    /// `timeout`.
    pub fn call_function_with<F>(
        &self,
        mut msg: Message,
        reply_cb: F,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        add_function_tag(&mut msg);

        let evt_sink = Sink::queued(reply_cb);
        let control = Control::new(Some(evt_sink.clone()));
        self.connect(&control);

        control.cmd_sink().put(msg);
        let result = poll_reply(&evt_sink, timeout, poll_interval);

        self.disconnect(&control);
        result
    }
}

fn poll_reply(evt_sink: &Sink, timeout: Duration, poll_interval: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if !evt_sink.iteration() {
            trace!("Function call finished after {:?}", start.elapsed());
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            let timeout_ms = duration_millis(timeout);
            error!("Function call timed out after {} ms", timeout_ms);
            return Err(Error::Timeout { timeout_ms });
        }
        evt_sink.wait(poll_interval.min(timeout - elapsed));
    }
}

impl fmt::Debug for Controllable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controllable")
            .field("cmd_sink", &self.cmd_sink)
            .field("evt_hub", &self.evt_hub)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Unconnected,
    Connected,
}

struct ControlShared {
    id: String,
    evt_sink: Option<Arc<Sink>>,
    target: Mutex<Option<Arc<Sink>>>,
}

impl ControlShared {
    fn handle_message_cmd(&self, msg: &Message) -> bool {
        let mut msg = msg.clone();
        match msg.client_id().map(str::to_owned) {
            None => msg.set_client_id(self.id.clone()),
            Some(foreign) => {
                if let Some(evt_sink) = &self.evt_sink {
                    evt_sink.add_route(&foreign);
                }
            }
        }

        let target = lock(&self.target).clone();
        match target {
            Some(target) => {
                target.put(msg);
            }
            None => debug!("Control {} is not connected, dropping command", self.id),
        }
        true
    }
}

pub struct Control {
    shared: Arc<ControlShared>,
    cmd_sink: Arc<Sink>,
}

impl Control {
    /// Create an unconnected control with a fresh id. Without an event sink
    /// the control can only send.
    #[must_use]
    pub fn new(evt_sink: Option<Arc<Sink>>) -> Self {
        let id = new_id();
        if let Some(evt_sink) = &evt_sink {
            evt_sink.set_id(id.clone());
        }

        let shared = Arc::new(ControlShared {
            id: id.clone(),
            evt_sink,
            target: Mutex::new(None),
        });

        let forward = shared.clone();
        let cmd_sink = Sink::synchronous(move |msg: &Message| forward.handle_message_cmd(msg));
        cmd_sink.set_id(id);

        Self { shared, cmd_sink }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Synchronous sink forwarding commands to the connected controllable.
    #[must_use]
    pub fn cmd_sink(&self) -> &Arc<Sink> {
        &self.cmd_sink
    }

    #[must_use]
    pub fn evt_sink(&self) -> Option<&Arc<Sink>> {
        self.shared.evt_sink.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> ControlState {
        if lock(&self.shared.target).is_some() {
            ControlState::Connected
        } else {
            ControlState::Unconnected
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ControlState::Connected
    }

    /// Send a command to the connected controllable.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the control is not connected.
    pub fn send(&self, msg: Message) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.cmd_sink.put(msg);
        Ok(())
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Control {} dropped while still connected", self.shared.id);
        }
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
