//! Command loop thread for a [`Controllable`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use switchboard_types::Message;
use tracing::{debug, info, warn};

use crate::control::Controllable;
use crate::{Error, Result};

/// Owns the thread draining a controllable's queued command sink.
///
/// Each round waits up to the poll interval for commands, runs the ping
/// hook and drains the queue. The loop ends when an iteration returns
/// `false`: on the quit message or when the command callback asks to stop.
#[derive(Debug)]
pub struct Driver {
    name: String,
    controllable: Arc<Controllable>,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    /// Start the command loop on a thread called `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the command sink is synchronous (there is
    /// nothing to drain) and `Error::Io` if the thread cannot be spawned.
    pub fn spawn(
        name: impl Into<String>,
        controllable: Arc<Controllable>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let name = name.into();
        if controllable.cmd_sink().is_sync() {
            return Err(Error::Config(format!(
                "driver {name} needs a queued command sink"
            )));
        }

        let looped = controllable.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(&thread_name, &looped, poll_interval))?;

        info!("Driver {} started", name);
        Ok(Self {
            name,
            controllable,
            poll_interval,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn controllable(&self) -> &Arc<Controllable> {
        &self.controllable
    }

    /// Whether the loop has ended on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Post the quit message and wait for the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        // A loop that already ended leaves nobody to drain a full queue
        let mut quit = Message::quit();
        while !handle.is_finished() {
            match self.controllable.cmd_sink().try_put(quit) {
                Ok(()) => break,
                Err(msg) => {
                    quit = msg;
                    thread::sleep(self.poll_interval);
                }
            }
        }

        if handle.join().is_err() {
            warn!("Driver {} thread panicked", self.name);
        } else {
            info!("Driver {} stopped", self.name);
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(name: &str, controllable: &Controllable, poll_interval: Duration) {
    let cmd_sink = controllable.cmd_sink();
    loop {
        cmd_sink.wait(poll_interval);

        let events = controllable.ping();
        if events > 0 {
            debug!("Driver {} ping produced {} event(s)", name, events);
        }

        if !cmd_sink.iteration() {
            break;
        }
    }
    debug!("Driver {} loop finished", name);
}
