//! Fan-out point with its own ingress sink.
//!
//! Everything written into the hub's sink is forwarded to the connected
//! subscriber sinks: to the first subscriber that owns the message's
//! `client_id`, or to all of them when the message is not addressed. The hub
//! also caches every `StateChanged` it forwards and replays that snapshot to
//! subscribers as they connect.
//!
//! The subscriber list is locked for the whole of a delivery, so forwards,
//! connects and disconnects are serialized. A subscriber callback must
//! therefore never connect or disconnect sinks on the hub that is calling it.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use switchboard_types::{Message, MessageKind, ids};
use tracing::{debug, trace, warn};

use crate::routing::DEFAULT_ROUTING_CAPACITY;
use crate::sink::{Sink, SinkMode};
use crate::state::{State, StateChange};
use crate::utils::lock;

type ConnectCallback = Box<dyn Fn(&Arc<Sink>) + Send + Sync>;

struct HubShared {
    subscribers: Mutex<Vec<Weak<Sink>>>,
    state: Mutex<State>,
    on_connect: Mutex<Option<ConnectCallback>>,
}

impl HubShared {
    fn forward(&self, msg: &Message) {
        let mut subscribers = lock(&self.subscribers);

        if msg.kind() == MessageKind::StateChanged {
            self.cache_state(msg);
        }

        let before = subscribers.len();
        subscribers.retain(|sink| sink.strong_count() > 0);
        let pruned = before - subscribers.len();
        if pruned > 0 {
            warn!("Pruned {} dropped subscriber(s) that were never disconnected", pruned);
        }

        match msg.client_id() {
            Some(client_id) => {
                let target = subscribers
                    .iter()
                    .filter_map(Weak::upgrade)
                    .find(|sink| sink.has_id(client_id));
                match target {
                    Some(sink) => {
                        trace!("Routing message {}:{} to {}", msg.namespace, msg.id, client_id);
                        sink.put_copy(msg);
                    }
                    None => debug!("No subscriber owns client id {}, dropping", client_id),
                }
            }
            None => {
                for sink in subscribers.iter().filter_map(Weak::upgrade) {
                    if !sink.put_copy(msg) {
                        trace!("Subscriber rejected message {}:{}", msg.namespace, msg.id);
                    }
                }
            }
        }
    }

    fn cache_state(&self, msg: &Message) {
        match StateChange::from_message(msg) {
            Ok(change) => {
                let mut state = lock(&self.state);
                state.set(
                    false,
                    &change.context,
                    &change.var,
                    change.value,
                    None,
                    ids::STATE_CHANGED,
                );
            }
            Err(e) => warn!("Not caching malformed state message: {}", e),
        }
    }
}

#[derive(Clone)]
pub struct Hub {
    ingress: Arc<Sink>,
    shared: Arc<HubShared>,
}

impl Hub {
    /// Create a hub whose ingress sink is synchronous (`sync == true`) or
    /// queued. A queued hub forwards only when [`Hub::iteration`] runs.
    #[must_use]
    pub fn new(sync: bool) -> Self {
        let mode = if sync {
            SinkMode::Synchronous
        } else {
            SinkMode::Queued { capacity: None }
        };
        Self::with_mode(mode)
    }

    #[must_use]
    pub fn with_mode(mode: SinkMode) -> Self {
        let shared = Arc::new(HubShared {
            subscribers: Mutex::new(Vec::new()),
            state: Mutex::new(State::default()),
            on_connect: Mutex::new(None),
        });

        // The ingress holds the shared half weakly; the hub owns both.
        let weak: Weak<HubShared> = Arc::downgrade(&shared);
        let ingress = Sink::with_mode(
            move |msg: &Message| {
                if let Some(shared) = weak.upgrade() {
                    shared.forward(msg);
                }
                true
            },
            mode,
            DEFAULT_ROUTING_CAPACITY,
        );

        Self { ingress, shared }
    }

    /// The ingress sink. Messages written here reach the subscribers.
    #[must_use]
    pub fn sink(&self) -> &Arc<Sink> {
        &self.ingress
    }

    /// Subscribe `sink`. It first receives the cached state as
    /// `StateChanged` messages, then every forwarded message.
    pub fn connect_sink(&self, sink: &Arc<Sink>) {
        {
            let mut subscribers = lock(&self.shared.subscribers);
            if subscribers
                .iter()
                .any(|known| std::ptr::eq(known.as_ptr(), Arc::as_ptr(sink)))
            {
                debug!("Sink already connected, ignoring");
                return;
            }
            subscribers.push(Arc::downgrade(sink));

            let state = lock(&self.shared.state);
            state.apply(sink, ids::STATE_CHANGED);
            trace!("Connected sink, {} subscriber(s)", subscribers.len());
        }

        if let Some(on_connect) = lock(&self.shared.on_connect).as_ref() {
            on_connect(sink);
        }
    }

    /// Unsubscribe `sink`. Returns whether it was connected.
    pub fn disconnect_sink(&self, sink: &Arc<Sink>) -> bool {
        let mut subscribers = lock(&self.shared.subscribers);
        let Some(pos) = subscribers
            .iter()
            .position(|known| std::ptr::eq(known.as_ptr(), Arc::as_ptr(sink)))
        else {
            debug!("Disconnecting sink that is not connected");
            return false;
        };
        subscribers.remove(pos);
        trace!("Disconnected sink, {} subscriber(s)", subscribers.len());
        true
    }

    /// Fill one fresh message per connected subscriber and put it straight
    /// into that subscriber, bypassing the ingress sink and the state cache.
    /// Returns the number of subscribers written to.
    pub fn send_cb<F>(&self, mut fill: F) -> usize
    where
        F: FnMut(&mut Message),
    {
        let subscribers = lock(&self.shared.subscribers);
        let mut sent = 0;
        for sink in subscribers.iter().filter_map(Weak::upgrade) {
            let mut msg = sink.get();
            fill(&mut msg);
            if !sink.put(msg) {
                trace!("Subscriber rejected filled message");
            }
            sent += 1;
        }
        sent
    }

    /// Called after every new subscriber has received the state snapshot.
    pub fn set_connect_callback<F>(&self, callback: F)
    where
        F: Fn(&Arc<Sink>) + Send + Sync + 'static,
    {
        *lock(&self.shared.on_connect) = Some(Box::new(callback));
    }

    /// Connected subscribers, not counting dropped ones not yet pruned.
    #[must_use]
    pub fn num_sinks(&self) -> usize {
        lock(&self.shared.subscribers)
            .iter()
            .filter(|sink| sink.strong_count() > 0)
            .count()
    }

    /// Copy of the cached state snapshot.
    #[must_use]
    pub fn state(&self) -> State {
        lock(&self.shared.state).clone()
    }

    /// Forward the queued messages of a queued hub.
    pub fn iteration(&self) -> bool {
        self.ingress.iteration()
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("ingress", &self.ingress)
            .field("subscribers", &self.num_sinks())
            .finish_non_exhaustive()
    }
}
