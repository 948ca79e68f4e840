//! ActionID-scoped event handler sets and the subscription registry
//!
//! A bulk query (e.g. `ContextDump`) answers with a response followed by an
//! unknown number of events tagged with the query's `ActionID`, ending with a
//! sentinel event. An [`EventCollection`] holds the handlers for one such
//! query together with the accumulator they fill in. The reader task routes
//! every event carrying a registered `ActionID` to the matching
//! [`Subscription`], and the collecting task feeds them through
//! [`EventCollection::dispatch`] until a handler reports [`Dispatch::Done`].

use crate::{
    action::ActionId,
    error::{AmiError, AmiResult},
    packet::Packet,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Outcome of handling one event.
#[derive(Debug)]
pub enum Dispatch {
    /// Keep reading events.
    Continue,
    /// The collection is complete.
    Done,
    /// Abort the collection with this error.
    Failed(AmiError),
}

/// Handler bound to one event name.
///
/// Handlers receive the collection's accumulator on every call instead of
/// holding a reference to it, so any number of handlers can build the same
/// result.
pub trait EventHandler<A>: Send {
    /// Event name this handler is bound to (matched ignoring ASCII case).
    fn event_name(&self) -> &str;

    /// Handle one event already verified to carry the collection's `ActionID`.
    fn handle(&mut self, event: &Packet, acc: &mut A) -> Dispatch;
}

/// Handler that ends the collection when its event arrives.
#[derive(Debug, Clone)]
pub struct CompletionSentinel {
    event_name: String,
}

impl CompletionSentinel {
    /// Sentinel for the named terminating event.
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
        }
    }
}

impl<A> EventHandler<A> for CompletionSentinel {
    fn event_name(&self) -> &str {
        &self.event_name
    }

    fn handle(&mut self, _event: &Packet, _acc: &mut A) -> Dispatch {
        Dispatch::Done
    }
}

/// Handler that accepts an event and does nothing with it.
///
/// Useful for header events such as `ContextDump` that carry no data.
#[derive(Debug, Clone)]
pub struct IgnoreEvent {
    event_name: String,
}

impl IgnoreEvent {
    /// Ignore the named event.
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
        }
    }
}

impl<A> EventHandler<A> for IgnoreEvent {
    fn event_name(&self) -> &str {
        &self.event_name
    }

    fn handle(&mut self, _event: &Packet, _acc: &mut A) -> Dispatch {
        Dispatch::Continue
    }
}

/// A set of handlers and the accumulator they build, scoped to one action.
///
/// ```
/// use asterisk_ami_tokio::{
///     ActionId, CompletionSentinel, Dispatch, EventCollection, EventHandler, Packet,
/// };
///
/// struct CountPeers;
///
/// impl EventHandler<u32> for CountPeers {
///     fn event_name(&self) -> &str {
///         "PeerEntry"
///     }
///
///     fn handle(&mut self, _event: &Packet, acc: &mut u32) -> Dispatch {
///         *acc += 1;
///         Dispatch::Continue
///     }
/// }
///
/// let mut collection = EventCollection::for_action(ActionId::new(5), 0u32)
///     .with_handler(CountPeers)
///     .with_handler(CompletionSentinel::new("PeerlistComplete"));
///
/// let peer = Packet::new().with("Event", "PeerEntry").with("ActionID", "5");
/// assert!(matches!(collection.dispatch(&peer), Dispatch::Continue));
///
/// let done = Packet::new().with("Event", "PeerlistComplete").with("ActionID", "5");
/// assert!(matches!(collection.dispatch(&done), Dispatch::Done));
/// assert_eq!(collection.into_accumulator(), 1);
/// ```
pub struct EventCollection<A> {
    action_id: Option<ActionId>,
    accumulator: A,
    handlers: Vec<Box<dyn EventHandler<A>>>,
}

impl<A> std::fmt::Debug for EventCollection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCollection")
            .field("action_id", &self.action_id)
            .field(
                "handlers",
                &self
                    .handlers
                    .iter()
                    .map(|h| h.event_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<A> EventCollection<A> {
    /// Unbound collection. [`AmiClient::collect`](crate::AmiClient::collect)
    /// binds it to the action id it allocates.
    pub fn new(accumulator: A) -> Self {
        Self {
            action_id: None,
            accumulator,
            handlers: Vec::new(),
        }
    }

    /// Collection already bound to `action_id`.
    pub fn for_action(action_id: ActionId, accumulator: A) -> Self {
        let mut collection = Self::new(accumulator);
        collection.bind(action_id);
        collection
    }

    /// Add a handler. Handlers run in the order they were added.
    pub fn with_handler(mut self, handler: impl EventHandler<A> + 'static) -> Self {
        self.handlers
            .push(Box::new(handler));
        self
    }

    /// Scope the collection to `action_id`.
    pub fn bind(&mut self, action_id: ActionId) {
        self.action_id = Some(action_id);
    }

    /// Action id this collection accepts events for.
    pub fn action_id(&self) -> Option<ActionId> {
        self.action_id
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers
            .len()
    }

    /// Current accumulator.
    pub fn accumulator(&self) -> &A {
        &self.accumulator
    }

    /// Route one packet to every handler bound to its event name.
    ///
    /// Packets that are not events, carry no `ActionID`, or carry a different
    /// one are ignored. The first `Failed` stops dispatch immediately; `Done`
    /// is reported after all matching handlers ran.
    pub fn dispatch(&mut self, packet: &Packet) -> Dispatch {
        let Some(action_id) = self.action_id else {
            return Dispatch::Continue;
        };
        if !action_id.matches(packet) {
            trace!("[CORRELATE] Ignoring packet for another action");
            return Dispatch::Continue;
        }
        let Some(event_name) = packet.event() else {
            return Dispatch::Continue;
        };

        let mut outcome = Dispatch::Continue;
        for handler in self
            .handlers
            .iter_mut()
            .filter(|h| {
                h.event_name()
                    .eq_ignore_ascii_case(event_name)
            })
        {
            match handler.handle(packet, &mut self.accumulator) {
                Dispatch::Continue => {}
                Dispatch::Done => {
                    debug!(
                        "[CORRELATE] {} completed ActionID {}",
                        event_name, action_id
                    );
                    outcome = Dispatch::Done;
                }
                Dispatch::Failed(e) => return Dispatch::Failed(e),
            }
        }
        outcome
    }

    /// Consume the collection, returning the accumulator.
    pub fn into_accumulator(self) -> A {
        self.accumulator
    }
}

type Route = mpsc::UnboundedSender<AmiResult<Packet>>;

/// Live packet routes keyed by action id.
///
/// Shared between the client handles and the reader task. The map is only
/// touched under its mutex and never across an await, so a route is either
/// fully registered or absent when the reader looks it up.
#[derive(Default)]
pub(crate) struct Subscriptions {
    routes: Mutex<HashMap<ActionId, Route>>,
}

impl Subscriptions {
    fn routes(&self) -> MutexGuard<'_, HashMap<ActionId, Route>> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a route for `id`. Fails if one is already live.
    pub(crate) fn subscribe(self: &Arc<Self>, id: ActionId) -> AmiResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.routes();
        if routes.contains_key(&id) {
            return Err(AmiError::protocol_error(format!(
                "ActionID {} already has a live subscription",
                id
            )));
        }
        routes.insert(id, tx);
        trace!("[SUBSCRIBE] ActionID {} ({} live)", id, routes.len());
        Ok(Subscription {
            id,
            registry: Arc::clone(self),
            rx,
        })
    }

    fn unsubscribe(&self, id: ActionId) {
        let mut routes = self.routes();
        routes.remove(&id);
        trace!("[UNSUBSCRIBE] ActionID {} ({} live)", id, routes.len());
    }

    /// Hand `packet` to the subscription for `id`, or give it back if none.
    pub(crate) fn route(&self, id: ActionId, packet: Packet) -> Result<(), Packet> {
        let routes = self.routes();
        match routes.get(&id) {
            Some(tx) => match tx.send(Ok(packet)) {
                Ok(()) => Ok(()),
                Err(mpsc::error::SendError(Ok(packet))) => Err(packet),
                Err(mpsc::error::SendError(Err(_))) => Ok(()),
            },
            None => Err(packet),
        }
    }

    /// Deliver an error to every live subscription.
    pub(crate) fn fail_all(&self, make: impl Fn() -> AmiError) {
        for tx in self
            .routes()
            .values()
        {
            let _ = tx.send(Err(make()));
        }
    }

    /// Drop every route so all receivers observe end-of-stream.
    pub(crate) fn close_all(&self) {
        self.routes()
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.routes()
            .len()
    }
}

/// Registration of one action's packet route.
///
/// Dropping it removes the route, so every exit path of a collection
/// (success, error, timeout or the future being dropped) unregisters it.
pub struct Subscription {
    id: ActionId,
    registry: Arc<Subscriptions>,
    rx: mpsc::UnboundedReceiver<AmiResult<Packet>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    /// Action id this subscription receives packets for.
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Next routed packet, or `None` once the reader task has stopped.
    pub async fn recv(&mut self) -> Option<AmiResult<Packet>> {
        self.rx
            .recv()
            .await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry
            .unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Record {
        name: &'static str,
    }

    impl EventHandler<Vec<String>> for Record {
        fn event_name(&self) -> &str {
            self.name
        }

        fn handle(&mut self, event: &Packet, acc: &mut Vec<String>) -> Dispatch {
            acc.push(
                event
                    .get("Exten")
                    .unwrap_or("?")
                    .to_string(),
            );
            Dispatch::Continue
        }
    }

    struct Reject;

    impl EventHandler<Vec<String>> for Reject {
        fn event_name(&self) -> &str {
            "Broken"
        }

        fn handle(&mut self, _event: &Packet, _acc: &mut Vec<String>) -> Dispatch {
            Dispatch::Failed(AmiError::protocol_error("broken event"))
        }
    }

    fn event(name: &str, id: &str, exten: &str) -> Packet {
        Packet::new()
            .with("Event", name)
            .with("ActionID", id)
            .with("Exten", exten)
    }

    fn collection(id: u64) -> EventCollection<Vec<String>> {
        EventCollection::for_action(ActionId::new(id), Vec::new())
            .with_handler(Record {
                name: "ExtensionInfo",
            })
            .with_handler(Reject)
            .with_handler(CompletionSentinel::new("ContextDumpComplete"))
    }

    #[test]
    fn test_dispatch_routes_by_name() {
        let mut c = collection(2);
        assert!(matches!(
            c.dispatch(&event("ExtensionInfo", "2", "100")),
            Dispatch::Continue
        ));
        assert!(matches!(
            c.dispatch(&event("extensioninfo", "2", "101")),
            Dispatch::Continue
        ));
        assert!(matches!(
            c.dispatch(&event("ContextDumpComplete", "2", "")),
            Dispatch::Done
        ));
        assert_eq!(c.into_accumulator(), vec!["100", "101"]);
    }

    #[test]
    fn test_dispatch_ignores_other_action_ids() {
        let mut c = collection(2);
        assert!(matches!(
            c.dispatch(&event("ExtensionInfo", "3", "200")),
            Dispatch::Continue
        ));
        assert!(matches!(
            c.dispatch(&event("ContextDumpComplete", "3", "")),
            Dispatch::Continue
        ));
        let untagged = Packet::new().with("Event", "ContextDumpComplete");
        assert!(matches!(c.dispatch(&untagged), Dispatch::Continue));
        assert!(c
            .accumulator()
            .is_empty());
    }

    #[test]
    fn test_unbound_collection_ignores_everything() {
        let mut c = EventCollection::new(Vec::<String>::new())
            .with_handler(CompletionSentinel::new("ContextDumpComplete"));
        assert!(matches!(
            c.dispatch(&event("ContextDumpComplete", "1", "")),
            Dispatch::Continue
        ));
    }

    #[test]
    fn test_dispatch_failure_propagates() {
        let mut c = collection(2);
        match c.dispatch(&event("Broken", "2", "")) {
            Dispatch::Failed(AmiError::Protocol { message }) => assert_eq!(message, "broken event"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_ignore_event_handler() {
        let mut c = EventCollection::for_action(ActionId::new(1), BTreeMap::<String, u32>::new())
            .with_handler(IgnoreEvent::new("ContextDump"));
        let p = Packet::new()
            .with("Event", "ContextDump")
            .with("ActionID", "1");
        assert!(matches!(c.dispatch(&p), Dispatch::Continue));
        assert_eq!(c.handler_count(), 1);
    }

    #[tokio::test]
    async fn test_subscription_routes_and_unsubscribes_on_drop() {
        let registry = Arc::new(Subscriptions::default());
        let mut sub = registry
            .subscribe(ActionId::new(9))
            .unwrap();
        assert_eq!(registry.len(), 1);

        registry
            .route(ActionId::new(9), event("ExtensionInfo", "9", "100"))
            .unwrap();
        let got = sub
            .recv()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.get("Exten"), Some("100"));

        let unrouted = registry.route(ActionId::new(10), event("ExtensionInfo", "10", "1"));
        assert!(unrouted.is_err());

        drop(sub);
        assert_eq!(registry.len(), 0);
        assert!(registry
            .route(ActionId::new(9), event("ExtensionInfo", "9", "100"))
            .is_err());
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected() {
        let registry = Arc::new(Subscriptions::default());
        let _sub = registry
            .subscribe(ActionId::new(1))
            .unwrap();
        assert!(registry
            .subscribe(ActionId::new(1))
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_close_all_ends_streams() {
        let registry = Arc::new(Subscriptions::default());
        let mut sub = registry
            .subscribe(ActionId::new(4))
            .unwrap();
        registry.fail_all(|| AmiError::ConnectionClosed);
        registry.close_all();

        assert!(matches!(
            sub.recv()
                .await,
            Some(Err(AmiError::ConnectionClosed))
        ));
        assert!(sub
            .recv()
            .await
            .is_none());
    }
}
