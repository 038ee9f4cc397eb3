//! Pub/Sub action bus for peripheral UI (menus, sidebars, toolbars).
//!
//! Peripheral widgets publish named actions ("open the create-group flow")
//! without holding a reference to the controller that owns the selection.
//! The bus is constructed explicitly and handed to whoever needs it; there is
//! no process-wide instance.
//!
//! Delivery is synchronous, in subscription order, to every handler
//! subscribed to that name when `publish` starts. Publishing a name nobody
//! listens to is a no-op. Handlers may subscribe/unsubscribe from inside a
//! callback: the handler list is snapshotted before delivery.
//!
//! Subscribers that go away must call [`Subscription::unsubscribe`]; the bus
//! does no lifecycle tracking of its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use log::trace;
use serde_json::Value;

/// Type-erased handler. Payload is optional, most actions carry none.
type Handler = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

type Registry = RwLock<HashMap<String, Vec<(u64, Handler)>>>;

/// Actions the sidebar and navbar publish. Each is a zero-payload request;
/// the controller checks preconditions before opening anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppAction {
    OpenCreateGroup,
    OpenAddProperty,
    OpenCreateGroupCode,
    OpenCreateBookingFromSidebar,
    OpenJoinGroup,
}

impl AppAction {
    pub const ALL: [AppAction; 5] = [
        AppAction::OpenCreateGroup,
        AppAction::OpenAddProperty,
        AppAction::OpenCreateGroupCode,
        AppAction::OpenCreateBookingFromSidebar,
        AppAction::OpenJoinGroup,
    ];

    /// Event name on the bus.
    pub fn name(&self) -> &'static str {
        match self {
            AppAction::OpenCreateGroup => "openCreateGroupModal",
            AppAction::OpenAddProperty => "openAddPropertyModal",
            AppAction::OpenCreateGroupCode => "openCreateGroupCodeModal",
            AppAction::OpenCreateBookingFromSidebar => "openCreateBookingModalFromSidebar",
            AppAction::OpenJoinGroup => "openJoinGroupModal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for AppAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multi-subscriber pub/sub channel keyed by event name.
///
/// Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct ActionBus {
    subscribers: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for ActionBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBus")
            .field("event_names", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}

impl ActionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `name`. Keep the returned handle and call
    /// `unsubscribe` when the subscriber is torn down.
    ///
    /// # Example
    /// ```ignore
    /// let sub = bus.subscribe(AppAction::OpenJoinGroup.name(), move |_| {
    ///     tx.send(AppAction::OpenJoinGroup).ok();
    /// });
    /// // ... on teardown:
    /// sub.unsubscribe();
    /// ```
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        trace!("ActionBus: subscriber {} added for {}", id, name);

        Subscription {
            registry: Arc::downgrade(&self.subscribers),
            name,
            id,
        }
    }

    /// Deliver `payload` to every current subscriber of `name`, in
    /// subscription order.
    pub fn publish(&self, name: &str, payload: Option<&Value>) {
        // Snapshot so handlers can (un)subscribe without deadlocking
        let handlers: Vec<Handler> = match self.subscribers.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            Some(entries) => entries.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        trace!("ActionBus: {} -> {} subscriber(s)", name, handlers.len());
        for handler in handlers {
            handler(payload);
        }
    }

    /// Publish one of the known app actions (no payload).
    pub fn publish_action(&self, action: AppAction) {
        self.publish(action.name(), None);
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Handle returned by [`ActionBus::subscribe`].
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe() on teardown"]
pub struct Subscription {
    registry: Weak<Registry>,
    name: String,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    /// Remove the handler. No-op if the bus is already gone.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut map = registry.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = map.get_mut(&self.name) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                map.remove(&self.name);
            }
        }
        trace!("ActionBus: subscriber {} removed from {}", self.id, self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_publish_reaches_subscribers_in_order() {
        let bus = ActionBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l1 = Arc::clone(&log);
        let s1 = bus.subscribe("openJoinGroupModal", move |_| l1.lock().unwrap().push(1));
        let l2 = Arc::clone(&log);
        let s2 = bus.subscribe("openJoinGroupModal", move |_| l2.lock().unwrap().push(2));

        bus.publish_action(AppAction::OpenJoinGroup);
        bus.publish_action(AppAction::OpenJoinGroup);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 1, 2]);

        s1.unsubscribe();
        s2.unsubscribe();
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = ActionBus::new();
        bus.publish("nobodyListens", None);
        assert_eq!(bus.subscriber_count("nobodyListens"), 0);
    }

    #[test]
    fn test_names_are_isolated() {
        let bus = ActionBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let sub = bus.subscribe(AppAction::OpenCreateGroup.name(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish_action(AppAction::OpenAddProperty);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        bus.publish_action(AppAction::OpenCreateGroup);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = ActionBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let sub = bus.subscribe("tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = Arc::clone(&counter);
        let keep = bus.subscribe("tick", move |_| {
            c.fetch_add(10, Ordering::SeqCst);
        });

        bus.publish("tick", None);
        sub.unsubscribe();
        bus.publish("tick", None);

        assert_eq!(counter.load(Ordering::SeqCst), 21);
        assert_eq!(bus.subscriber_count("tick"), 1);
        keep.unsubscribe();
        assert_eq!(bus.subscriber_count("tick"), 0);
    }

    #[test]
    fn test_payload_delivered() {
        let bus = ActionBus::new();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let sub = bus.subscribe("withPayload", move |payload| {
            *s.lock().unwrap() = payload.cloned();
        });
        bus.publish("withPayload", Some(&serde_json::json!({"date": "2024-06-01"})));
        assert_eq!(seen.lock().unwrap().as_ref().unwrap()["date"], "2024-06-01");
        sub.unsubscribe();
    }

    #[test]
    fn test_handler_may_subscribe_during_publish() {
        let bus = ActionBus::new();
        let inner_bus = bus.clone();
        let sub = bus.subscribe("outer", move |_| {
            // would deadlock if publish held the lock
            inner_bus.subscribe("inner", |_| {}).unsubscribe();
        });
        bus.publish("outer", None);
        sub.unsubscribe();
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = ActionBus::new();
        let sub = bus.subscribe("x", |_| {});
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in AppAction::ALL {
            assert_eq!(AppAction::from_name(action.name()), Some(action));
        }
        assert_eq!(AppAction::from_name("openSomethingElse"), None);
    }
}
