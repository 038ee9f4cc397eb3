//! SyncEngine: keeps the store in step with the selection.
//!
//! Every selection change goes through [`SyncEngine::enter`], which diffs the
//! old and new selection and issues the fetches the new one needs. Fetches are
//! tagged with their [`FetchScope`]; on completion a response is applied only
//! if its ticket is still the newest for its slot and its scope still matches
//! the current selection. Everything else is dropped.
//!
//! The engine is driven from one thread. Completions are pulled in by
//! [`SyncEngine::pump`] (UI frame) or [`SyncEngine::wait_idle`] (CLI), so
//! no two handlers ever interleave.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::dispatch::{Completion, Dispatcher, Job};
use super::request::{ApiCall, ApiReply, FetchScope, FetchSlot, Mutation, Ticket};
use crate::entities::{
    BookingScope, EntityStore, GroupId, PropertyChoice, PropertyId, Selection, SelectionError, SelectionInput,
    UserId,
};
use crate::transport::TransportError;

/// What happened while the engine ran. Drained by [`SyncEngine::pump`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SelectionChanged { from: Selection, to: Selection },
    GroupsLoaded { count: usize },
    PropertiesLoaded { group: GroupId, count: usize },
    BookingsLoaded { scope: BookingScope, count: usize },
    /// A current fetch failed. Previous data is kept.
    FetchFailed { scope: FetchScope, error: TransportError },
    MutationSucceeded { mutation: Mutation, reply: ApiReply },
    MutationFailed { mutation: Mutation, error: TransportError },
}

#[derive(Debug)]
struct Pending {
    call: ApiCall,
    /// Groups fetches only: may auto-select the first group.
    auto_select: bool,
}

pub struct SyncEngine {
    store: EntityStore,
    selection: Selection,
    user: Option<UserId>,
    dispatcher: Box<dyn Dispatcher>,
    next_ticket: u64,
    in_flight: HashMap<Ticket, Pending>,
    latest: HashMap<FetchSlot, Ticket>,
    /// First groups load of the session has been applied.
    hydrated: bool,
    events: Vec<SyncEvent>,
}

impl SyncEngine {
    pub fn new(dispatcher: Box<dyn Dispatcher>) -> Self {
        Self {
            store: EntityStore::new(),
            selection: Selection::NoGroup,
            user: None,
            dispatcher,
            next_ticket: 0,
            in_flight: HashMap::new(),
            latest: HashMap::new(),
            hydrated: false,
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Any request still outstanding.
    pub fn is_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    // ========== Session ==========

    /// Begin a session for `user` and start the initial cascade.
    pub fn start_session(&mut self, user: UserId) {
        if self.user.is_some() {
            self.end_session();
        }
        info!("Session started for user {}", user);
        self.user = Some(user);
        self.hydrated = false;
        self.refresh_groups(true);
    }

    /// Drop all data and forget every outstanding request.
    pub fn end_session(&mut self) {
        if let Some(user) = self.user.take() {
            info!("Session ended for user {}", user);
        }
        self.dispatcher.invalidate();
        self.in_flight.clear();
        self.latest.clear();
        self.hydrated = false;
        self.store.clear();
        let from = std::mem::take(&mut self.selection);
        if from != Selection::NoGroup {
            self.events.push(SyncEvent::SelectionChanged { from, to: Selection::NoGroup });
        }
    }

    // ========== Selection ==========

    pub fn select_group(&mut self, group: Option<GroupId>) -> Result<(), SelectionError> {
        self.advance(SelectionInput::ChooseGroup(group))
    }

    pub fn select_property(&mut self, choice: Option<PropertyChoice>) -> Result<(), SelectionError> {
        self.advance(SelectionInput::ChooseProperty(choice))
    }

    fn advance(&mut self, input: SelectionInput) -> Result<(), SelectionError> {
        let next = self.selection.transition(input, &self.store)?;
        self.enter(next);
        Ok(())
    }

    /// Apply a new selection and issue whatever it needs.
    fn enter(&mut self, next: Selection) {
        if next == self.selection {
            return;
        }
        let prev = std::mem::replace(&mut self.selection, next.clone());
        debug!("Selection: {} -> {}", prev, next);

        if prev.group() != next.group() {
            // Old group's bookings go before the new cascade starts
            if let Some(old) = prev.group() {
                self.store.clear_bookings_for_group(old);
            }
            if let Some(group) = next.group() {
                self.fetch(FetchScope::Properties { group: group.clone() });
            }
        }

        if let Some(scope) = next.booking_scope() {
            if prev.booking_scope().as_ref() != Some(&scope) {
                self.fetch(FetchScope::Bookings(scope));
            }
        }

        self.events.push(SyncEvent::SelectionChanged { from: prev, to: next });
    }

    // ========== Refresh ==========

    /// Re-fetch the user's groups. `auto_select` lets the reply pick the
    /// first group when none is selected.
    pub fn refresh_groups(&mut self, auto_select: bool) {
        let Some(user) = self.user.clone() else {
            debug!("refresh_groups: no session");
            return;
        };
        self.issue(ApiCall::Fetch(FetchScope::Groups { user }), auto_select);
    }

    /// Re-fetch groups, the selected group's properties and the visible
    /// bookings.
    pub fn refresh_current(&mut self) {
        if self.user.is_none() {
            return;
        }
        self.refresh_groups(!self.hydrated);
        if let Some(group) = self.selection.group().cloned() {
            self.fetch(FetchScope::Properties { group });
        }
        self.refresh_bookings();
    }

    /// Re-fetch only the visible bookings.
    pub fn refresh_bookings(&mut self) {
        if let Some(scope) = self.selection.booking_scope() {
            self.fetch(FetchScope::Bookings(scope));
        }
    }

    // ========== Mutations ==========

    pub fn submit(&mut self, mutation: Mutation) -> Ticket {
        info!("Submitting {}", mutation.label());
        self.issue(ApiCall::Mutate(mutation), false)
    }

    /// Clear a property's color locally right away, then ask the server to
    /// clear it too. The local clear is not rolled back if the server call
    /// fails.
    pub fn reset_property_color(&mut self, property: PropertyId) -> Ticket {
        self.store.set_property_color(&property, None);
        self.submit(Mutation::UpdatePropertyColor { property, color: String::new() })
    }

    // ========== Completions ==========

    /// Apply every completion that's ready and return what happened.
    pub fn pump(&mut self) -> Vec<SyncEvent> {
        for completion in self.dispatcher.poll() {
            self.apply_completion(completion);
        }
        std::mem::take(&mut self.events)
    }

    /// Block until nothing is in flight, or until `timeout` passes without
    /// any completion arriving. Follow-up fetches restart the clock, so a
    /// chain of requests gets `timeout` per step.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<SyncEvent> {
        let mut deadline = Instant::now() + timeout;
        while self.is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("No progress on {} request(s) for {:?}", self.in_flight.len(), timeout);
                break;
            }
            match self.dispatcher.wait(remaining) {
                Some(completion) => {
                    self.apply_completion(completion);
                    deadline = Instant::now() + timeout;
                }
                None => break,
            }
        }
        std::mem::take(&mut self.events)
    }

    fn fetch(&mut self, scope: FetchScope) -> Ticket {
        self.issue(ApiCall::Fetch(scope), false)
    }

    fn issue(&mut self, call: ApiCall, auto_select: bool) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        if let ApiCall::Fetch(scope) = &call {
            trace!("Fetch {} for {}", ticket, scope);
            self.latest.insert(scope.slot(), ticket);
        }
        self.in_flight.insert(ticket, Pending { call: call.clone(), auto_select });
        self.dispatcher.dispatch(Job { ticket, call });
        ticket
    }

    fn apply_completion(&mut self, completion: Completion) {
        let Some(pending) = self.in_flight.remove(&completion.ticket) else {
            trace!("Completion {} belongs to an ended session, dropped", completion.ticket);
            return;
        };
        match pending.call {
            ApiCall::Fetch(scope) => {
                if !self.is_current(completion.ticket, &scope) {
                    debug!("Stale response {} for {} discarded", completion.ticket, scope);
                    return;
                }
                self.apply_fetch(scope, pending.auto_select, completion.result);
            }
            ApiCall::Mutate(mutation) => self.apply_mutation(mutation, completion.result),
        }
    }

    /// Newest ticket for its slot, and the scope still matches what's shown.
    fn is_current(&self, ticket: Ticket, scope: &FetchScope) -> bool {
        if self.latest.get(&scope.slot()) != Some(&ticket) {
            return false;
        }
        match scope {
            FetchScope::Groups { user } => self.user.as_ref() == Some(user),
            FetchScope::Properties { group } => self.selection.group() == Some(group),
            FetchScope::Bookings(scope) => self.selection.booking_scope().as_ref() == Some(scope),
        }
    }

    fn apply_fetch(&mut self, scope: FetchScope, auto_select: bool, result: Result<ApiReply, TransportError>) {
        let reply = match result {
            Ok(reply) => reply,
            Err(error) => {
                warn!("Fetching {} failed: {}", scope, error);
                self.events.push(SyncEvent::FetchFailed { scope, error });
                return;
            }
        };

        match (scope, reply) {
            (FetchScope::Groups { .. }, ApiReply::Groups(groups)) => {
                let count = groups.len();
                self.store.replace_groups(groups);
                self.hydrated = true;
                self.events.push(SyncEvent::GroupsLoaded { count });
                self.follow(SelectionInput::GroupsLoaded { auto_select });
            }
            (FetchScope::Properties { group }, ApiReply::Properties(properties)) => {
                let count = properties.len();
                self.store.replace_properties(&group, properties);
                self.events.push(SyncEvent::PropertiesLoaded { group: group.clone(), count });
                self.follow(SelectionInput::PropertiesLoaded(group));
            }
            (FetchScope::Bookings(scope), ApiReply::Bookings(bookings)) => {
                let count = bookings.len();
                match &scope {
                    BookingScope::Property { property, .. } => {
                        self.store.replace_bookings_for_property(property, bookings)
                    }
                    BookingScope::Group(group) => self.store.replace_bookings_for_group(group, bookings),
                }
                self.events.push(SyncEvent::BookingsLoaded { scope, count });
            }
            (scope, reply) => warn!("Unexpected reply for {}: {:?}", scope, reply),
        }
    }

    /// System-driven transition after data arrived.
    fn follow(&mut self, input: SelectionInput) {
        match self.selection.transition(input, &self.store) {
            Ok(next) => self.enter(next),
            Err(e) => warn!("Selection left as {}: {}", self.selection, e),
        }
    }

    fn apply_mutation(&mut self, mutation: Mutation, result: Result<ApiReply, TransportError>) {
        let reply = match result {
            Ok(reply) => reply,
            Err(error) => {
                warn!("Failed to {}: {}", mutation.label(), error);
                self.events.push(SyncEvent::MutationFailed { mutation, error });
                return;
            }
        };
        info!("Done: {}", mutation.label());

        if let (Mutation::UpdatePropertyColor { property, .. }, ApiReply::Property(record)) = (&mutation, &reply) {
            let color = record.color.as_deref().map(str::trim).filter(|c| !c.is_empty());
            self.store.set_property_color(property, color.map(str::to_string));
        }

        match &mutation {
            Mutation::CreateGroup { .. }
            | Mutation::CreateProperty { .. }
            | Mutation::UpdatePropertyColor { .. }
            | Mutation::CreateBooking { .. } => self.refresh_current(),
            Mutation::JoinGroup { .. } => self.refresh_groups(true),
            Mutation::UpdateBooking { .. } | Mutation::DeleteBooking { .. } => self.refresh_bookings(),
            Mutation::CreateGroupCode { .. } => {}
        }

        self.events.push(SyncEvent::MutationSucceeded { mutation, reply });
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("selection", &self.selection)
            .field("user", &self.user)
            .field("in_flight", &self.in_flight.len())
            .field("hydrated", &self.hydrated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entities::BookingDraft;
    use crate::sync::dispatch::{ManualDispatcher, ThreadedDispatcher};
    use crate::test_support::{FakeServer, settle};

    fn setup() -> (Arc<FakeServer>, ManualDispatcher, SyncEngine) {
        let server = Arc::new(FakeServer::logged_in());
        let dispatcher = ManualDispatcher::new(server.clone());
        let engine = SyncEngine::new(Box::new(dispatcher.clone()));
        (server, dispatcher, engine)
    }

    fn hydrated() -> (Arc<FakeServer>, ManualDispatcher, SyncEngine) {
        let (server, dispatcher, mut engine) = setup();
        engine.start_session("u1".into());
        settle(&dispatcher, || {
            engine.pump();
        });
        (server, dispatcher, engine)
    }

    fn visible_guests(engine: &SyncEngine) -> Vec<String> {
        let mut guests: Vec<String> = engine
            .store()
            .bookings_visible_for(engine.selection())
            .iter()
            .map(|b| b.guest_name.clone())
            .collect();
        guests.sort();
        guests
    }

    #[test]
    fn test_initial_cascade() {
        let (_, _, engine) = hydrated();
        assert_eq!(engine.selection(), &Selection::AllPropertiesSelected { group: "g1".into() });
        assert_eq!(engine.store().properties_of(&"g1".into()).len(), 2);
        assert_eq!(visible_guests(&engine), vec!["Dana", "Eli"]);
        assert!(!engine.is_loading());
    }

    #[test]
    fn test_wait_idle_times_each_step() {
        let server = Arc::new(FakeServer::logged_in().with_latency(Duration::from_millis(150)));
        let mut engine = SyncEngine::new(Box::new(ThreadedDispatcher::new(server, 2)));
        engine.start_session("u1".into());

        // groups, properties and bookings take ~450ms in sequence
        engine.wait_idle(Duration::from_millis(400));

        assert!(!engine.is_loading());
        assert_eq!(engine.selection(), &Selection::AllPropertiesSelected { group: "g1".into() });
        assert_eq!(visible_guests(&engine), vec!["Dana", "Eli"]);
    }

    #[test]
    fn test_stale_property_response_discarded() {
        let (server, dispatcher, mut engine) = hydrated();
        engine.select_property(Some(PropertyChoice::One("p1".into()))).unwrap();
        let a = dispatcher.pending()[0].ticket;
        engine.select_property(Some(PropertyChoice::One("p2".into()))).unwrap();
        let b = dispatcher.pending()[1].ticket;

        // A's data changes server-side before its (late) reply lands
        server.add_booking("p1", "Zed");
        dispatcher.resolve(b);
        dispatcher.resolve(a);
        let events = engine.pump();

        assert_eq!(visible_guests(&engine), vec!["Eli"]);
        let loaded: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::BookingsLoaded { .. }))
            .collect();
        assert_eq!(loaded.len(), 1);
        assert!(engine.store().bookings().all(|b| b.guest_name != "Zed"));
        assert!(!engine.is_loading());
    }

    #[test]
    fn test_group_switch_clears_property_first() {
        let (_, dispatcher, mut engine) = hydrated();
        engine.select_property(Some(PropertyChoice::One("p1".into()))).unwrap();
        settle(&dispatcher, || {
            engine.pump();
        });

        engine.select_group(Some("g2".into())).unwrap();
        // properties of g2 not loaded yet, nothing from g1 is selected
        assert_eq!(engine.selection(), &Selection::GroupSelected { group: "g2".into() });
        assert!(engine.store().properties_of(&"g2".into()).is_empty());
        assert!(
            engine
                .store()
                .bookings_in_scope(&BookingScope::Group("g1".into()))
                .is_empty()
        );

        settle(&dispatcher, || {
            engine.pump();
        });
        assert_eq!(engine.selection(), &Selection::AllPropertiesSelected { group: "g2".into() });
        assert_eq!(visible_guests(&engine), vec!["Finn"]);
    }

    #[test]
    fn test_late_bookings_of_old_group_ignored() {
        let (_, dispatcher, mut engine) = hydrated();
        engine.refresh_bookings();
        let old = dispatcher.pending()[0].ticket;
        engine.select_group(Some("g2".into())).unwrap();
        dispatcher.resolve(old);
        engine.pump();
        assert!(
            engine
                .store()
                .bookings_in_scope(&BookingScope::Group("g1".into()))
                .is_empty()
        );
    }

    #[test]
    fn test_fetch_failure_keeps_data() {
        let (server, dispatcher, mut engine) = hydrated();
        server.fail("list_group_bookings", TransportError::Status { code: 500, message: None });
        engine.refresh_bookings();
        dispatcher.resolve_all();
        let events = engine.pump();

        assert!(events.iter().any(|e| matches!(e, SyncEvent::FetchFailed { .. })));
        assert_eq!(visible_guests(&engine), vec!["Dana", "Eli"]);
        assert_eq!(engine.selection(), &Selection::AllPropertiesSelected { group: "g1".into() });
    }

    #[test]
    fn test_empty_group_stays_group_selected() {
        let (server, dispatcher, mut engine) = hydrated();
        server.add_group("g3", "Empty Barn");
        engine.refresh_groups(false);
        settle(&dispatcher, || {
            engine.pump();
        });
        engine.select_group(Some("g3".into())).unwrap();
        settle(&dispatcher, || {
            engine.pump();
        });
        assert_eq!(engine.selection(), &Selection::GroupSelected { group: "g3".into() });
        assert!(visible_guests(&engine).is_empty());
    }

    #[test]
    fn test_create_booking_refreshes_scope() {
        let (_, dispatcher, mut engine) = hydrated();
        engine.select_property(Some(PropertyChoice::One("p1".into()))).unwrap();
        settle(&dispatcher, || {
            engine.pump();
        });

        let draft = BookingDraft::new(
            "Alice",
            chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        );
        engine.submit(Mutation::CreateBooking { property: "p1".into(), draft });
        let mut created = None;
        settle(&dispatcher, || {
            for event in engine.pump() {
                if let SyncEvent::MutationSucceeded { reply: ApiReply::Booking(b), .. } = event {
                    created = Some(b);
                }
            }
        });

        let created = created.expect("booking created");
        let stored = engine.store().booking(&created.id).expect("fetched back");
        assert_eq!(stored, &created);
        assert_eq!(visible_guests(&engine), vec!["Alice", "Dana"]);
    }

    #[test]
    fn test_reset_color_is_local_first() {
        let (server, dispatcher, mut engine) = hydrated();
        server.fail("update_property_color", TransportError::Network("down".into()));
        engine.reset_property_color("p2".into());
        assert_eq!(engine.store().property(&"p2".into()).unwrap().color, None);

        dispatcher.resolve_all();
        let events = engine.pump();
        assert!(events.iter().any(|e| matches!(e, SyncEvent::MutationFailed { .. })));
        // no rollback
        assert_eq!(engine.store().property(&"p2".into()).unwrap().color, None);
    }

    #[test]
    fn test_end_session_clears_everything() {
        let (_, dispatcher, mut engine) = hydrated();
        engine.refresh_current();
        assert!(engine.is_loading());
        engine.end_session();

        assert!(engine.store().is_empty());
        assert_eq!(engine.selection(), &Selection::NoGroup);
        assert!(!engine.is_loading());
        assert_eq!(dispatcher.pending_len(), 0);
        assert!(engine.user().is_none());
    }

    #[test]
    fn test_refresh_does_not_auto_select_after_hydration() {
        let (_, dispatcher, mut engine) = hydrated();
        engine.select_group(None).unwrap();
        engine.refresh_current();
        settle(&dispatcher, || {
            engine.pump();
        });
        assert_eq!(engine.selection(), &Selection::NoGroup);
    }
}
