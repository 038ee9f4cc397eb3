//! Page controller: the one place that owns the sync engine.
//!
//! Turns user intents (bus actions, calendar callbacks, form submits) into
//! engine calls, and engine events into what the UI shows: the open
//! [`Flow`], toast [`Notice`]s and the error banner.
//!
//! Bus handlers can't reach the controller directly (they must be `Send +
//! Sync`), so each one just forwards its [`AppAction`] into an inbox that
//! [`BookingController::process_actions`] drains on the UI thread.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::calendar::{self, CalendarEvent, LegendEntry};
use crate::core::action_bus::{ActionBus, AppAction, Subscription};
use crate::entities::{
    BookingDraft, BookingId, EntityStore, GroupId, PropertyChoice, PropertyId, Selection, SelectionError,
};
use crate::session::Session;
use crate::sync::{ApiReply, Dispatcher, FetchScope, Mutation, SyncEngine, SyncEvent, Ticket};
use crate::transport::{Transport, TransportError};

pub const NO_GROUP_FOR_PROPERTY: &str = "Please select a group first to add a property.";
pub const NO_GROUP_FOR_CODE: &str = "Please select a group first to create an invite code.";
pub const NO_PROPERTY_FOR_BOOKING: &str = "Please select a property first to create a booking.";
pub const NO_PROPERTY_FOR_SLOT: &str = "Please select a property to create a booking for.";
pub const COLOR_UPDATED: &str = "Property color updated successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
}

/// The modal / form currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    CreateGroup,
    JoinGroup,
    AddProperty { group: GroupId },
    CreateGroupCode { group: GroupId },
    DisplayGroupCode { code: String, group_name: String },
    /// Aggregate view: pick which property a new booking is for.
    ChoosePropertyForBooking { initial_date: NaiveDate },
    CreateBooking { property: PropertyId, initial_date: NaiveDate },
    ViewEditBooking { booking: BookingId },
    EditPropertyColor { property: PropertyId },
}

pub struct BookingController {
    engine: SyncEngine,
    transport: Arc<dyn Transport>,
    session: Option<Session>,
    inbox_tx: Sender<AppAction>,
    inbox_rx: Receiver<AppAction>,
    subscriptions: Vec<Subscription>,
    flow: Option<Flow>,
    /// Mutation error shown inside the open flow.
    flow_error: Option<String>,
    notices: Vec<Notice>,
    /// Dismissible banner for failed loads.
    error: Option<String>,
}

impl BookingController {
    pub fn new(transport: Arc<dyn Transport>, dispatcher: Box<dyn Dispatcher>) -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            engine: SyncEngine::new(dispatcher),
            transport,
            session: None,
            inbox_tx,
            inbox_rx,
            subscriptions: Vec::new(),
            flow: None,
            flow_error: None,
            notices: Vec::new(),
            error: None,
        }
    }

    // ========== Action bus ==========

    /// Subscribe to every [`AppAction`] on `bus`.
    pub fn attach(&mut self, bus: &ActionBus) {
        for action in AppAction::ALL {
            let tx = self.inbox_tx.clone();
            let sub = bus.subscribe(action.name(), move |_| {
                let _ = tx.send(action);
            });
            self.subscriptions.push(sub);
        }
        debug!("Controller attached to {:?}", bus);
    }

    pub fn detach(&mut self) {
        for sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
    }

    /// Handle queued bus actions in publish order.
    pub fn process_actions(&mut self) {
        while let Ok(action) = self.inbox_rx.try_recv() {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        debug!("Action: {}", action);
        match action {
            AppAction::OpenCreateGroup => self.open(Flow::CreateGroup),
            AppAction::OpenJoinGroup => self.open(Flow::JoinGroup),
            AppAction::OpenAddProperty => match self.engine.selection().group().cloned() {
                Some(group) => self.open(Flow::AddProperty { group }),
                None => self.notify(NoticeLevel::Warning, NO_GROUP_FOR_PROPERTY),
            },
            AppAction::OpenCreateGroupCode => match self.engine.selection().group().cloned() {
                Some(group) => self.open(Flow::CreateGroupCode { group }),
                None => self.notify(NoticeLevel::Warning, NO_GROUP_FOR_CODE),
            },
            AppAction::OpenCreateBookingFromSidebar => match self.engine.selection().property().cloned() {
                Some(property) => self.open(Flow::CreateBooking { property, initial_date: today() }),
                None => self.notify(NoticeLevel::Warning, NO_PROPERTY_FOR_BOOKING),
            },
        }
    }

    // ========== Session ==========

    pub fn login(&mut self, username: &str, password: &str) -> Result<&Session, TransportError> {
        let session = Session::login(self.transport.as_ref(), username, password)?;
        Ok(self.start_session(session))
    }

    /// Resume a saved session.
    pub fn start_session(&mut self, session: Session) -> &Session {
        session.activate(self.transport.as_ref());
        self.error = None;
        self.engine.start_session(session.user_id.clone());
        self.session.insert(session)
    }

    pub fn logout(&mut self) -> Option<Session> {
        self.engine.end_session();
        self.transport.set_token(None);
        self.flow = None;
        self.flow_error = None;
        self.error = None;
        let session = self.session.take();
        if let Some(s) = &session {
            info!("Logged out {}", s.username);
        }
        session
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    // ========== Selection & calendar callbacks ==========

    pub fn select_group(&mut self, group: Option<GroupId>) -> Result<(), SelectionError> {
        self.engine.select_group(group)
    }

    pub fn select_property(&mut self, choice: Option<PropertyChoice>) -> Result<(), SelectionError> {
        self.engine.select_property(choice)
    }

    /// Empty calendar slot clicked.
    pub fn select_slot(&mut self, date: NaiveDate) {
        let selection = self.engine.selection().clone();
        match selection {
            Selection::AllPropertiesSelected { .. } => {
                self.open(Flow::ChoosePropertyForBooking { initial_date: date })
            }
            Selection::PropertySelected { property, .. } => {
                self.open(Flow::CreateBooking { property, initial_date: date })
            }
            _ => self.notify(NoticeLevel::Warning, NO_PROPERTY_FOR_SLOT),
        }
    }

    /// Property picked in the chooser opened by [`Self::select_slot`].
    pub fn choose_property_for_booking(&mut self, property: PropertyId) {
        if !self.in_selected_group(&property) {
            warn!("Property {} is not in the selected group", property);
            self.notify(NoticeLevel::Warning, NO_PROPERTY_FOR_SLOT);
            return;
        }
        let initial_date = match &self.flow {
            Some(Flow::ChoosePropertyForBooking { initial_date }) => *initial_date,
            _ => today(),
        };
        self.open(Flow::CreateBooking { property, initial_date });
    }

    /// Calendar event clicked.
    pub fn select_event(&mut self, booking: BookingId) {
        if self.engine.store().booking(&booking).is_some() {
            self.open(Flow::ViewEditBooking { booking });
        }
    }

    /// Legend pencil clicked.
    pub fn edit_property_color(&mut self, property: PropertyId) {
        if self.in_selected_group(&property) {
            self.open(Flow::EditPropertyColor { property });
        }
    }

    pub fn close_flow(&mut self) {
        self.flow = None;
        self.flow_error = None;
    }

    fn open(&mut self, flow: Flow) {
        debug!("Open {:?}", flow);
        self.flow = Some(flow);
        self.flow_error = None;
    }

    fn in_selected_group(&self, property: &PropertyId) -> bool {
        match (self.engine.selection().group(), self.engine.store().property(property)) {
            (Some(group), Some(p)) => &p.group_id == group,
            _ => false,
        }
    }

    // ========== Submits ==========

    pub fn create_group(&mut self, name: &str) -> Ticket {
        self.engine.submit(Mutation::CreateGroup { name: name.trim().to_string() })
    }

    pub fn join_group(&mut self, code: &str) -> Ticket {
        self.engine.submit(Mutation::JoinGroup { code: code.trim().to_string() })
    }

    /// Add a property to the selected group.
    pub fn add_property(&mut self, name: &str) -> Option<Ticket> {
        let Some(group) = self.engine.selection().group().cloned() else {
            self.notify(NoticeLevel::Warning, NO_GROUP_FOR_PROPERTY);
            return None;
        };
        Some(self.engine.submit(Mutation::CreateProperty { group, name: name.trim().to_string() }))
    }

    pub fn set_property_color(&mut self, property: PropertyId, color: &str) -> Ticket {
        self.engine.submit(Mutation::UpdatePropertyColor { property, color: color.trim().to_string() })
    }

    pub fn reset_property_color(&mut self, property: PropertyId) -> Ticket {
        self.engine.reset_property_color(property)
    }

    pub fn create_booking(&mut self, property: PropertyId, draft: BookingDraft) -> Ticket {
        self.engine.submit(Mutation::CreateBooking { property, draft })
    }

    pub fn update_booking(&mut self, booking: BookingId, draft: BookingDraft) -> Ticket {
        self.engine.submit(Mutation::UpdateBooking { booking, draft })
    }

    pub fn delete_booking(&mut self, booking: BookingId) -> Ticket {
        self.engine.submit(Mutation::DeleteBooking { booking })
    }

    /// Invite code for the selected group.
    pub fn create_group_code(&mut self) -> Option<Ticket> {
        let Some(group) = self.engine.selection().group().cloned() else {
            self.notify(NoticeLevel::Warning, NO_GROUP_FOR_CODE);
            return None;
        };
        Some(self.engine.submit(Mutation::CreateGroupCode { group }))
    }

    // ========== Driving ==========

    /// Handle queued actions and ready completions. Call once per UI frame.
    pub fn pump(&mut self) -> Vec<SyncEvent> {
        self.process_actions();
        let events = self.engine.pump();
        self.absorb(&events);
        events
    }

    /// Block until the engine is idle or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<SyncEvent> {
        self.process_actions();
        let events = self.engine.wait_idle(timeout);
        self.absorb(&events);
        events
    }

    fn absorb(&mut self, events: &[SyncEvent]) {
        for event in events {
            match event {
                SyncEvent::FetchFailed { scope, .. } => {
                    self.error = Some(load_error(scope).to_string());
                }
                SyncEvent::MutationSucceeded { mutation, reply } => self.on_mutation_done(mutation, reply),
                SyncEvent::MutationFailed { mutation, error } => self.on_mutation_failed(mutation, error),
                _ => {}
            }
        }
    }

    fn on_mutation_done(&mut self, mutation: &Mutation, reply: &ApiReply) {
        match (mutation, reply) {
            (Mutation::JoinGroup { .. }, ApiReply::Group(group)) => {
                self.close_if(|f| submitted_from(mutation, f));
                self.notify(NoticeLevel::Success, &format!("Successfully joined {}!", group.name));
            }
            (Mutation::CreateGroupCode { group }, ApiReply::GroupCode(code)) => {
                let group_name = match self.engine.store().group(group) {
                    Some(g) => g.name.clone(),
                    None => group.to_string(),
                };
                self.open(Flow::DisplayGroupCode { code: code.clone(), group_name });
            }
            (Mutation::UpdatePropertyColor { .. }, _) => {
                self.close_if(|f| submitted_from(mutation, f));
                self.notify(NoticeLevel::Success, COLOR_UPDATED);
            }
            (
                Mutation::CreateGroup { .. }
                | Mutation::CreateProperty { .. }
                | Mutation::CreateBooking { .. }
                | Mutation::UpdateBooking { .. }
                | Mutation::DeleteBooking { .. },
                _,
            ) => self.close_if(|f| submitted_from(mutation, f)),
            (mutation, reply) => warn!("Unexpected reply to {}: {:?}", mutation.label(), reply),
        }
    }

    /// The error lands in the form the mutation came from if that form is
    /// still open. Color errors and everything else become an Error notice.
    fn on_mutation_failed(&mut self, mutation: &Mutation, error: &TransportError) {
        let message = error.user_message(mutation_error(mutation));
        let in_form = !matches!(mutation, Mutation::UpdatePropertyColor { .. })
            && self.flow.as_ref().is_some_and(|f| submitted_from(mutation, f));
        if in_form {
            self.flow_error = Some(message);
        } else {
            self.notify(NoticeLevel::Error, &message);
        }
    }

    fn close_if(&mut self, pred: impl Fn(&Flow) -> bool) {
        if self.flow.as_ref().is_some_and(pred) {
            self.close_flow();
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error | NoticeLevel::Warning => warn!("{:?}: {}", level, message),
            _ => info!("{:?}: {}", level, message),
        }
        self.notices.push(Notice { id: Uuid::new_v4(), level, message: message.to_string() });
    }

    // ========== View state ==========

    pub fn selection(&self) -> &Selection {
        self.engine.selection()
    }

    pub fn store(&self) -> &EntityStore {
        self.engine.store()
    }

    pub fn is_loading(&self) -> bool {
        self.engine.is_loading()
    }

    pub fn flow(&self) -> Option<&Flow> {
        self.flow.as_ref()
    }

    pub fn flow_error(&self) -> Option<&str> {
        self.flow_error.as_deref()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// "Try again" on the error banner.
    pub fn retry(&mut self) {
        self.error = None;
        self.engine.refresh_current();
    }

    pub fn calendar_events(&self) -> Vec<CalendarEvent> {
        calendar::calendar_events(self.engine.store(), self.engine.selection())
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        calendar::legend(self.engine.store(), self.engine.selection())
    }
}

impl Drop for BookingController {
    fn drop(&mut self) {
        self.detach();
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn load_error(scope: &FetchScope) -> &'static str {
    match scope {
        FetchScope::Groups { .. } => "Failed to load groups.",
        FetchScope::Properties { .. } => "Failed to load properties.",
        FetchScope::Bookings(_) => "Failed to load bookings.",
    }
}

/// Whether `flow` is the form that submits `mutation`.
fn submitted_from(mutation: &Mutation, flow: &Flow) -> bool {
    match mutation {
        Mutation::CreateGroup { .. } => matches!(flow, Flow::CreateGroup),
        Mutation::JoinGroup { .. } => matches!(flow, Flow::JoinGroup),
        Mutation::CreateProperty { .. } => matches!(flow, Flow::AddProperty { .. }),
        Mutation::UpdatePropertyColor { .. } => matches!(flow, Flow::EditPropertyColor { .. }),
        Mutation::CreateBooking { .. } => matches!(flow, Flow::CreateBooking { .. }),
        Mutation::UpdateBooking { .. } | Mutation::DeleteBooking { .. } => {
            matches!(flow, Flow::ViewEditBooking { .. })
        }
        Mutation::CreateGroupCode { .. } => matches!(flow, Flow::CreateGroupCode { .. }),
    }
}

fn mutation_error(mutation: &Mutation) -> &'static str {
    match mutation {
        Mutation::CreateGroup { .. } => "Failed to create group",
        Mutation::JoinGroup { .. } => "Failed to join group. Invalid or expired code.",
        Mutation::CreateProperty { .. } => "Failed to add property",
        Mutation::UpdatePropertyColor { .. } => "Failed to update property color",
        Mutation::CreateBooking { .. } => "Failed to create booking",
        Mutation::UpdateBooking { .. } => "Failed to update booking",
        Mutation::DeleteBooking { .. } => "Failed to delete booking",
        Mutation::CreateGroupCode { .. } => "Failed to create group code",
    }
}
