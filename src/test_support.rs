//! In-memory backend and fixtures for unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::entities::{
    Booking, BookingDraft, BookingId, Group, GroupId, Property, PropertyId, PropertyRecord, UserId,
};
use crate::sync::ManualDispatcher;
use crate::transport::{AuthReply, Transport, TransportError};

pub(crate) fn group(id: &str, name: &str) -> Group {
    Group { id: id.into(), name: name.into() }
}

pub(crate) fn booking(id: &str, property: &str, guest: &str) -> Booking {
    Booking {
        id: id.into(),
        property_id: property.into(),
        guest_name: guest.into(),
        start_date: day(2024, 6, 10),
        end_date: day(2024, 6, 12),
        created_at: day(2024, 5, 1),
        created_by: "u1".into(),
    }
}

pub(crate) fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Resolve jobs and pump until the dispatcher has nothing left.
pub(crate) fn settle<F: FnMut()>(dispatcher: &ManualDispatcher, mut pump: F) {
    for _ in 0..64 {
        let resolved = dispatcher.resolve_all();
        pump();
        if resolved == 0 {
            return;
        }
    }
    panic!("requests kept coming after 64 rounds");
}

struct Account {
    username: String,
    password: String,
    id: UserId,
}

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    token: Option<String>,
    groups: Vec<(Group, Vec<UserId>)>,
    properties: Vec<Property>,
    bookings: Vec<Booking>,
    codes: HashMap<String, GroupId>,
    failures: HashMap<String, TransportError>,
    calls: Vec<String>,
    next_id: u64,
    latency: Duration,
}

impl State {
    fn enter(&mut self, op: &str) -> Result<(), TransportError> {
        self.calls.push(op.to_string());
        match self.failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn user(&self) -> Result<UserId, TransportError> {
        let token = self.token.as_deref().ok_or(TransportError::NotAuthenticated)?;
        self.accounts
            .iter()
            .find(|a| token_for(&a.id) == token)
            .map(|a| a.id.clone())
            .ok_or(TransportError::Status { code: 401, message: Some("Invalid token".into()) })
    }

    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn group_of(&self, property: &PropertyId) -> Option<&GroupId> {
        self.properties.iter().find(|p| &p.id == property).map(|p| &p.group_id)
    }
}

fn token_for(user: &UserId) -> String {
    format!("token-{}", user)
}

fn not_found(what: &str) -> TransportError {
    TransportError::Status { code: 404, message: Some(format!("{} not found", what)) }
}

fn record(property: &Property) -> PropertyRecord {
    PropertyRecord {
        id: property.id.clone(),
        name: property.name.clone(),
        color: property.color.clone(),
    }
}

/// Fake REST backend. Failures can be injected per operation name (the
/// `Transport` method name) and stay until [`FakeServer::recover`].
pub(crate) struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    /// User `sam`/`secret` (u1) in "Lake House Crew" (Cabin, Boathouse
    /// `#2563eb`) and "Ski Lodge" (Chalet). "Beach Club" belongs to someone
    /// else and can be joined with code `BEACH1`.
    pub fn lake_house() -> Self {
        let u1: UserId = "u1".into();
        let u2: UserId = "u2".into();
        let state = State {
            accounts: vec![
                Account { username: "sam".into(), password: "secret".into(), id: u1.clone() },
                Account { username: "lee".into(), password: "pw".into(), id: u2.clone() },
            ],
            groups: vec![
                (group("g1", "Lake House Crew"), vec![u1.clone()]),
                (group("g2", "Ski Lodge"), vec![u1]),
                (group("g4", "Beach Club"), vec![u2]),
            ],
            properties: vec![
                Property::new("p1", "Cabin", "g1"),
                Property::new("p2", "Boathouse", "g1").with_color("#2563eb"),
                Property::new("p3", "Chalet", "g2"),
                Property::new("p4", "Beach Hut", "g4"),
            ],
            bookings: vec![
                booking("b1", "p1", "Dana"),
                booking("b2", "p2", "Eli"),
                booking("b3", "p3", "Finn"),
                booking("b4", "p4", "Hal"),
            ],
            codes: HashMap::from([("BEACH1".to_string(), GroupId::from("g4"))]),
            next_id: 100,
            ..State::default()
        };
        Self { state: Mutex::new(state) }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every list call sleeps `latency` before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Sleep outside the lock so parallel calls overlap.
    fn lock_after_latency(&self) -> MutexGuard<'_, State> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        self.lock()
    }

    /// Logged in as u1 already.
    pub fn logged_in() -> Self {
        let server = Self::lake_house();
        server.set_token(Some(token_for(&"u1".into())));
        server
    }

    pub fn fail(&self, op: &str, err: TransportError) {
        self.lock().failures.insert(op.to_string(), err);
    }

    pub fn recover(&self, op: &str) {
        self.lock().failures.remove(op);
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn add_booking(&self, property: &str, guest: &str) -> BookingId {
        let mut state = self.lock();
        let id = state.next("b");
        state.bookings.push(booking(&id, property, guest));
        id.into()
    }

    pub fn add_group(&self, id: &str, name: &str) {
        self.lock().groups.push((group(id, name), vec!["u1".into()]));
    }
}

impl Transport for FakeServer {
    fn login(&self, username: &str, password: &str) -> Result<AuthReply, TransportError> {
        let mut state = self.lock();
        state.enter("login")?;
        state
            .accounts
            .iter()
            .find(|a| a.username == username && a.password == password)
            .map(|a| AuthReply { token: token_for(&a.id), user_id: a.id.clone(), username: a.username.clone() })
            .ok_or(TransportError::Status { code: 401, message: Some("Invalid credentials".into()) })
    }

    fn register(&self, username: &str, password: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.enter("register")?;
        if state.accounts.iter().any(|a| a.username == username) {
            return Err(TransportError::Status { code: 409, message: Some("Username taken".into()) });
        }
        let id = state.next("u");
        state.accounts.push(Account { username: username.into(), password: password.into(), id: id.into() });
        Ok(())
    }

    fn set_token(&self, token: Option<String>) {
        self.lock().token = token;
    }

    fn list_groups(&self, user: &UserId) -> Result<Vec<Group>, TransportError> {
        let mut state = self.lock_after_latency();
        state.enter("list_groups")?;
        state.user()?;
        Ok(state
            .groups
            .iter()
            .filter(|(_, members)| members.contains(user))
            .map(|(g, _)| g.clone())
            .collect())
    }

    fn create_group(&self, name: &str) -> Result<Group, TransportError> {
        let mut state = self.lock();
        state.enter("create_group")?;
        let user = state.user()?;
        let id = state.next("g");
        let created = group(&id, name);
        state.groups.push((created.clone(), vec![user]));
        Ok(created)
    }

    fn join_group(&self, code: &str) -> Result<Group, TransportError> {
        let mut state = self.lock();
        state.enter("join_group")?;
        let user = state.user()?;
        let group_id = state
            .codes
            .get(code)
            .cloned()
            .ok_or(TransportError::Status { code: 400, message: Some("Invalid or expired code".into()) })?;
        let (joined, members) = state
            .groups
            .iter_mut()
            .find(|(g, _)| g.id == group_id)
            .ok_or_else(|| not_found("Group"))?;
        if !members.contains(&user) {
            members.push(user);
        }
        Ok(joined.clone())
    }

    fn list_properties(&self, group: &GroupId) -> Result<Vec<Property>, TransportError> {
        let mut state = self.lock_after_latency();
        state.enter("list_properties")?;
        state.user()?;
        Ok(state.properties.iter().filter(|p| &p.group_id == group).cloned().collect())
    }

    fn create_property(&self, group: &GroupId, name: &str) -> Result<PropertyRecord, TransportError> {
        let mut state = self.lock();
        state.enter("create_property")?;
        state.user()?;
        let id = state.next("p");
        let property = Property::new(id, name, group.clone());
        let reply = record(&property);
        state.properties.push(property);
        Ok(reply)
    }

    fn update_property_color(&self, property: &PropertyId, color: &str) -> Result<PropertyRecord, TransportError> {
        let mut state = self.lock();
        state.enter("update_property_color")?;
        state.user()?;
        let found = state
            .properties
            .iter_mut()
            .find(|p| &p.id == property)
            .ok_or_else(|| not_found("Property"))?;
        found.color = Some(color.to_string()).filter(|c| !c.is_empty());
        Ok(record(found))
    }

    fn list_property_bookings(&self, property: &PropertyId) -> Result<Vec<Booking>, TransportError> {
        let mut state = self.lock_after_latency();
        state.enter("list_property_bookings")?;
        state.user()?;
        Ok(state.bookings.iter().filter(|b| &b.property_id == property).cloned().collect())
    }

    fn list_group_bookings(&self, group: &GroupId) -> Result<Vec<Booking>, TransportError> {
        let mut state = self.lock_after_latency();
        state.enter("list_group_bookings")?;
        state.user()?;
        Ok(state
            .bookings
            .iter()
            .filter(|b| state.group_of(&b.property_id) == Some(group))
            .cloned()
            .collect())
    }

    fn create_booking(&self, property: &PropertyId, draft: &BookingDraft) -> Result<Booking, TransportError> {
        let mut state = self.lock();
        state.enter("create_booking")?;
        let user = state.user()?;
        if state.group_of(property).is_none() {
            return Err(not_found("Property"));
        }
        let id = state.next("b");
        let created = Booking {
            id: id.into(),
            property_id: property.clone(),
            guest_name: draft.guest_name.clone(),
            start_date: draft.start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end_date: draft.end.and_time(chrono::NaiveTime::MIN).and_utc(),
            created_at: day(2024, 5, 20),
            created_by: user,
        };
        state.bookings.push(created.clone());
        Ok(created)
    }

    fn update_booking(&self, booking: &BookingId, draft: &BookingDraft) -> Result<Booking, TransportError> {
        let mut state = self.lock();
        state.enter("update_booking")?;
        state.user()?;
        let found = state
            .bookings
            .iter_mut()
            .find(|b| &b.id == booking)
            .ok_or_else(|| not_found("Booking"))?;
        found.guest_name = draft.guest_name.clone();
        found.start_date = draft.start.and_time(chrono::NaiveTime::MIN).and_utc();
        found.end_date = draft.end.and_time(chrono::NaiveTime::MIN).and_utc();
        Ok(found.clone())
    }

    fn delete_booking(&self, booking: &BookingId) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.enter("delete_booking")?;
        state.user()?;
        let before = state.bookings.len();
        state.bookings.retain(|b| &b.id != booking);
        if state.bookings.len() == before {
            return Err(not_found("Booking"));
        }
        Ok(())
    }

    fn create_group_code(&self, group: &GroupId) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.enter("create_group_code")?;
        state.user()?;
        let code = state.next("CODE");
        state.codes.insert(code.clone(), group.clone());
        Ok(code)
    }
}
