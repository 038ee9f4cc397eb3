//! Transport collaborator: the REST backend, consumed not designed.
//!
//! [`Transport`] lists every call the client makes. Calls are blocking; the
//! sync engine runs them off the UI thread. [`HttpTransport`] is the real
//! implementation.

mod http;

pub use http::HttpTransport;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::{
    Booking, BookingDraft, BookingId, Group, GroupId, Property, PropertyId, PropertyRecord, UserId,
};

/// Reply to `POST /users/login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthReply {
    pub token: String,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS, timeout...
    Network(String),
    /// Non-2xx reply. `message` is the server's `error`/`message` field.
    Status { code: u16, message: Option<String> },
    /// Body didn't match the expected shape.
    Decode(String),
    /// Call needs a token and none is set.
    NotAuthenticated,
}

impl TransportError {
    /// The server's own message when it sent one, `fallback` otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            TransportError::Status { message: Some(message), .. } => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "Network error: {}", msg),
            TransportError::Status { code, message: Some(message) } => {
                write!(f, "Server returned {}: {}", code, message)
            }
            TransportError::Status { code, message: None } => write!(f, "Server returned {}", code),
            TransportError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            TransportError::NotAuthenticated => write!(f, "Not logged in"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Every backend call the client makes.
///
/// `list_properties` returns properties with `group_id` already attached;
/// the wire records don't carry it.
pub trait Transport: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<AuthReply, TransportError>;
    fn register(&self, username: &str, password: &str) -> Result<(), TransportError>;
    /// Bearer token for subsequent calls. `None` on logout.
    fn set_token(&self, token: Option<String>);

    fn list_groups(&self, user: &UserId) -> Result<Vec<Group>, TransportError>;
    fn create_group(&self, name: &str) -> Result<Group, TransportError>;
    fn join_group(&self, code: &str) -> Result<Group, TransportError>;

    fn list_properties(&self, group: &GroupId) -> Result<Vec<Property>, TransportError>;
    fn create_property(&self, group: &GroupId, name: &str) -> Result<PropertyRecord, TransportError>;
    /// An empty `color` clears the override server-side.
    fn update_property_color(&self, property: &PropertyId, color: &str) -> Result<PropertyRecord, TransportError>;

    fn list_property_bookings(&self, property: &PropertyId) -> Result<Vec<Booking>, TransportError>;
    fn list_group_bookings(&self, group: &GroupId) -> Result<Vec<Booking>, TransportError>;
    fn create_booking(&self, property: &PropertyId, draft: &BookingDraft) -> Result<Booking, TransportError>;
    fn update_booking(&self, booking: &BookingId, draft: &BookingDraft) -> Result<Booking, TransportError>;
    fn delete_booking(&self, booking: &BookingId) -> Result<(), TransportError>;

    /// Generate an invite code for a group.
    fn create_group_code(&self, group: &GroupId) -> Result<String, TransportError>;
}

// ========== Request bodies ==========

#[derive(Debug, Serialize)]
pub(crate) struct CredentialsBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct NameBody<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePropertyBody<'a> {
    pub name: &'a str,
    pub group_id: &'a GroupId,
}

#[derive(Debug, Serialize)]
pub(crate) struct ColorBody<'a> {
    pub color: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupCodeBody<'a> {
    pub group_id: &'a GroupId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupCodeReply {
    #[serde(rename = "groupCode")]
    pub group_code: String,
}

/// Booking body. Creation sends plain days, updates send UTC-midnight
/// instants; the backend accepts both.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct BookingBody {
    pub guest_name: String,
    pub start_date: String,
    pub end_date: String,
}

impl BookingBody {
    pub fn for_create(draft: &BookingDraft) -> Self {
        Self {
            guest_name: draft.guest_name.clone(),
            start_date: draft.start.format("%Y-%m-%d").to_string(),
            end_date: draft.end.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn for_update(draft: &BookingDraft) -> Self {
        let instant = |day: chrono::NaiveDate| {
            day.and_time(chrono::NaiveTime::MIN)
                .and_utc()
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        };
        Self {
            guest_name: draft.guest_name.clone(),
            start_date: instant(draft.start),
            end_date: instant(draft.end),
        }
    }
}
