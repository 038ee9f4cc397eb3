//! Blocking HTTP transport on a shared `ureq` agent.

use std::sync::RwLock;
use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    AuthReply, BookingBody, ColorBody, CreatePropertyBody, CredentialsBody, GroupCodeBody, GroupCodeReply,
    NameBody, Transport, TransportError,
};
use crate::entities::{
    Booking, BookingDraft, BookingId, Group, GroupId, Property, PropertyId, PropertyRecord, UserId,
};

const USER_AGENT: &str = concat!("staycal/", env!("CARGO_PKG_VERSION"));

/// REST client for the booking backend.
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            token: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self.agent.request(method, &self.url(path)).set("Accept", "application/json");
        match self.token.read().unwrap_or_else(|e| e.into_inner()).as_deref() {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Issue a call and return the raw body.
    fn call<B: Serialize>(&self, method: &str, path: &str, body: Option<&B>) -> Result<String, TransportError> {
        trace!("{} {}", method, path);
        let request = self.request(method, path);
        let result = match body {
            Some(body) => {
                let json = serde_json::to_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
                request.send_json(json)
            }
            None => request.call(),
        };

        match result {
            Ok(response) => response
                .into_string()
                .map_err(|e| TransportError::Network(e.to_string())),
            Err(ureq::Error::Status(code, response)) => {
                let message = response.into_string().ok().and_then(|body| server_message(&body));
                debug!("{} {} failed with {}: {:?}", method, path, code, message);
                Err(TransportError::Status { code, message })
            }
            Err(ureq::Error::Transport(transport)) => Err(TransportError::Network(transport.to_string())),
        }
    }

    fn json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, TransportError> {
        let raw = self.call(method, path, body)?;
        serde_json::from_str(&raw).map_err(|e| TransportError::Decode(format!("{} {}: {}", method, path, e)))
    }

    /// GET a list; a `null` or empty body is an empty list.
    fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, TransportError> {
        let raw = self.call::<()>("GET", path, None)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Option<Vec<T>>>(&raw)
            .map(Option::unwrap_or_default)
            .map_err(|e| TransportError::Decode(format!("GET {}: {}", path, e)))
    }

    fn require_token(&self) -> Result<(), TransportError> {
        if self.token.read().unwrap_or_else(|e| e.into_inner()).is_some() {
            Ok(())
        } else {
            Err(TransportError::NotAuthenticated)
        }
    }
}

/// Pull `error` or `message` out of an error body.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

impl Transport for HttpTransport {
    fn login(&self, username: &str, password: &str) -> Result<AuthReply, TransportError> {
        self.json("POST", "/users/login", Some(&CredentialsBody { username, password }))
    }

    fn register(&self, username: &str, password: &str) -> Result<(), TransportError> {
        self.call("POST", "/users/register", Some(&CredentialsBody { username, password }))
            .map(|_| ())
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn list_groups(&self, user: &UserId) -> Result<Vec<Group>, TransportError> {
        self.require_token()?;
        self.list(&format!("/groups/{}", user))
    }

    fn create_group(&self, name: &str) -> Result<Group, TransportError> {
        self.require_token()?;
        self.json("POST", "/groups/", Some(&NameBody { name }))
    }

    fn join_group(&self, code: &str) -> Result<Group, TransportError> {
        self.require_token()?;
        self.json::<Group, ()>("POST", &format!("/groups/join/{}", code.trim()), None)
    }

    fn list_properties(&self, group: &GroupId) -> Result<Vec<Property>, TransportError> {
        self.require_token()?;
        let records: Vec<PropertyRecord> = self.list(&format!("/properties/group/{}", group))?;
        Ok(records.into_iter().map(|r| r.into_property(group.clone())).collect())
    }

    fn create_property(&self, group: &GroupId, name: &str) -> Result<PropertyRecord, TransportError> {
        self.require_token()?;
        let body = CreatePropertyBody { name, group_id: group };
        self.json("POST", &format!("/properties/group/{}", group), Some(&body))
    }

    fn update_property_color(&self, property: &PropertyId, color: &str) -> Result<PropertyRecord, TransportError> {
        self.require_token()?;
        self.json("PUT", &format!("/properties/{}", property), Some(&ColorBody { color }))
    }

    fn list_property_bookings(&self, property: &PropertyId) -> Result<Vec<Booking>, TransportError> {
        self.require_token()?;
        self.list(&format!("/bookings/property/{}", property))
    }

    fn list_group_bookings(&self, group: &GroupId) -> Result<Vec<Booking>, TransportError> {
        self.require_token()?;
        self.list(&format!("/bookings/group/{}", group))
    }

    fn create_booking(&self, property: &PropertyId, draft: &BookingDraft) -> Result<Booking, TransportError> {
        self.require_token()?;
        let body = BookingBody::for_create(draft);
        self.json("POST", &format!("/bookings/property/{}", property), Some(&body))
    }

    fn update_booking(&self, booking: &BookingId, draft: &BookingDraft) -> Result<Booking, TransportError> {
        self.require_token()?;
        let body = BookingBody::for_update(draft);
        self.json("PUT", &format!("/bookings/{}", booking), Some(&body))
    }

    fn delete_booking(&self, booking: &BookingId) -> Result<(), TransportError> {
        self.require_token()?;
        self.call::<()>("DELETE", &format!("/bookings/{}", booking), None).map(|_| ())
    }

    fn create_group_code(&self, group: &GroupId) -> Result<String, TransportError> {
        self.require_token()?;
        let reply: GroupCodeReply = self.json("POST", "/group-codes/", Some(&GroupCodeBody { group_id: group }))?;
        Ok(reply.group_code)
    }
}
