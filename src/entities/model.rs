//! Domain records: groups, properties, bookings.
//!
//! Ids are opaque server strings. The backend is not consistent about
//! emitting ids as strings or integers, so every id type deserializes from
//! either. Booking dates arrive as ISO strings, sometimes date-only.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Wire form of an id: the server sends both `"12"` and `12`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into()))
            }
        }
    };
}

string_id!(
    /// Authenticated user id (also the `created_by` of bookings)
    UserId
);
string_id!(GroupId);
string_id!(PropertyId);
string_id!(BookingId);

/// A set of users sharing properties and bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

/// A bookable unit owned by exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub group_id: GroupId,
    /// User-chosen override. `None` (or blank) means derive one.
    #[serde(default)]
    pub color: Option<String>,
}

impl Property {
    pub fn new(id: impl Into<PropertyId>, name: impl Into<String>, group_id: impl Into<GroupId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group_id: group_id.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// The explicit color, as stored, if it is set and not blank.
    pub fn explicit_color(&self) -> Option<&str> {
        self.color.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Property as the server returns it: no `group_id`, the caller attaches it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl PropertyRecord {
    pub fn into_property(self, group_id: GroupId) -> Property {
        Property {
            id: self.id,
            name: self.name,
            group_id,
            color: self.color,
        }
    }
}

/// A date-ranged reservation against a property.
///
/// `start_date <= end_date` is expected by calendar widgets but not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub property_id: PropertyId,
    pub guest_name: String,
    #[serde(deserialize_with = "de_wire_date")]
    pub start_date: DateTime<Utc>,
    #[serde(deserialize_with = "de_wire_date")]
    pub end_date: DateTime<Utc>,
    #[serde(deserialize_with = "de_wire_date")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_optional_user")]
    pub created_by: UserId,
}

/// Form input for creating or editing a booking. Days, not instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub guest_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BookingDraft {
    pub fn new(guest_name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            guest_name: guest_name.into(),
            start,
            end,
        }
    }
}

/// Parse a server date: RFC 3339, naive ISO datetime, or plain `YYYY-MM-DD`.
/// Naive values are taken as UTC, date-only values as UTC midnight.
pub fn parse_wire_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn de_wire_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_wire_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized date: {raw}")))
}

fn de_optional_user<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UserId, D::Error> {
    Ok(Option::<UserId>::deserialize(deserializer)?.unwrap_or_default())
}
