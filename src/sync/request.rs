//! Scope-tagged requests.
//!
//! Every call the engine issues gets a [`Ticket`]. Fetches also carry the
//! [`FetchScope`] they target, so a completion can be checked against the
//! selection that is current when it lands.

use std::fmt;

use crate::entities::{
    Booking, BookingDraft, BookingId, BookingScope, Group, GroupId, Property, PropertyId, PropertyRecord,
    UserId,
};
use crate::transport::{Transport, TransportError};

/// Monotonic request id. Later tickets were issued later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub(crate) u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which partition of the store a fetch refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchScope {
    Groups { user: UserId },
    Properties { group: GroupId },
    Bookings(BookingScope),
}

/// Fetches in the same slot supersede each other: only the newest ticket per
/// slot may write to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchSlot {
    Groups,
    Properties,
    Bookings,
}

impl FetchScope {
    pub fn slot(&self) -> FetchSlot {
        match self {
            FetchScope::Groups { .. } => FetchSlot::Groups,
            FetchScope::Properties { .. } => FetchSlot::Properties,
            FetchScope::Bookings(_) => FetchSlot::Bookings,
        }
    }
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchScope::Groups { user } => write!(f, "groups of user {}", user),
            FetchScope::Properties { group } => write!(f, "properties of group {}", group),
            FetchScope::Bookings(scope) => write!(f, "bookings of {}", scope),
        }
    }
}

/// Server-side changes. Confirmations trigger targeted refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateGroup { name: String },
    JoinGroup { code: String },
    CreateProperty { group: GroupId, name: String },
    /// Empty `color` resets to the derived color.
    UpdatePropertyColor { property: PropertyId, color: String },
    CreateBooking { property: PropertyId, draft: BookingDraft },
    UpdateBooking { booking: BookingId, draft: BookingDraft },
    DeleteBooking { booking: BookingId },
    CreateGroupCode { group: GroupId },
}

impl Mutation {
    /// Short label for logs and fallback error text.
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::CreateGroup { .. } => "create group",
            Mutation::JoinGroup { .. } => "join group",
            Mutation::CreateProperty { .. } => "add property",
            Mutation::UpdatePropertyColor { .. } => "update property color",
            Mutation::CreateBooking { .. } => "create booking",
            Mutation::UpdateBooking { .. } => "update booking",
            Mutation::DeleteBooking { .. } => "delete booking",
            Mutation::CreateGroupCode { .. } => "create group code",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Fetch(FetchScope),
    Mutate(Mutation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiReply {
    Groups(Vec<Group>),
    Properties(Vec<Property>),
    Bookings(Vec<Booking>),
    Group(Group),
    Property(PropertyRecord),
    Booking(Booking),
    GroupCode(String),
    Deleted,
}

impl ApiCall {
    /// Perform the call. Blocking.
    pub fn run(&self, transport: &dyn Transport) -> Result<ApiReply, TransportError> {
        match self {
            ApiCall::Fetch(scope) => match scope {
                FetchScope::Groups { user } => transport.list_groups(user).map(ApiReply::Groups),
                FetchScope::Properties { group } => transport.list_properties(group).map(ApiReply::Properties),
                FetchScope::Bookings(BookingScope::Property { property, .. }) => {
                    transport.list_property_bookings(property).map(ApiReply::Bookings)
                }
                FetchScope::Bookings(BookingScope::Group(group)) => {
                    transport.list_group_bookings(group).map(ApiReply::Bookings)
                }
            },
            ApiCall::Mutate(mutation) => match mutation {
                Mutation::CreateGroup { name } => transport.create_group(name).map(ApiReply::Group),
                Mutation::JoinGroup { code } => transport.join_group(code).map(ApiReply::Group),
                Mutation::CreateProperty { group, name } => {
                    transport.create_property(group, name).map(ApiReply::Property)
                }
                Mutation::UpdatePropertyColor { property, color } => {
                    transport.update_property_color(property, color).map(ApiReply::Property)
                }
                Mutation::CreateBooking { property, draft } => {
                    transport.create_booking(property, draft).map(ApiReply::Booking)
                }
                Mutation::UpdateBooking { booking, draft } => {
                    transport.update_booking(booking, draft).map(ApiReply::Booking)
                }
                Mutation::DeleteBooking { booking } => transport.delete_booking(booking).map(|_| ApiReply::Deleted),
                Mutation::CreateGroupCode { group } => transport.create_group_code(group).map(ApiReply::GroupCode),
            },
        }
    }
}
