//! Entities: the booking data model and the pure logic over it.
//!
//! Nothing in here does I/O. The sync engine owns an [`EntityStore`] and a
//! [`Selection`] and is the only writer.

pub mod colors;
pub mod model;
pub mod selection;
pub mod store;

pub use colors::{PropertyColor, PropertyColors, Swatch, TextColor, assign_colors};
pub use model::{
    Booking, BookingDraft, BookingId, Group, GroupId, Property, PropertyId, PropertyRecord, UserId,
};
pub use selection::{BookingScope, PropertyChoice, Selection, SelectionError, SelectionInput};
pub use store::EntityStore;
