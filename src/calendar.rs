//! Derived views handed to the calendar widget: events and the color legend.
//!
//! Recomputed from the store on demand; nothing here is cached.

use chrono::{DateTime, Utc};

use crate::entities::{BookingId, EntityStore, PropertyColors, PropertyId, Selection, assign_colors};

/// One booking as the calendar draws it.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub booking_id: BookingId,
    pub property_id: PropertyId,
    /// Guest name.
    pub title: String,
    /// "guest - property".
    pub tooltip: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub background: String,
    pub text: &'static str,
}

/// Legend row in the aggregate view.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub property_id: PropertyId,
    pub name: String,
    pub background: String,
    pub text: &'static str,
}

/// Colors for the properties of the selected group, in load order.
pub fn group_colors(store: &EntityStore, selection: &Selection) -> PropertyColors {
    match selection.group() {
        Some(group) => assign_colors(store.properties_of(group)),
        None => PropertyColors::default(),
    }
}

/// Events for the bookings the selection shows, sorted by start date.
pub fn calendar_events(store: &EntityStore, selection: &Selection) -> Vec<CalendarEvent> {
    let colors = group_colors(store, selection);

    // Visible bookings all belong to the group's properties, so both lookups hit.
    let mut events: Vec<CalendarEvent> = store
        .bookings_visible_for(selection)
        .into_iter()
        .filter_map(|booking| {
            let property = store.property(&booking.property_id)?;
            let color = colors.get(&booking.property_id)?;
            Some(CalendarEvent {
                booking_id: booking.id.clone(),
                property_id: booking.property_id.clone(),
                title: booking.guest_name.clone(),
                tooltip: format!("{} - {}", booking.guest_name, property.name),
                start: booking.start_date,
                end: booking.end_date,
                background: color.background_css(),
                text: color.text_css(),
            })
        })
        .collect();
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.booking_id.cmp(&b.booking_id)));
    events
}

/// Legend for the aggregate view. Empty in any other mode.
pub fn legend(store: &EntityStore, selection: &Selection) -> Vec<LegendEntry> {
    let Selection::AllPropertiesSelected { group } = selection else {
        return Vec::new();
    };
    let colors = assign_colors(store.properties_of(group));
    store
        .properties_of(group)
        .into_iter()
        .filter_map(|property| {
            colors.get(&property.id).map(|color| LegendEntry {
                property_id: property.id.clone(),
                name: property.name.clone(),
                background: color.background_css(),
                text: color.text_css(),
            })
        })
        .collect()
}
