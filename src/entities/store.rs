//! In-memory collections of groups, properties and bookings.
//!
//! Every `replace_*` is a targeted splice: records matching the scope key are
//! removed and the new list inserted. Nothing outside the scope is touched.
//! Insertion order is preserved (`IndexMap`) because property order drives
//! color assignment.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::model::{Booking, BookingId, Group, GroupId, Property, PropertyId};
use super::selection::{BookingScope, Selection};

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    groups: IndexMap<GroupId, Group>,
    properties: IndexMap<PropertyId, Property>,
    bookings: IndexMap<BookingId, Booking>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything (logout).
    pub fn clear(&mut self) {
        self.groups.clear();
        self.properties.clear();
        self.bookings.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.properties.is_empty() && self.bookings.is_empty()
    }

    // ========== Groups ==========

    /// Groups are scoped to the user, so the whole list is the scope.
    pub fn replace_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups.into_iter().map(|g| (g.id.clone(), g)).collect();
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn first_group(&self) -> Option<&Group> {
        self.groups.first().map(|(_, g)| g)
    }

    // ========== Properties ==========

    /// Replace the properties of `group_id`. `group_id` is attached to every
    /// incoming record; properties of other groups stay as they are. Bookings
    /// of properties that left the group go with them.
    pub fn replace_properties(&mut self, group_id: &GroupId, properties: Vec<Property>) {
        let incoming: HashSet<&PropertyId> = properties.iter().map(|p| &p.id).collect();
        let departed: HashSet<PropertyId> = self
            .property_ids_of(group_id)
            .into_iter()
            .filter(|id| !incoming.contains(id))
            .collect();
        if !departed.is_empty() {
            log::debug!("Dropping bookings of {} departed properties", departed.len());
            self.bookings.retain(|_, b| !departed.contains(&b.property_id));
        }

        self.properties.retain(|_, p| &p.group_id != group_id);
        for mut property in properties {
            property.group_id = group_id.clone();
            self.properties.insert(property.id.clone(), property);
        }
    }

    /// Properties of a group in load order.
    pub fn properties_of(&self, group_id: &GroupId) -> Vec<&Property> {
        self.properties
            .values()
            .filter(|p| &p.group_id == group_id)
            .collect()
    }

    pub fn property(&self, id: &PropertyId) -> Option<&Property> {
        self.properties.get(id)
    }

    /// Set or clear a property's explicit color locally. Returns false if the
    /// property isn't loaded.
    pub fn set_property_color(&mut self, id: &PropertyId, color: Option<String>) -> bool {
        match self.properties.get_mut(id) {
            Some(property) => {
                property.color = color;
                true
            }
            None => false,
        }
    }

    // ========== Bookings ==========

    /// Replace the bookings of one property.
    pub fn replace_bookings_for_property(&mut self, property_id: &PropertyId, bookings: Vec<Booking>) {
        self.bookings.retain(|_, b| &b.property_id != property_id);
        self.insert_bookings(bookings);
    }

    /// Replace the bookings of every property in a group (aggregate view).
    ///
    /// The scope is the group's loaded properties plus any property the
    /// response mentions, so bookings of a property the store hasn't seen yet
    /// can't linger as duplicates on the next refresh.
    pub fn replace_bookings_for_group(&mut self, group_id: &GroupId, bookings: Vec<Booking>) {
        let mut scope = self.property_ids_of(group_id);
        scope.extend(bookings.iter().map(|b| b.property_id.clone()));
        self.bookings.retain(|_, b| !scope.contains(&b.property_id));
        self.insert_bookings(bookings);
    }

    /// Remove bookings of all properties in a group.
    pub fn clear_bookings_for_group(&mut self, group_id: &GroupId) {
        let scope = self.property_ids_of(group_id);
        self.bookings.retain(|_, b| !scope.contains(&b.property_id));
    }

    pub fn booking(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    pub fn bookings_len(&self) -> usize {
        self.bookings.len()
    }

    /// Bookings for a scope: one property, or every property of the group.
    pub fn bookings_in_scope(&self, scope: &BookingScope) -> Vec<&Booking> {
        match scope {
            BookingScope::Property { property, .. } => self
                .bookings
                .values()
                .filter(|b| &b.property_id == property)
                .collect(),
            BookingScope::Group(group) => {
                let members = self.property_ids_of(group);
                self.bookings
                    .values()
                    .filter(|b| members.contains(&b.property_id))
                    .collect()
            }
        }
    }

    /// What the calendar shows for a selection. Empty unless a property or the
    /// aggregate view is selected.
    pub fn bookings_visible_for(&self, selection: &Selection) -> Vec<&Booking> {
        match selection.booking_scope() {
            Some(scope) => self.bookings_in_scope(&scope),
            None => Vec::new(),
        }
    }

    fn insert_bookings(&mut self, bookings: Vec<Booking>) {
        for booking in bookings {
            self.bookings.insert(booking.id.clone(), booking);
        }
    }

    fn property_ids_of(&self, group_id: &GroupId) -> HashSet<PropertyId> {
        self.properties
            .values()
            .filter(|p| &p.group_id == group_id)
            .map(|p| p.id.clone())
            .collect()
    }
}
