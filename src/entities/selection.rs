//! Group / property selection as an explicit state machine.
//!
//! All changes go through [`Selection::transition`], which validates against
//! the store. A selected property always belongs to the selected group: a
//! group switch clears the property, and a property that disappears from a
//! reload is dropped.

use std::fmt;

use super::model::{GroupId, PropertyId};
use super::store::EntityStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// No groups, logged out, or nothing chosen yet.
    #[default]
    NoGroup,
    GroupSelected { group: GroupId },
    PropertySelected { group: GroupId, property: PropertyId },
    /// Aggregate view over every property of the group.
    AllPropertiesSelected { group: GroupId },
}

/// What the property picker can choose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChoice {
    All,
    One(PropertyId),
}

/// Inputs driving [`Selection::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInput {
    /// Groups were (re)loaded into the store.
    GroupsLoaded { auto_select: bool },
    /// User picked a group, or cleared the picker.
    ChooseGroup(Option<GroupId>),
    /// Properties of this group were (re)loaded into the store.
    PropertiesLoaded(GroupId),
    /// User picked a property, the aggregate view, or cleared the picker.
    ChooseProperty(Option<PropertyChoice>),
    /// Session ended.
    Reset,
}

/// Key of the bookings partition a selection shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BookingScope {
    Property { group: GroupId, property: PropertyId },
    Group(GroupId),
}

impl fmt::Display for BookingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingScope::Property { property, .. } => write!(f, "property {}", property),
            BookingScope::Group(group) => write!(f, "group {}", group),
        }
    }
}

/// Rejected user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    NoGroupSelected,
    UnknownGroup(GroupId),
    PropertyNotInGroup { property: PropertyId, group: GroupId },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::NoGroupSelected => write!(f, "Please select a group first"),
            SelectionError::UnknownGroup(group) => write!(f, "Unknown group: {}", group),
            SelectionError::PropertyNotInGroup { property, group } => {
                write!(f, "Property {} does not belong to group {}", property, group)
            }
        }
    }
}

impl std::error::Error for SelectionError {}

impl Selection {
    pub fn group(&self) -> Option<&GroupId> {
        match self {
            Selection::NoGroup => None,
            Selection::GroupSelected { group }
            | Selection::PropertySelected { group, .. }
            | Selection::AllPropertiesSelected { group } => Some(group),
        }
    }

    /// The single selected property (not the aggregate view).
    pub fn property(&self) -> Option<&PropertyId> {
        match self {
            Selection::PropertySelected { property, .. } => Some(property),
            _ => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Selection::AllPropertiesSelected { .. })
    }

    pub fn booking_scope(&self) -> Option<BookingScope> {
        match self {
            Selection::PropertySelected { group, property } => Some(BookingScope::Property {
                group: group.clone(),
                property: property.clone(),
            }),
            Selection::AllPropertiesSelected { group } => Some(BookingScope::Group(group.clone())),
            Selection::NoGroup | Selection::GroupSelected { .. } => None,
        }
    }

    /// Compute the next selection. Pure: the caller applies side effects by
    /// diffing old and new.
    pub fn transition(&self, input: SelectionInput, store: &EntityStore) -> Result<Selection, SelectionError> {
        match input {
            SelectionInput::Reset | SelectionInput::ChooseGroup(None) => Ok(Selection::NoGroup),

            SelectionInput::GroupsLoaded { auto_select } => {
                let current = match self.group() {
                    Some(group) if store.group(group).is_none() => Selection::NoGroup,
                    _ => self.clone(),
                };
                if current == Selection::NoGroup && auto_select {
                    if let Some(first) = store.first_group() {
                        return Ok(Selection::GroupSelected { group: first.id.clone() });
                    }
                }
                Ok(current)
            }

            SelectionInput::ChooseGroup(Some(group)) => {
                if store.group(&group).is_none() {
                    return Err(SelectionError::UnknownGroup(group));
                }
                if self.group() == Some(&group) {
                    return Ok(self.clone());
                }
                Ok(Selection::GroupSelected { group })
            }

            SelectionInput::PropertiesLoaded(loaded) => {
                if self.group() != Some(&loaded) {
                    return Ok(self.clone());
                }
                let properties = store.properties_of(&loaded);
                if properties.is_empty() {
                    return Ok(Selection::GroupSelected { group: loaded });
                }
                match self {
                    Selection::PropertySelected { property, .. }
                        if properties.iter().any(|p| &p.id == property) =>
                    {
                        Ok(self.clone())
                    }
                    Selection::AllPropertiesSelected { .. } => Ok(self.clone()),
                    // Nothing (still) selected under a non-empty group
                    _ => Ok(Selection::AllPropertiesSelected { group: loaded }),
                }
            }

            SelectionInput::ChooseProperty(choice) => {
                let group = self.group().cloned().ok_or(SelectionError::NoGroupSelected)?;
                match choice {
                    None => Ok(Selection::GroupSelected { group }),
                    Some(PropertyChoice::All) => Ok(Selection::AllPropertiesSelected { group }),
                    Some(PropertyChoice::One(property)) => {
                        match store.property(&property) {
                            Some(p) if p.group_id == group => {
                                Ok(Selection::PropertySelected { group, property })
                            }
                            _ => Err(SelectionError::PropertyNotInGroup { property, group }),
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::NoGroup => write!(f, "no group"),
            Selection::GroupSelected { group } => write!(f, "group {}", group),
            Selection::PropertySelected { group, property } => {
                write!(f, "group {} / property {}", group, property)
            }
            Selection::AllPropertiesSelected { group } => write!(f, "group {} / all properties", group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::model::Property;
    use crate::test_support::group;

    fn store() -> EntityStore {
        let mut store = EntityStore::new();
        store.replace_groups(vec![group("g1", "Lake House Crew"), group("g2", "Ski Lodge")]);
        store.replace_properties(
            &"g1".into(),
            vec![Property::new("a", "Cabin", "g1"), Property::new("b", "Boathouse", "g1")],
        );
        store
    }

    #[test]
    fn test_initial_load_auto_selects_first_group() {
        let s = Selection::NoGroup
            .transition(SelectionInput::GroupsLoaded { auto_select: true }, &store())
            .unwrap();
        assert_eq!(s, Selection::GroupSelected { group: "g1".into() });
    }

    #[test]
    fn test_refresh_does_not_override_user_choice() {
        let chosen = Selection::GroupSelected { group: "g2".into() };
        let s = chosen
            .transition(SelectionInput::GroupsLoaded { auto_select: true }, &store())
            .unwrap();
        assert_eq!(s, chosen);

        let s = Selection::NoGroup
            .transition(SelectionInput::GroupsLoaded { auto_select: false }, &store())
            .unwrap();
        assert_eq!(s, Selection::NoGroup);
    }

    #[test]
    fn test_vanished_group_resets() {
        let gone = Selection::AllPropertiesSelected { group: "g9".into() };
        let s = gone
            .transition(SelectionInput::GroupsLoaded { auto_select: false }, &store())
            .unwrap();
        assert_eq!(s, Selection::NoGroup);
    }

    #[test]
    fn test_group_switch_clears_property() {
        let s = Selection::PropertySelected { group: "g1".into(), property: "a".into() }
            .transition(SelectionInput::ChooseGroup(Some("g2".into())), &store())
            .unwrap();
        assert_eq!(s, Selection::GroupSelected { group: "g2".into() });
        assert!(s.property().is_none());
    }

    #[test]
    fn test_reselecting_same_group_keeps_property() {
        let current = Selection::PropertySelected { group: "g1".into(), property: "a".into() };
        let s = current
            .transition(SelectionInput::ChooseGroup(Some("g1".into())), &store())
            .unwrap();
        assert_eq!(s, current);
    }

    #[test]
    fn test_unknown_group_rejected() {
        let err = Selection::NoGroup
            .transition(SelectionInput::ChooseGroup(Some("nope".into())), &store())
            .unwrap_err();
        assert_eq!(err, SelectionError::UnknownGroup("nope".into()));
    }

    #[test]
    fn test_properties_loaded_advances_to_aggregate() {
        let s = Selection::GroupSelected { group: "g1".into() }
            .transition(SelectionInput::PropertiesLoaded("g1".into()), &store())
            .unwrap();
        assert_eq!(s, Selection::AllPropertiesSelected { group: "g1".into() });
    }

    #[test]
    fn test_properties_loaded_empty_group() {
        let s = Selection::AllPropertiesSelected { group: "g2".into() }
            .transition(SelectionInput::PropertiesLoaded("g2".into()), &store())
            .unwrap();
        assert_eq!(s, Selection::GroupSelected { group: "g2".into() });
    }

    #[test]
    fn test_properties_loaded_for_other_group_ignored() {
        let current = Selection::GroupSelected { group: "g2".into() };
        let s = current
            .transition(SelectionInput::PropertiesLoaded("g1".into()), &store())
            .unwrap();
        assert_eq!(s, current);
    }

    #[test]
    fn test_vanished_property_dropped() {
        let mut store = store();
        let current = Selection::PropertySelected { group: "g1".into(), property: "b".into() };
        store.replace_properties(&"g1".into(), vec![Property::new("a", "Cabin", "g1")]);
        let s = current
            .transition(SelectionInput::PropertiesLoaded("g1".into()), &store)
            .unwrap();
        assert_eq!(s, Selection::AllPropertiesSelected { group: "g1".into() });

        let kept = Selection::PropertySelected { group: "g1".into(), property: "a".into() };
        let s = kept
            .transition(SelectionInput::PropertiesLoaded("g1".into()), &store)
            .unwrap();
        assert_eq!(s, kept);
    }

    #[test]
    fn test_choose_property_validates_group() {
        let store = store();
        let in_group = Selection::GroupSelected { group: "g1".into() };
        assert_eq!(
            in_group
                .transition(SelectionInput::ChooseProperty(Some(PropertyChoice::One("b".into()))), &store)
                .unwrap(),
            Selection::PropertySelected { group: "g1".into(), property: "b".into() }
        );

        let other = Selection::GroupSelected { group: "g2".into() };
        assert!(matches!(
            other.transition(SelectionInput::ChooseProperty(Some(PropertyChoice::One("b".into()))), &store),
            Err(SelectionError::PropertyNotInGroup { .. })
        ));

        assert_eq!(
            Selection::NoGroup.transition(SelectionInput::ChooseProperty(Some(PropertyChoice::All)), &store),
            Err(SelectionError::NoGroupSelected)
        );
    }

    #[test]
    fn test_booking_scope() {
        assert_eq!(
            Selection::AllPropertiesSelected { group: "g1".into() }.booking_scope(),
            Some(BookingScope::Group("g1".into()))
        );
        assert_eq!(Selection::GroupSelected { group: "g1".into() }.booking_scope(), None);
        assert!(Selection::AllPropertiesSelected { group: "g1".into() }.is_aggregate());
    }
}
