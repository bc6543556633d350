//! Declarative invalidation rules.
//!
//! The invalidation map is a static table from mutation/event kinds to the
//! foreground cache keys they affect and the action to take. The
//! coordinator consults it after every successful mutation and for every
//! inbound real-time message.

use crate::coordinator::QueryKey;
use std::collections::HashMap;
use std::fmt;

/// A mutation completion or inbound real-time message.
///
/// Events carry the payload needed to resolve parameterized key patterns
/// (typically the affected entity type and id).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationEvent {
    /// An entity of the given type was created.
    EntityCreated { entity: String },
    /// An entity was updated.
    EntityUpdated { entity: String, id: String },
    /// An entity was deleted.
    EntityDeleted { entity: String, id: String },
    /// A bulk operation touched many entities of one type.
    BulkOperation { entity: String },
    /// A prediction was generated for a subject.
    PredictionGenerated { subject_id: String },
    /// A metric sample was recorded.
    MetricRecorded { name: String },
    /// The current user's role changed; nothing cached can be trusted.
    RoleChanged,
    /// The session ended.
    Logout,
}

impl MutationEvent {
    /// The rule-table discriminant for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            MutationEvent::EntityCreated { .. } => EventKind::EntityCreated,
            MutationEvent::EntityUpdated { .. } => EventKind::EntityUpdated,
            MutationEvent::EntityDeleted { .. } => EventKind::EntityDeleted,
            MutationEvent::BulkOperation { .. } => EventKind::BulkOperation,
            MutationEvent::PredictionGenerated { .. } => EventKind::PredictionGenerated,
            MutationEvent::MetricRecorded { .. } => EventKind::MetricRecorded,
            MutationEvent::RoleChanged => EventKind::RoleChanged,
            MutationEvent::Logout => EventKind::Logout,
        }
    }

    /// The entity type this event concerns, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            MutationEvent::EntityCreated { entity }
            | MutationEvent::EntityUpdated { entity, .. }
            | MutationEvent::EntityDeleted { entity, .. }
            | MutationEvent::BulkOperation { entity } => Some(entity),
            _ => None,
        }
    }

    /// The entity id this event concerns, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            MutationEvent::EntityUpdated { id, .. }
            | MutationEvent::EntityDeleted { id, .. } => Some(id),
            MutationEvent::PredictionGenerated { subject_id } => Some(subject_id),
            _ => None,
        }
    }
}

/// Discriminant of [`MutationEvent`], used as the rule-table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    BulkOperation,
    PredictionGenerated,
    MetricRecorded,
    RoleChanged,
    Logout,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::EntityCreated => "entity-created",
            EventKind::EntityUpdated => "entity-updated",
            EventKind::EntityDeleted => "entity-deleted",
            EventKind::BulkOperation => "bulk-operation",
            EventKind::PredictionGenerated => "prediction-generated",
            EventKind::MetricRecorded => "metric-recorded",
            EventKind::RoleChanged => "role-changed",
            EventKind::Logout => "logout",
        };
        write!(f, "{}", s)
    }
}

/// What to do with each resolved key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Drop the cached value; the next read re-fetches.
    InvalidateOnly,
    /// Drop the cached value and immediately start a background re-fetch.
    InvalidateAndRefetch,
    /// Delete the key entirely, so the entity reads as absent (used for
    /// deletions, to prevent stale reads of now-nonexistent entities).
    Remove,
}

/// A pattern over foreground cache keys, resolved against an event payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPattern {
    /// Every key whose entity family matches the event's entity type.
    Entity,
    /// Keys of the event's entity type carrying the event id as their
    /// `id` parameter.
    EntityById,
    /// Every key of a fixed named family, e.g. `"predictions"`.
    Family(String),
    /// Every key (wildcard; used by role-changed and logout).
    All,
}

impl KeyPattern {
    /// Whether `key` matches this pattern for the given event.
    pub fn matches(&self, key: &QueryKey, event: &MutationEvent) -> bool {
        match self {
            KeyPattern::Entity => Some(key.entity()) == event.entity(),
            KeyPattern::EntityById => {
                Some(key.entity()) == event.entity()
                    && key.param("id").is_some()
                    && key.param("id") == event.id()
            }
            KeyPattern::Family(name) => key.entity() == name,
            KeyPattern::All => true,
        }
    }
}

/// One rule: the ordered key patterns an event affects, and the action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidationRule {
    pub action: Action,
    pub patterns: Vec<KeyPattern>,
}

impl InvalidationRule {
    pub fn new(action: Action, patterns: Vec<KeyPattern>) -> Self {
        InvalidationRule { action, patterns }
    }

    /// Whether `key` is affected by this rule for the given event.
    pub fn matches(&self, key: &QueryKey, event: &MutationEvent) -> bool {
        self.patterns.iter().any(|p| p.matches(key, event))
    }
}

/// Static table mapping event kinds to invalidation rules.
///
/// New event kinds must be addable without breaking older coordinators, so
/// a lookup miss is logged and ignored rather than treated as fatal.
#[derive(Clone, Debug)]
pub struct InvalidationMap {
    rules: HashMap<EventKind, InvalidationRule>,
}

impl InvalidationMap {
    /// An empty map (every event is ignored).
    pub fn empty() -> Self {
        InvalidationMap {
            rules: HashMap::new(),
        }
    }

    /// The standard rule set:
    ///
    /// | Event | Action | Patterns |
    /// |-------|--------|----------|
    /// | entity-created | invalidate-and-refetch | entity family |
    /// | entity-updated | invalidate-and-refetch | entity by id, entity family |
    /// | entity-deleted | remove | entity by id, entity family |
    /// | bulk-operation | invalidate-only | entity family |
    /// | prediction-generated | invalidate-and-refetch | `predictions` family |
    /// | metric-recorded | invalidate-only | `metrics` family |
    /// | role-changed | invalidate-only | everything |
    /// | logout | remove | everything |
    pub fn standard() -> Self {
        InvalidationMap::empty()
            .with_rule(
                EventKind::EntityCreated,
                InvalidationRule::new(Action::InvalidateAndRefetch, vec![KeyPattern::Entity]),
            )
            .with_rule(
                EventKind::EntityUpdated,
                InvalidationRule::new(
                    Action::InvalidateAndRefetch,
                    vec![KeyPattern::EntityById, KeyPattern::Entity],
                ),
            )
            .with_rule(
                EventKind::EntityDeleted,
                InvalidationRule::new(
                    Action::Remove,
                    vec![KeyPattern::EntityById, KeyPattern::Entity],
                ),
            )
            .with_rule(
                EventKind::BulkOperation,
                InvalidationRule::new(Action::InvalidateOnly, vec![KeyPattern::Entity]),
            )
            .with_rule(
                EventKind::PredictionGenerated,
                InvalidationRule::new(
                    Action::InvalidateAndRefetch,
                    vec![KeyPattern::Family("predictions".to_string())],
                ),
            )
            .with_rule(
                EventKind::MetricRecorded,
                InvalidationRule::new(
                    Action::InvalidateOnly,
                    vec![KeyPattern::Family("metrics".to_string())],
                ),
            )
            .with_rule(
                EventKind::RoleChanged,
                InvalidationRule::new(Action::InvalidateOnly, vec![KeyPattern::All]),
            )
            .with_rule(
                EventKind::Logout,
                InvalidationRule::new(Action::Remove, vec![KeyPattern::All]),
            )
    }

    /// Add or replace a rule.
    pub fn with_rule(mut self, kind: EventKind, rule: InvalidationRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    /// Look up the rule for an event kind.
    pub fn rule_for(&self, kind: EventKind) -> Option<&InvalidationRule> {
        self.rules.get(&kind)
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for InvalidationMap {
    fn default() -> Self {
        InvalidationMap::standard()
    }
}
