//! Entity identity and typed handles.
//!
//! # Responsibility
//! - Define the handle types callers pass back into the persistor.
//! - Classify handles by capability (`Entity`, `TimelineEntity`, `Labeled`).
//!
//! # Invariants
//! - Handles are only minted by the persistor from live container nodes.
//! - A handle whose entity was deleted resolves to `NotFound` on use.

use crate::store::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of every persisted entity.
pub type EntityId = Uuid;

/// Persisted entity category, recorded as the `kind` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Source,
    Experiment,
    EpochGroup,
}

impl EntityKind {
    /// Stable attribute value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Experiment => "experiment",
            Self::EpochGroup => "epochGroup",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "source" => Some(Self::Source),
            "experiment" => Some(Self::Experiment),
            "epochGroup" => Some(Self::EpochGroup),
            _ => None,
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities shared by every persisted node: identity, properties,
/// keywords and notes.
pub trait Entity {
    fn id(&self) -> EntityId;
    fn kind(&self) -> EntityKind;
    /// Container node holding this entity.
    fn node(&self) -> NodeId;
}

/// Entities with a start time and an optional end time.
pub trait TimelineEntity: Entity {}

/// Entities with a mutable label.
pub trait Labeled: Entity {}

macro_rules! entity_handle {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            id: EntityId,
            node: NodeId,
        }

        impl $name {
            pub(crate) fn new(id: EntityId, node: NodeId) -> Self {
                Self { id, node }
            }
        }

        impl Entity for $name {
            fn id(&self) -> EntityId {
                self.id
            }

            fn kind(&self) -> EntityKind {
                $kind
            }

            fn node(&self) -> NodeId {
                self.node
            }
        }
    };
}

entity_handle!(
    /// Node in the tree of recording sources.
    Source,
    EntityKind::Source
);
entity_handle!(
    /// Recording session with a purpose and top-level epoch groups.
    Experiment,
    EntityKind::Experiment
);
entity_handle!(
    /// Time-bounded block of recording tied to one source.
    EpochGroup,
    EntityKind::EpochGroup
);

impl TimelineEntity for Experiment {}
impl TimelineEntity for EpochGroup {}
impl Labeled for Source {}
impl Labeled for EpochGroup {}

/// Any entity handle, as returned by identity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Source(Source),
    Experiment(Experiment),
    EpochGroup(EpochGroup),
}

impl EntityRef {
    pub fn as_source(&self) -> Option<Source> {
        match self {
            Self::Source(source) => Some(*source),
            _ => None,
        }
    }

    pub fn as_experiment(&self) -> Option<Experiment> {
        match self {
            Self::Experiment(experiment) => Some(*experiment),
            _ => None,
        }
    }

    pub fn as_epoch_group(&self) -> Option<EpochGroup> {
        match self {
            Self::EpochGroup(group) => Some(*group),
            _ => None,
        }
    }

    pub(crate) fn from_parts(kind: EntityKind, id: EntityId, node: NodeId) -> Self {
        match kind {
            EntityKind::Source => Self::Source(Source::new(id, node)),
            EntityKind::Experiment => Self::Experiment(Experiment::new(id, node)),
            EntityKind::EpochGroup => Self::EpochGroup(EpochGroup::new(id, node)),
        }
    }
}

impl Entity for EntityRef {
    fn id(&self) -> EntityId {
        match self {
            Self::Source(inner) => inner.id(),
            Self::Experiment(inner) => inner.id(),
            Self::EpochGroup(inner) => inner.id(),
        }
    }

    fn kind(&self) -> EntityKind {
        match self {
            Self::Source(_) => EntityKind::Source,
            Self::Experiment(_) => EntityKind::Experiment,
            Self::EpochGroup(_) => EntityKind::EpochGroup,
        }
    }

    fn node(&self) -> NodeId {
        match self {
            Self::Source(inner) => inner.node(),
            Self::Experiment(inner) => inner.node(),
            Self::EpochGroup(inner) => inner.node(),
        }
    }
}

impl From<Source> for EntityRef {
    fn from(value: Source) -> Self {
        Self::Source(value)
    }
}

impl From<Experiment> for EntityRef {
    fn from(value: Experiment) -> Self {
        Self::Experiment(value)
    }
}

impl From<EpochGroup> for EntityRef {
    fn from(value: EpochGroup) -> Self {
        Self::EpochGroup(value)
    }
}

#[cfg(test)]
mod tests {
    use super::EntityKind;

    #[test]
    fn kind_attribute_values_round_trip() {
        for kind in [
            EntityKind::Source,
            EntityKind::Experiment,
            EntityKind::EpochGroup,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("epoch"), None);
    }
}
