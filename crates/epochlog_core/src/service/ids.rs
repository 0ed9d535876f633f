//! Entity identifier generators.
//!
//! Generators are injected so tests can replay a fixed identifier sequence.

use crate::model::entity::EntityId;
use std::collections::VecDeque;
use uuid::Uuid;

/// Source of identifiers for new entities.
pub trait IdGenerator: Send {
    /// Returns `None` once the generator is exhausted.
    fn next_id(&mut self) -> Option<EntityId>;
}

impl<F> IdGenerator for F
where
    F: FnMut() -> EntityId + Send,
{
    fn next_id(&mut self) -> Option<EntityId> {
        Some((self)())
    }
}

/// Random (v4) identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&mut self) -> Option<EntityId> {
        Some(Uuid::new_v4())
    }
}

/// Replays a caller-supplied identifier sequence.
#[derive(Debug, Default, Clone)]
pub struct SequenceIdGenerator {
    ids: VecDeque<EntityId>,
}

impl SequenceIdGenerator {
    pub fn new(ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&mut self) -> Option<EntityId> {
        self.ids.pop_front()
    }
}
