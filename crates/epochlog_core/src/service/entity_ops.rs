//! Per-entity reads and metadata mutations.
//!
//! # Responsibility
//! - Properties, keywords and notes on any entity.
//! - Labels, purpose and timeline bounds.
//! - Navigation between sources, experiments and epoch groups.
//!
//! # Invariants
//! - Scalar properties are attributes of the entity's `properties` group;
//!   measurements are subgroups named by their key. A key is never both.
//! - Keywords form a set persisted as one sorted, comma-joined attribute.
//! - Notes are appended only; reads return them in append order.

use crate::model::entity::{
    Entity, EntityKind, EntityRef, EpochGroup, Experiment, Labeled, Source, TimelineEntity,
};
use crate::model::note::{decode_note, encode_note, Note};
use crate::model::time::{from_utc_ticks, Timestamp};
use crate::model::value::{Measurement, PropertyValue};
use crate::service::error::{PersistorError, PersistorResult};
use crate::service::layout::{
    TimeBound, ATTR_BASE_UNIT, ATTR_EXPONENT, ATTR_KEYWORDS, ATTR_KIND, ATTR_LABEL, ATTR_PURPOSE,
    ATTR_QUANTITY, ATTR_UUID, EPOCH_GROUPS, KEYWORD_DELIMITER, NOTES, PROPERTIES, SOURCES,
    SOURCE_LINK,
};
use crate::service::persistor::{invalid_data, text_value, EpochPersistor};
use crate::store::{validate_name, AttributeValue, HierarchicalStore, NodeId};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

impl<S: HierarchicalStore> EpochPersistor<S> {
    pub fn label(&self, entity: &impl Labeled) -> PersistorResult<String> {
        self.read_text(self.live(entity)?, ATTR_LABEL)
    }

    pub fn set_label(&mut self, entity: &impl Labeled, label: &str) -> PersistorResult<()> {
        let node = self.live(entity)?;
        self.store.set_attribute(node, ATTR_LABEL, &text_value(label))?;
        Ok(())
    }

    pub fn purpose(&self, experiment: &Experiment) -> PersistorResult<String> {
        self.read_text(self.live(experiment)?, ATTR_PURPOSE)
    }

    pub fn set_purpose(&mut self, experiment: &Experiment, purpose: &str) -> PersistorResult<()> {
        let node = self.live(experiment)?;
        self.store
            .set_attribute(node, ATTR_PURPOSE, &text_value(purpose))?;
        Ok(())
    }

    pub fn start_time(&self, entity: &impl TimelineEntity) -> PersistorResult<Timestamp> {
        self.read_time(self.live(entity)?, TimeBound::Start)?
            .ok_or_else(|| invalid_data(format!("{} {} has no start time", entity.kind(), entity.id())))
    }

    /// `None` while the entity is open.
    pub fn end_time(&self, entity: &impl TimelineEntity) -> PersistorResult<Option<Timestamp>> {
        self.read_time(self.live(entity)?, TimeBound::End)
    }

    pub fn is_open(&self, entity: &impl TimelineEntity) -> PersistorResult<bool> {
        Ok(self.end_time(entity)?.is_none())
    }

    /// Direct children of `source`, in creation order.
    pub fn child_sources(&self, source: &Source) -> PersistorResult<Vec<Source>> {
        let container = self.container(self.live(source)?, SOURCES)?;
        self.store
            .children(container)?
            .into_iter()
            .map(|(_, node)| self.load_source(node))
            .collect()
    }

    /// Epoch groups recorded from `source`, in the order they were begun.
    pub fn source_epoch_groups(&self, source: &Source) -> PersistorResult<Vec<EpochGroup>> {
        self.epoch_groups_in(self.live(source)?)
    }

    /// Top-level epoch groups of `experiment`.
    pub fn experiment_epoch_groups(
        &self,
        experiment: &Experiment,
    ) -> PersistorResult<Vec<EpochGroup>> {
        self.epoch_groups_in(self.live(experiment)?)
    }

    /// Epoch groups nested directly in `group`.
    pub fn child_epoch_groups(&self, group: &EpochGroup) -> PersistorResult<Vec<EpochGroup>> {
        self.epoch_groups_in(self.live(group)?)
    }

    pub fn epoch_group_source(&self, group: &EpochGroup) -> PersistorResult<Source> {
        let node = self
            .store
            .group(self.live(group)?, SOURCE_LINK)?
            .ok_or_else(|| invalid_data(format!("epoch group {} has no source", group.id())))?;
        self.load_source(node)
    }

    /// Sets `key` to `value`, replacing any previous value of either shape.
    ///
    /// # Errors
    /// - `InvalidArgument` for an invalid key or a NaN quantity.
    pub fn add_property(
        &mut self,
        entity: &impl Entity,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> PersistorResult<()> {
        validate_name(key)?;
        let value = value.into();
        let stored_real = match &value {
            PropertyValue::Float(number) => Some(*number),
            PropertyValue::Measurement(measurement) => Some(measurement.quantity),
            _ => None,
        };
        if stored_real.is_some_and(f64::is_nan) {
            return Err(PersistorError::InvalidArgument(format!(
                "property `{key}` cannot store NaN"
            )));
        }

        let properties = self.container(self.live(entity)?, PROPERTIES)?;
        self.clear_property(properties, key)?;
        match value {
            PropertyValue::String(text) => {
                self.store
                    .set_attribute(properties, key, &AttributeValue::Text(text))?;
            }
            PropertyValue::Integer(number) => {
                self.store
                    .set_attribute(properties, key, &AttributeValue::Integer(number))?;
            }
            PropertyValue::Float(number) => {
                self.store
                    .set_attribute(properties, key, &AttributeValue::Real(number))?;
            }
            PropertyValue::Boolean(flag) => {
                self.store
                    .set_attribute(properties, key, &AttributeValue::Boolean(flag))?;
            }
            PropertyValue::Measurement(measurement) => {
                let node = self.store.create_group(properties, key)?;
                self.store.set_attribute(
                    node,
                    ATTR_QUANTITY,
                    &AttributeValue::Real(measurement.quantity),
                )?;
                self.store.set_attribute(
                    node,
                    ATTR_EXPONENT,
                    &AttributeValue::Integer(i64::from(measurement.exponent)),
                )?;
                self.store.set_attribute(
                    node,
                    ATTR_BASE_UNIT,
                    &AttributeValue::Text(measurement.base_unit),
                )?;
            }
        }

        debug!(
            "event=property_set module=persistor status=ok kind={} id={} key={}",
            entity.kind(),
            entity.id(),
            key
        );
        Ok(())
    }

    /// # Errors
    /// - `NotFound` when the key is not set.
    pub fn remove_property(&mut self, entity: &impl Entity, key: &str) -> PersistorResult<()> {
        let properties = self.container(self.live(entity)?, PROPERTIES)?;
        if !self.clear_property(properties, key)? {
            return Err(PersistorError::NotFound(format!(
                "property `{key}` on {} {}",
                entity.kind(),
                entity.id()
            )));
        }
        debug!(
            "event=property_remove module=persistor status=ok kind={} id={} key={}",
            entity.kind(),
            entity.id(),
            key
        );
        Ok(())
    }

    pub fn property(
        &self,
        entity: &impl Entity,
        key: &str,
    ) -> PersistorResult<Option<PropertyValue>> {
        let properties = self.container(self.live(entity)?, PROPERTIES)?;
        if let Some(value) = self.store.attribute(properties, key)? {
            return Ok(Some(scalar_property(value)));
        }
        match self.store.group(properties, key)? {
            Some(node) => Ok(Some(PropertyValue::Measurement(
                self.read_measurement(node)?,
            ))),
            None => Ok(None),
        }
    }

    /// All properties keyed by name.
    pub fn properties(&self, entity: &impl Entity) -> PersistorResult<BTreeMap<String, PropertyValue>> {
        let properties = self.container(self.live(entity)?, PROPERTIES)?;
        let mut values = BTreeMap::new();
        for (key, value) in self.store.attributes(properties)? {
            values.insert(key, scalar_property(value));
        }
        for (key, node) in self.store.children(properties)? {
            values.insert(key, PropertyValue::Measurement(self.read_measurement(node)?));
        }
        Ok(values)
    }

    pub fn keywords(&self, entity: &impl Entity) -> PersistorResult<BTreeSet<String>> {
        let joined = match self.store.attribute(self.live(entity)?, ATTR_KEYWORDS)? {
            Some(AttributeValue::Text(joined)) => joined,
            Some(other) => {
                return Err(invalid_data(format!(
                    "keywords attribute of {} holds {other:?}",
                    entity.id()
                )))
            }
            None => return Ok(BTreeSet::new()),
        };
        Ok(joined
            .split(KEYWORD_DELIMITER)
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Adds `keyword`; adding one already present is a no-op.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty keyword or one containing `,`.
    pub fn add_keyword(&mut self, entity: &impl Entity, keyword: &str) -> PersistorResult<()> {
        validate_keyword(keyword)?;
        let mut keywords = self.keywords(entity)?;
        if !keywords.insert(keyword.to_string()) {
            return Ok(());
        }
        self.write_keywords(entity.node(), &keywords)?;
        debug!(
            "event=keyword_add module=persistor status=ok kind={} id={} keyword={}",
            entity.kind(),
            entity.id(),
            keyword
        );
        Ok(())
    }

    /// # Errors
    /// - `NotFound` when the keyword is not present.
    pub fn remove_keyword(&mut self, entity: &impl Entity, keyword: &str) -> PersistorResult<()> {
        let mut keywords = self.keywords(entity)?;
        if !keywords.remove(keyword) {
            return Err(PersistorError::NotFound(format!(
                "keyword `{keyword}` on {} {}",
                entity.kind(),
                entity.id()
            )));
        }
        self.write_keywords(entity.node(), &keywords)?;
        debug!(
            "event=keyword_remove module=persistor status=ok kind={} id={} keyword={}",
            entity.kind(),
            entity.id(),
            keyword
        );
        Ok(())
    }

    /// Appends a note and returns it.
    ///
    /// # Errors
    /// - `NoteTextTooLong` when `text` exceeds the fixed text field.
    /// - `InvalidArgument` when `text` contains NUL, or when `timestamp` is
    ///   out of range or finer than 100 ns.
    pub fn add_note(
        &mut self,
        entity: &impl Entity,
        timestamp: Timestamp,
        text: &str,
    ) -> PersistorResult<Note> {
        let note = Note::new(timestamp, text)?;
        let record = encode_note(&note)?;
        let node = self.live(entity)?;
        let index = self.store.append_record(node, NOTES, &record)?;
        debug!(
            "event=note_add module=persistor status=ok kind={} id={} index={}",
            entity.kind(),
            entity.id(),
            index
        );
        Ok(note)
    }

    pub fn notes(&self, entity: &impl Entity) -> PersistorResult<Vec<Note>> {
        self.store
            .read_records(self.live(entity)?, NOTES)?
            .iter()
            .map(|record| decode_note(record).map_err(PersistorError::from))
            .collect()
    }

    pub(super) fn load_entity(&self, node: NodeId) -> PersistorResult<EntityRef> {
        let kind_text = self.read_text(node, ATTR_KIND)?;
        let kind = EntityKind::parse(&kind_text)
            .ok_or_else(|| invalid_data(format!("{node} has unknown kind `{kind_text}`")))?;
        let id_text = self.read_text(node, ATTR_UUID)?;
        let id = Uuid::parse_str(&id_text)
            .map_err(|err| invalid_data(format!("{node} has malformed uuid `{id_text}`: {err}")))?;
        Ok(EntityRef::from_parts(kind, id, node))
    }

    pub(super) fn load_source(&self, node: NodeId) -> PersistorResult<Source> {
        self.load_entity(node)?
            .as_source()
            .ok_or_else(|| invalid_data(format!("{node} is not a source")))
    }

    pub(super) fn load_experiment(&self, node: NodeId) -> PersistorResult<Experiment> {
        self.load_entity(node)?
            .as_experiment()
            .ok_or_else(|| invalid_data(format!("{node} is not an experiment")))
    }

    pub(super) fn load_epoch_group(&self, node: NodeId) -> PersistorResult<EpochGroup> {
        self.load_entity(node)?
            .as_epoch_group()
            .ok_or_else(|| invalid_data(format!("{node} is not an epoch group")))
    }

    pub(super) fn read_time(
        &self,
        node: NodeId,
        bound: TimeBound,
    ) -> PersistorResult<Option<Timestamp>> {
        let Some(ticks) = self.store.attribute(node, bound.ticks_attr())? else {
            return Ok(None);
        };
        let ticks = ticks
            .as_integer()
            .ok_or_else(|| invalid_data(format!("{node} has non-integer {}", bound.ticks_attr())))?;
        let offset_hours = self
            .store
            .attribute(node, bound.offset_attr())?
            .and_then(|value| value.as_real())
            .ok_or_else(|| invalid_data(format!("{node} is missing {}", bound.offset_attr())))?;
        from_utc_ticks(ticks, offset_hours)
            .map(Some)
            .ok_or_else(|| invalid_data(format!("{node} holds an invalid {:?} time", bound)))
    }

    fn epoch_groups_in(&self, owner: NodeId) -> PersistorResult<Vec<EpochGroup>> {
        let container = self.container(owner, EPOCH_GROUPS)?;
        self.store
            .children(container)?
            .into_iter()
            .map(|(_, node)| self.load_epoch_group(node))
            .collect()
    }

    fn read_text(&self, node: NodeId, name: &str) -> PersistorResult<String> {
        match self.store.attribute(node, name)? {
            Some(AttributeValue::Text(value)) => Ok(value),
            Some(other) => Err(invalid_data(format!(
                "{node} attribute `{name}` holds {other:?}"
            ))),
            None => Err(invalid_data(format!("{node} has no `{name}` attribute"))),
        }
    }

    fn read_measurement(&self, node: NodeId) -> PersistorResult<Measurement> {
        let quantity = self
            .store
            .attribute(node, ATTR_QUANTITY)?
            .and_then(|value| value.as_real())
            .ok_or_else(|| invalid_data(format!("measurement {node} has no quantity")))?;
        let exponent = self
            .store
            .attribute(node, ATTR_EXPONENT)?
            .and_then(|value| value.as_integer())
            .and_then(|value| i32::try_from(value).ok())
            .ok_or_else(|| invalid_data(format!("measurement {node} has no valid exponent")))?;
        let base_unit = self.read_text(node, ATTR_BASE_UNIT)?;
        Ok(Measurement::new(quantity, exponent, base_unit))
    }

    /// Removes `key` in whichever shape it is stored. Returns whether
    /// anything was removed.
    fn clear_property(&mut self, properties: NodeId, key: &str) -> PersistorResult<bool> {
        let removed_scalar = self.store.remove_attribute(properties, key)?;
        let removed_measurement = match self.store.group(properties, key)? {
            Some(_) => {
                self.store.unlink(properties, key)?;
                true
            }
            None => false,
        };
        Ok(removed_scalar || removed_measurement)
    }

    fn write_keywords(&mut self, node: NodeId, keywords: &BTreeSet<String>) -> PersistorResult<()> {
        if keywords.is_empty() {
            self.store.remove_attribute(node, ATTR_KEYWORDS)?;
            return Ok(());
        }
        let joined = keywords
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&KEYWORD_DELIMITER.to_string());
        self.store
            .set_attribute(node, ATTR_KEYWORDS, &AttributeValue::Text(joined))?;
        Ok(())
    }
}

fn scalar_property(value: AttributeValue) -> PropertyValue {
    match value {
        AttributeValue::Text(text) => PropertyValue::String(text),
        AttributeValue::Integer(number) => PropertyValue::Integer(number),
        AttributeValue::Real(number) => PropertyValue::Float(number),
        AttributeValue::Boolean(flag) => PropertyValue::Boolean(flag),
    }
}

fn validate_keyword(keyword: &str) -> PersistorResult<()> {
    if keyword.is_empty() || keyword.contains(KEYWORD_DELIMITER) {
        return Err(PersistorError::InvalidArgument(format!(
            "keyword `{keyword}` must be non-empty and must not contain `{KEYWORD_DELIMITER}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_keyword;
    use crate::service::error::PersistorError;

    #[test]
    fn keyword_validation_rejects_empty_and_delimiter() {
        validate_keyword("stimulus").unwrap();
        validate_keyword("two words").unwrap();
        for keyword in ["", "a,b", ","] {
            assert!(matches!(
                validate_keyword(keyword),
                Err(PersistorError::InvalidArgument(_))
            ));
        }
    }
}
