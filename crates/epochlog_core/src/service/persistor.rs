//! Experiment and epoch-group lifecycle persistor.
//!
//! # Responsibility
//! - Own the container's root groups and the open-entity state.
//! - Materialize sources, experiments and epoch groups as they are begun.
//! - Enforce deletion rules that span more than one entity.
//!
//! # Invariants
//! - At most one experiment is open at a time.
//! - `end_epoch_group` always closes the innermost open group (LIFO).
//! - Every epoch group is linked from its containment parent and from its
//!   source's `epochGroups` index; both links are added on begin and removed
//!   on delete, index first.
//! - Single writer: mutations take `&mut self`. The persistor is `Send` so a
//!   host may move it between threads or guard it with a `Mutex`, but it does
//!   no locking of its own.
//!
//! # Partial failure
//! Each store primitive is atomic; multi-step operations are not.
//! - `add_source`/`begin_experiment`/`begin_epoch_group`: the entity group is
//!   created first, attributes and links follow. A failure may leave a group
//!   without some attributes; for epoch groups it may leave the group
//!   contained but absent from its source index. The open-group stack is only
//!   pushed after every step succeeded.
//! - `delete`: index links are removed before the containment link. A
//!   failure may leave a group contained but already unindexed; retrying the
//!   delete completes it.

use crate::model::entity::{
    Entity, EntityId, EntityKind, EntityRef, EpochGroup, Experiment, Source,
};
use crate::model::note::NOTE_RECORD_SIZE;
use crate::model::time::{is_tick_exact, to_utc_ticks, utc_offset_hours, Timestamp};
use crate::service::error::{PersistorError, PersistorResult};
use crate::service::ids::{IdGenerator, RandomIdGenerator};
use crate::service::layout::{
    TimeBound, ATTR_KIND, ATTR_LABEL, ATTR_PURPOSE, ATTR_UUID, ATTR_VERSION, EPOCH_GROUPS,
    EXPERIMENTS, FILE_FORMAT_VERSION, NOTES, PROPERTIES, SOURCES, SOURCE_LINK,
};
use crate::service::options::{OpenGroupPolicy, PersistorOptions};
use crate::store::{AttributeValue, HierarchicalStore, NodeId, SqliteStore, StoreError};
use log::{debug, error, info, warn};
use std::path::Path;

/// Stateful facade over one container.
pub struct EpochPersistor<S: HierarchicalStore = SqliteStore> {
    pub(super) store: S,
    sources_root: NodeId,
    experiments_root: NodeId,
    current_experiment: Option<Experiment>,
    open_epoch_groups: Vec<EpochGroup>,
    ids: Box<dyn IdGenerator>,
    options: PersistorOptions,
}

impl EpochPersistor<SqliteStore> {
    /// Opens or creates a container file.
    pub fn open(path: impl AsRef<Path>, options: PersistorOptions) -> PersistorResult<Self> {
        let store = SqliteStore::open(path, options.busy_timeout())?;
        Self::attach(store, options)
    }

    /// Opens a throwaway in-memory container.
    pub fn open_in_memory(options: PersistorOptions) -> PersistorResult<Self> {
        let store = SqliteStore::open_in_memory()?;
        Self::attach(store, options)
    }
}

impl<S: HierarchicalStore> EpochPersistor<S> {
    /// Takes ownership of `store`, creating the root layout on a fresh
    /// container and recovering open entities on an existing one.
    ///
    /// On failure the store is closed before the error is returned.
    pub fn attach(mut store: S, options: PersistorOptions) -> PersistorResult<Self> {
        let (sources_root, experiments_root) = match initialize_roots(&mut store) {
            Ok(roots) => roots,
            Err(err) => return Err(release_after_failure(store, err)),
        };

        let mut persistor = Self {
            store,
            sources_root,
            experiments_root,
            current_experiment: None,
            open_epoch_groups: Vec::new(),
            ids: Box::new(RandomIdGenerator),
            options,
        };
        if let Err(err) = persistor.restore_open_state() {
            return Err(release_after_failure(persistor.store, err));
        }

        info!(
            "event=persistor_attach module=persistor status=ok open_experiment={} open_groups={}",
            persistor.current_experiment.is_some(),
            persistor.open_epoch_groups.len()
        );
        Ok(persistor)
    }

    /// Replaces the identifier generator used for new entities.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn options(&self) -> &PersistorOptions {
        &self.options
    }

    /// Borrows the underlying store for diagnostics.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Releases the store. Open entities stay open in the container and are
    /// recovered by the next attach when `recover_open_state` is set.
    pub fn close(self) -> PersistorResult<()> {
        if let Some(experiment) = self.current_experiment {
            warn!(
                "event=persistor_close module=persistor status=warn open_experiment={} open_groups={}",
                experiment.id(),
                self.open_epoch_groups.len()
            );
        }
        self.store.close()?;
        info!("event=persistor_close module=persistor status=ok");
        Ok(())
    }

    pub fn current_experiment(&self) -> Option<Experiment> {
        self.current_experiment
    }

    /// Innermost open epoch group.
    pub fn current_epoch_group(&self) -> Option<EpochGroup> {
        self.open_epoch_groups.last().copied()
    }

    /// Open epoch groups, outermost first.
    pub fn open_epoch_groups(&self) -> &[EpochGroup] {
        &self.open_epoch_groups
    }

    /// Root-level sources, read from the container on every call.
    pub fn sources(&self) -> PersistorResult<Vec<Source>> {
        self.store
            .children(self.sources_root)?
            .into_iter()
            .map(|(_, node)| self.load_source(node))
            .collect()
    }

    /// All experiments, read from the container on every call.
    pub fn experiments(&self) -> PersistorResult<Vec<Experiment>> {
        self.store
            .children(self.experiments_root)?
            .into_iter()
            .map(|(_, node)| self.load_experiment(node))
            .collect()
    }

    /// Creates a source under `parent`, or at the root when `parent` is `None`.
    pub fn add_source(&mut self, label: &str, parent: Option<&Source>) -> PersistorResult<Source> {
        let container = match parent {
            Some(parent) => self.container(self.live(parent)?, SOURCES)?,
            None => self.sources_root,
        };

        let id = self.next_id()?;
        let node = self.create_entity_node(container, EntityKind::Source, id)?;
        self.store.set_attribute(node, ATTR_LABEL, &text_value(label))?;
        self.store.create_group(node, SOURCES)?;
        self.store.create_group(node, EPOCH_GROUPS)?;

        info!(
            "event=source_add module=persistor status=ok id={} parent={}",
            id,
            parent.map_or_else(|| "root".to_string(), |parent| parent.id().to_string())
        );
        Ok(Source::new(id, node))
    }

    /// Creates and opens a new experiment.
    ///
    /// # Errors
    /// - `InvalidState` when an experiment is already open, when epoch groups
    ///   of an earlier experiment are still open, or when the container holds
    ///   an unterminated experiment that was not recovered on attach.
    /// - `InvalidArgument` when `start_time` cannot be stored exactly.
    pub fn begin_experiment(
        &mut self,
        purpose: &str,
        start_time: Timestamp,
    ) -> PersistorResult<Experiment> {
        if let Some(current) = self.current_experiment {
            return Err(PersistorError::InvalidState(format!(
                "experiment {} is already open",
                current.id()
            )));
        }
        if !self.open_epoch_groups.is_empty() {
            return Err(PersistorError::InvalidState(format!(
                "{} epoch group(s) of a previous experiment are still open",
                self.open_epoch_groups.len()
            )));
        }
        for experiment in self.experiments()? {
            if self.end_time(&experiment)?.is_none() {
                return Err(PersistorError::InvalidState(format!(
                    "experiment {} is unterminated",
                    experiment.id()
                )));
            }
        }
        encode_time(&start_time)?;

        let id = self.next_id()?;
        let node = self.create_entity_node(self.experiments_root, EntityKind::Experiment, id)?;
        self.store
            .set_attribute(node, ATTR_PURPOSE, &text_value(purpose))?;
        self.write_time(node, TimeBound::Start, &start_time)?;
        self.store.create_group(node, EPOCH_GROUPS)?;

        let experiment = Experiment::new(id, node);
        self.current_experiment = Some(experiment);
        info!(
            "event=experiment_begin module=persistor status=ok id={} start={}",
            id,
            start_time.to_rfc3339()
        );
        Ok(experiment)
    }

    /// Closes the open experiment.
    ///
    /// Open epoch groups are handled according to
    /// `PersistorOptions::open_group_policy`.
    ///
    /// # Errors
    /// - `InvalidState` when no experiment is open, or when groups are open
    ///   under `OpenGroupPolicy::Reject`.
    /// - `InvalidArgument` when `end_time` precedes the start time of the
    ///   experiment or, under `OpenGroupPolicy::CloseOpenGroups`, of any open
    ///   group. Nothing is closed in that case.
    pub fn end_experiment(&mut self, end_time: Timestamp) -> PersistorResult<Experiment> {
        let experiment = self
            .current_experiment
            .ok_or_else(|| PersistorError::InvalidState("no experiment is open".to_string()))?;
        self.ensure_not_before_start(experiment.node(), &end_time)?;

        if !self.open_epoch_groups.is_empty() {
            match self.options.open_group_policy {
                OpenGroupPolicy::Reject => {
                    return Err(PersistorError::InvalidState(format!(
                        "{} epoch group(s) are still open",
                        self.open_epoch_groups.len()
                    )));
                }
                OpenGroupPolicy::CloseOpenGroups => {
                    for group in &self.open_epoch_groups {
                        self.ensure_not_before_start(group.node(), &end_time)?;
                    }
                    while !self.open_epoch_groups.is_empty() {
                        self.end_epoch_group(end_time)?;
                    }
                }
                OpenGroupPolicy::Allow => {
                    warn!(
                        "event=experiment_end module=persistor status=warn id={} open_groups={}",
                        experiment.id(),
                        self.open_epoch_groups.len()
                    );
                }
            }
        }

        self.write_time(experiment.node(), TimeBound::End, &end_time)?;
        self.current_experiment = None;
        info!(
            "event=experiment_end module=persistor status=ok id={} end={}",
            experiment.id(),
            end_time.to_rfc3339()
        );
        Ok(experiment)
    }

    /// Opens a new epoch group recorded from `source`.
    ///
    /// The group is nested in the current epoch group, or placed at the top
    /// level of the open experiment when no group is open.
    ///
    /// # Errors
    /// - `InvalidState` when no experiment is open.
    /// - `NotFound` when `source` was deleted.
    /// - `InvalidArgument` when `start_time` cannot be stored exactly.
    pub fn begin_epoch_group(
        &mut self,
        label: &str,
        source: &Source,
        start_time: Timestamp,
    ) -> PersistorResult<EpochGroup> {
        let experiment = self.current_experiment.ok_or_else(|| {
            PersistorError::InvalidState("no experiment is open".to_string())
        })?;
        let parent_node = self
            .open_epoch_groups
            .last()
            .map_or(experiment.node(), |group| group.node());
        let container = self.container(parent_node, EPOCH_GROUPS)?;
        let source_index = self.container(self.live(source)?, EPOCH_GROUPS)?;
        encode_time(&start_time)?;

        let id = self.next_id()?;
        let name = id.to_string();
        let node = self.create_entity_node(container, EntityKind::EpochGroup, id)?;
        self.store.set_attribute(node, ATTR_LABEL, &text_value(label))?;
        self.write_time(node, TimeBound::Start, &start_time)?;
        self.store.create_group(node, EPOCH_GROUPS)?;
        self.store.link(node, SOURCE_LINK, source.node())?;
        self.store.link(source_index, &name, node)?;

        let group = EpochGroup::new(id, node);
        self.open_epoch_groups.push(group);
        info!(
            "event=epoch_group_begin module=persistor status=ok id={} source={} depth={}",
            id,
            source.id(),
            self.open_epoch_groups.len()
        );
        Ok(group)
    }

    /// Closes the innermost open epoch group.
    ///
    /// # Errors
    /// - `InvalidState` when no epoch group is open.
    /// - `InvalidArgument` when `end_time` precedes the group's start time.
    pub fn end_epoch_group(&mut self, end_time: Timestamp) -> PersistorResult<EpochGroup> {
        let group = self
            .open_epoch_groups
            .last()
            .copied()
            .ok_or_else(|| PersistorError::InvalidState("no epoch group is open".to_string()))?;
        self.ensure_not_before_start(group.node(), &end_time)?;
        self.write_time(group.node(), TimeBound::End, &end_time)?;
        self.open_epoch_groups.pop();

        info!(
            "event=epoch_group_end module=persistor status=ok id={} end={} depth={}",
            group.id(),
            end_time.to_rfc3339(),
            self.open_epoch_groups.len()
        );
        Ok(group)
    }

    /// Deletes an entity and everything it contains.
    ///
    /// # Errors
    /// - `IntegrityViolation` when an epoch group being deleted is open, when
    ///   the open experiment is targeted, or when a source being deleted (or
    ///   one of its descendants) still indexes epoch groups.
    /// - `NotFound` when the entity no longer exists.
    pub fn delete(&mut self, entity: impl Into<EntityRef>) -> PersistorResult<()> {
        let entity = entity.into();
        let container = match self.locate(entity.id())? {
            Some((found, container)) if found == entity => container,
            _ => {
                return Err(PersistorError::NotFound(format!(
                    "{} {}",
                    entity.kind(),
                    entity.id()
                )))
            }
        };

        let result = match entity {
            EntityRef::Source(source) => self.delete_source(source, container),
            EntityRef::Experiment(experiment) => self.delete_experiment(experiment, container),
            EntityRef::EpochGroup(group) => self.delete_epoch_group(group, container),
        };
        match &result {
            Ok(()) => info!(
                "event=entity_delete module=persistor status=ok kind={} id={}",
                entity.kind(),
                entity.id()
            ),
            Err(err) => warn!(
                "event=entity_delete module=persistor status=error kind={} id={} error={}",
                entity.kind(),
                entity.id(),
                err
            ),
        }
        result
    }

    /// Resolves an identifier by walking the source tree and the experiment
    /// tree.
    ///
    /// # Errors
    /// - `NotFound` when no entity has this identifier.
    pub fn find_entity(&self, id: EntityId) -> PersistorResult<EntityRef> {
        self.locate(id)?
            .map(|(entity, _)| entity)
            .ok_or_else(|| PersistorError::NotFound(format!("entity {id}")))
    }

    fn delete_source(&mut self, source: Source, container: NodeId) -> PersistorResult<()> {
        for member in self.source_subtree(source)? {
            let index = self.container(member.node(), EPOCH_GROUPS)?;
            let indexed = self.store.children(index)?.len();
            if indexed > 0 {
                return Err(PersistorError::IntegrityViolation(format!(
                    "source {} still indexes {indexed} epoch group(s)",
                    member.id()
                )));
            }
        }
        self.store.unlink(container, &source.id().to_string())?;
        Ok(())
    }

    fn delete_experiment(
        &mut self,
        experiment: Experiment,
        container: NodeId,
    ) -> PersistorResult<()> {
        if self.current_experiment == Some(experiment) {
            return Err(PersistorError::IntegrityViolation(format!(
                "experiment {} is open",
                experiment.id()
            )));
        }
        let top_level = self.container(experiment.node(), EPOCH_GROUPS)?;
        let groups = self.epoch_group_subtree(top_level)?;
        self.ensure_none_open(&groups)?;

        for group in &groups {
            self.unlink_from_source_index(group)?;
        }
        self.store.unlink(container, &experiment.id().to_string())?;
        Ok(())
    }

    fn delete_epoch_group(&mut self, group: EpochGroup, container: NodeId) -> PersistorResult<()> {
        let children = self.container(group.node(), EPOCH_GROUPS)?;
        let mut groups = vec![group];
        groups.extend(self.epoch_group_subtree(children)?);
        self.ensure_none_open(&groups)?;

        for member in &groups {
            self.unlink_from_source_index(member)?;
        }
        self.store.unlink(container, &group.id().to_string())?;
        Ok(())
    }

    fn ensure_none_open(&self, groups: &[EpochGroup]) -> PersistorResult<()> {
        match groups
            .iter()
            .find(|group| self.open_epoch_groups.contains(group))
        {
            Some(open) => Err(PersistorError::IntegrityViolation(format!(
                "epoch group {} is open",
                open.id()
            ))),
            None => Ok(()),
        }
    }

    fn unlink_from_source_index(&mut self, group: &EpochGroup) -> PersistorResult<()> {
        let source_node = self
            .store
            .group(group.node(), SOURCE_LINK)?
            .ok_or_else(|| invalid_data(format!("epoch group {} has no source", group.id())))?;
        let index = self.container(source_node, EPOCH_GROUPS)?;
        let name = group.id().to_string();

        if self.store.group(index, &name)?.is_none() {
            debug!(
                "event=source_index_unlink module=persistor status=skip id={} reason=already_unlinked",
                group.id()
            );
            return Ok(());
        }
        self.store.unlink(index, &name)?;
        Ok(())
    }

    /// Preorder list of epoch groups below `container`.
    fn epoch_group_subtree(&self, container: NodeId) -> PersistorResult<Vec<EpochGroup>> {
        let mut groups = Vec::new();
        let mut pending = vec![container];
        while let Some(container) = pending.pop() {
            for (_, node) in self.store.children(container)? {
                groups.push(self.load_epoch_group(node)?);
                pending.push(self.container(node, EPOCH_GROUPS)?);
            }
        }
        Ok(groups)
    }

    /// `source` followed by all of its descendants.
    fn source_subtree(&self, source: Source) -> PersistorResult<Vec<Source>> {
        let mut sources = Vec::new();
        let mut pending = vec![source];
        while let Some(current) = pending.pop() {
            pending.extend(self.child_sources(&current)?);
            sources.push(current);
        }
        Ok(sources)
    }

    /// Finds an entity together with the container that holds its
    /// containment link.
    fn locate(&self, id: EntityId) -> PersistorResult<Option<(EntityRef, NodeId)>> {
        let name = id.to_string();
        let mut pending = vec![self.sources_root, self.experiments_root];

        while let Some(container) = pending.pop() {
            if let Some(node) = self.store.group(container, &name)? {
                return Ok(Some((self.load_entity(node)?, container)));
            }
            for (_, node) in self.store.children(container)? {
                let nested = match self.load_entity(node)?.kind() {
                    EntityKind::Source => SOURCES,
                    EntityKind::Experiment | EntityKind::EpochGroup => EPOCH_GROUPS,
                };
                pending.push(self.container(node, nested)?);
            }
        }
        Ok(None)
    }

    /// Rebuilds the open experiment and the open-group stack from entities
    /// that have no end time.
    fn restore_open_state(&mut self) -> PersistorResult<()> {
        let mut open_experiments = Vec::new();
        for experiment in self.experiments()? {
            if self.end_time(&experiment)?.is_none() {
                open_experiments.push(experiment);
            }
        }
        if !self.options.recover_open_state {
            if !open_experiments.is_empty() {
                warn!(
                    "event=state_recovery module=persistor status=skip open_experiments={} reason=disabled",
                    open_experiments.len()
                );
            }
            return Ok(());
        }
        let experiment = match open_experiments.as_slice() {
            [] => return Ok(()),
            [experiment] => *experiment,
            many => {
                return Err(invalid_data(format!(
                    "container holds {} unterminated experiments",
                    many.len()
                )))
            }
        };

        let mut stack = Vec::new();
        let mut candidates = self.experiment_epoch_groups(&experiment)?;
        loop {
            let mut open = Vec::new();
            for group in candidates {
                if self.end_time(&group)?.is_none() {
                    open.push(group);
                }
            }
            match open.as_slice() {
                [] => break,
                [group] => {
                    stack.push(*group);
                    candidates = self.child_epoch_groups(group)?;
                }
                many => {
                    return Err(invalid_data(format!(
                        "{} sibling epoch groups are unterminated",
                        many.len()
                    )))
                }
            }
        }

        info!(
            "event=state_recovery module=persistor status=ok open_experiment={} open_groups={}",
            experiment.id(),
            stack.len()
        );
        self.current_experiment = Some(experiment);
        self.open_epoch_groups = stack;
        Ok(())
    }

    fn next_id(&mut self) -> PersistorResult<EntityId> {
        self.ids.next_id().ok_or_else(|| {
            PersistorError::InvalidState("identifier generator is exhausted".to_string())
        })
    }

    fn create_entity_node(
        &mut self,
        container: NodeId,
        kind: EntityKind,
        id: EntityId,
    ) -> PersistorResult<NodeId> {
        let node = self.store.create_group(container, &id.to_string())?;
        self.store
            .set_attribute(node, ATTR_KIND, &text_value(kind.as_str()))?;
        self.store
            .set_attribute(node, ATTR_UUID, &text_value(&id.to_string()))?;
        self.store.create_group(node, PROPERTIES)?;
        self.store.create_dataset(node, NOTES, NOTE_RECORD_SIZE)?;
        Ok(node)
    }

    fn write_time(
        &mut self,
        node: NodeId,
        bound: TimeBound,
        timestamp: &Timestamp,
    ) -> PersistorResult<()> {
        let (ticks, offset_hours) = encode_time(timestamp)?;
        // The ticks attribute marks the bound as set, so it is written last.
        self.store
            .set_attribute(node, bound.offset_attr(), &AttributeValue::Real(offset_hours))?;
        self.store
            .set_attribute(node, bound.ticks_attr(), &AttributeValue::Integer(ticks))?;
        Ok(())
    }

    fn ensure_not_before_start(&self, node: NodeId, end_time: &Timestamp) -> PersistorResult<()> {
        let start_time = self
            .read_time(node, TimeBound::Start)?
            .ok_or_else(|| invalid_data(format!("{node} has no start time")))?;
        if *end_time < start_time {
            return Err(PersistorError::InvalidArgument(format!(
                "end time {} precedes start time {}",
                end_time.to_rfc3339(),
                start_time.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Returns the entity's node, or `NotFound` once the entity was deleted.
    pub(super) fn live(&self, entity: &impl Entity) -> PersistorResult<NodeId> {
        if self.store.contains(entity.node())? {
            Ok(entity.node())
        } else {
            Err(PersistorError::NotFound(format!(
                "{} {}",
                entity.kind(),
                entity.id()
            )))
        }
    }

    pub(super) fn container(&self, node: NodeId, name: &str) -> PersistorResult<NodeId> {
        self.store
            .group(node, name)?
            .ok_or_else(|| invalid_data(format!("{node} has no `{name}` container")))
    }
}

pub(super) fn text_value(value: &str) -> AttributeValue {
    AttributeValue::Text(value.to_string())
}

/// Splits a timestamp into its stored (ticks, offset hours) pair.
fn encode_time(timestamp: &Timestamp) -> PersistorResult<(i64, f64)> {
    let ticks = to_utc_ticks(timestamp).ok_or_else(|| {
        PersistorError::InvalidArgument(format!("timestamp {timestamp} is out of range"))
    })?;
    if !is_tick_exact(timestamp) {
        return Err(PersistorError::InvalidArgument(format!(
            "timestamp {} is finer than 100 ns",
            timestamp.to_rfc3339()
        )));
    }
    Ok((ticks, utc_offset_hours(timestamp)))
}

pub(super) fn invalid_data(message: impl Into<String>) -> PersistorError {
    PersistorError::Persistence(StoreError::InvalidData(message.into()))
}

fn initialize_roots<S: HierarchicalStore>(store: &mut S) -> PersistorResult<(NodeId, NodeId)> {
    let root = store.root();
    match store.attribute(root, ATTR_VERSION)? {
        Some(AttributeValue::Integer(version)) => {
            if version > FILE_FORMAT_VERSION {
                return Err(PersistorError::UnsupportedFormatVersion {
                    file_version: version,
                    latest_supported: FILE_FORMAT_VERSION,
                });
            }
            let sources = store
                .group(root, SOURCES)?
                .ok_or_else(|| invalid_data("container has no `sources` root"))?;
            let experiments = store
                .group(root, EXPERIMENTS)?
                .ok_or_else(|| invalid_data("container has no `experiments` root"))?;
            Ok((sources, experiments))
        }
        Some(other) => Err(invalid_data(format!(
            "container version attribute holds {other:?}"
        ))),
        None => {
            // A container without a version has not finished initializing.
            let sources = ensure_group(store, root, SOURCES)?;
            let experiments = ensure_group(store, root, EXPERIMENTS)?;
            store.set_attribute(
                root,
                ATTR_VERSION,
                &AttributeValue::Integer(FILE_FORMAT_VERSION),
            )?;
            info!(
                "event=container_init module=persistor status=ok version={}",
                FILE_FORMAT_VERSION
            );
            Ok((sources, experiments))
        }
    }
}

fn ensure_group<S: HierarchicalStore>(
    store: &mut S,
    parent: NodeId,
    name: &str,
) -> PersistorResult<NodeId> {
    match store.group(parent, name)? {
        Some(node) => Ok(node),
        None => Ok(store.create_group(parent, name)?),
    }
}

fn release_after_failure<S: HierarchicalStore>(store: S, err: PersistorError) -> PersistorError {
    if let Err(close_err) = store.close() {
        warn!(
            "event=persistor_attach module=persistor status=error error_code=store_close_failed error={}",
            close_err
        );
    }
    error!(
        "event=persistor_attach module=persistor status=error error={}",
        err
    );
    err
}

#[cfg(test)]
mod tests {
    use super::EpochPersistor;
    use crate::service::options::PersistorOptions;

    fn assert_send<T: Send>() {}

    #[test]
    fn persistor_can_move_between_threads() {
        assert_send::<EpochPersistor>();
    }

    #[test]
    fn fresh_container_starts_without_open_state() {
        let persistor = EpochPersistor::open_in_memory(PersistorOptions::default()).unwrap();
        assert!(persistor.current_experiment().is_none());
        assert!(persistor.current_epoch_group().is_none());
        assert!(persistor.sources().unwrap().is_empty());
        assert!(persistor.experiments().unwrap().is_empty());
    }
}
