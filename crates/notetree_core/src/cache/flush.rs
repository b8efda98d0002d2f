//! Unit-of-work flush pipeline.
//!
//! # Responsibility
//! - Expand a dirty working set to its transitive dirty dependencies.
//! - Validate every candidate before the first remote write.
//! - Replay pending changes in dependency order, creating new branch
//!   placements before removing old ones.
//! - Signal child-order refreshes for parents whose branch positions moved.
//!
//! # Invariants
//! - Validation failures abort the whole flush with zero remote writes.
//! - No entity is written before every dirty entity it depends on.
//! - Flush is not atomic across entities: a failed write leaves earlier
//!   writes applied and later entities dirty.

use crate::cache::{Cache, CacheError, CacheResult, ValidationFailure};
use crate::model::{Entity, EntityId, EntityKind, EntityRef, State};
use crate::store::RemoteStore;
use log::{debug, info};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Narrow per-flush capability handed to entity write operations.
pub(crate) struct FlushContext<'a> {
    store: &'a mut dyn RemoteStore,
}

impl<'a> FlushContext<'a> {
    fn new(store: &'a mut dyn RemoteStore) -> Self {
        Self { store }
    }

    pub(crate) fn store(&mut self) -> &mut dyn RemoteStore {
        &mut *self.store
    }
}

/// Create/update/delete tally for one entity category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StateCounts {
    created: usize,
    updated: usize,
    deleted: usize,
}

impl StateCounts {
    fn record(&mut self, state: State) {
        match state {
            State::Create => self.created += 1,
            State::Update => self.updated += 1,
            State::Delete => self.deleted += 1,
            State::Clean => {}
        }
    }
}

impl Display for StateCounts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.created, self.updated, self.deleted)
    }
}

/// Per-category breakdown logged before execution starts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FlushSummary {
    notes: StateCounts,
    attributes: StateCounts,
    branches: StateCounts,
}

impl FlushSummary {
    fn tally(entities: &[EntityRef]) -> Self {
        let mut summary = Self::default();
        for entity in entities {
            let entity = entity.borrow();
            match entity.kind() {
                EntityKind::Note => summary.notes.record(entity.state()),
                EntityKind::Attribute => summary.attributes.record(entity.state()),
                EntityKind::Branch => summary.branches.record(entity.state()),
            }
        }
        summary
    }
}

impl Display for FlushSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} notes, {} attributes, {} branches",
            self.notes, self.attributes, self.branches
        )
    }
}

impl Cache {
    /// Flushes every entity in the current dirty set.
    pub fn flush_all(&mut self, store: &mut dyn RemoteStore) -> CacheResult<()> {
        let targets = self.dirty_entities();
        self.flush_entities(&targets, store)
    }

    /// Flushes `targets` plus every dirty entity they transitively depend
    /// on.
    ///
    /// Clean targets are ignored; flushing nothing is a no-op. Validation
    /// runs over the whole expanded set before the first write, so a failed
    /// flush with a validation error has touched nothing remotely.
    pub fn flush_entities(
        &mut self,
        targets: &[EntityRef],
        store: &mut dyn RemoteStore,
    ) -> CacheResult<()> {
        let mut seen = BTreeSet::new();
        let mut working = Vec::new();
        for entity in targets {
            let (id, dirty) = {
                let entity = entity.borrow();
                (entity.id(), entity.is_dirty())
            };
            if dirty && seen.insert(id) {
                working.push(entity.clone());
            }
        }
        if working.is_empty() {
            debug!("event=flush module=cache status=noop");
            return Ok(());
        }

        let failures = collect_check_failures(&working);
        if !failures.is_empty() {
            return Err(CacheError::Validation(failures));
        }

        // Dependency closure: walk dirty dependencies to a fixed point.
        let mut expanded = working.clone();
        let mut queue = working.clone();
        while let Some(entity) = queue.pop() {
            let dependencies = entity.borrow().dependencies();
            for dependency in dependencies {
                let (id, dirty) = {
                    let dependency = dependency.borrow();
                    (dependency.id(), dependency.is_dirty())
                };
                if dirty && seen.insert(id) {
                    expanded.push(dependency.clone());
                    queue.push(dependency);
                }
            }
        }

        // Entities pulled in by the closure have not been checked yet.
        let failures = collect_check_failures(&expanded[working.len()..]);
        if !failures.is_empty() {
            return Err(CacheError::Validation(failures));
        }

        let summary = FlushSummary::tally(&expanded);
        info!(
            "event=flush module=cache status=start total={} summary={}",
            expanded.len(),
            summary
        );

        // Position changes must be read before writes reset the baselines.
        let refresh_notes = collect_refresh_notes(&expanded);

        let graph = build_dependency_graph(&expanded);
        let order = toposort(&graph, None)
            .map_err(|cycle| CacheError::DependencyCycle(cycle.node_id()))?;

        let by_id: BTreeMap<EntityId, EntityRef> = expanded
            .iter()
            .map(|entity| (entity.borrow().id(), entity.clone()))
            .collect();

        let mut ctx = FlushContext::new(&mut *store);
        let mut written = 0usize;
        for id in order {
            let Some(entity) = by_id.get(&id) else {
                continue;
            };
            let mut entity = entity.borrow_mut();
            // An earlier write may have made this entity clean already.
            if entity.is_dirty() {
                entity.flush_write(&mut ctx)?;
                written += 1;
            }
        }

        for note_id in &refresh_notes {
            store.refresh_note_ordering(*note_id)?;
        }

        info!(
            "event=flush module=cache status=ok written={} refreshed={}",
            written,
            refresh_notes.len()
        );
        Ok(())
    }
}

fn collect_check_failures(entities: &[EntityRef]) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    for entity in entities {
        let entity = entity.borrow();
        if let Err(message) = entity.flush_check() {
            failures.push(ValidationFailure {
                entity: entity.to_string(),
                message,
            });
        }
    }
    failures
}

/// Parents whose child ordering must be re-announced after the flush.
fn collect_refresh_notes(entities: &[EntityRef]) -> BTreeSet<EntityId> {
    let mut refresh_notes = BTreeSet::new();
    for entity in entities {
        if let Entity::Branch(branch) = &*entity.borrow() {
            if branch.position_changed() {
                refresh_notes.insert(branch.parent_note_id());
            }
        }
    }
    refresh_notes
}

/// Builds the partial order over the expanded dirty set.
///
/// An edge `a -> b` means `a` must be written before `b`. Besides the
/// per-entity dependency edges, every branch deletion is ordered after every
/// branch creation so a moved note is never transiently orphaned.
fn build_dependency_graph(entities: &[EntityRef]) -> DiGraphMap<EntityId, ()> {
    let mut graph = DiGraphMap::new();
    let mut created_branches = Vec::new();
    let mut deleted_branches = Vec::new();

    for entity in entities {
        let entity = entity.borrow();
        let id = entity.id();
        graph.add_node(id);
        if entity.kind() == EntityKind::Branch {
            match entity.state() {
                State::Create => created_branches.push(id),
                State::Delete => deleted_branches.push(id),
                State::Update | State::Clean => {}
            }
        }
    }

    for entity in entities {
        let (id, dependencies) = {
            let entity = entity.borrow();
            (entity.id(), entity.dependencies())
        };
        for dependency in dependencies {
            let dependency = dependency.borrow();
            if dependency.is_dirty() && graph.contains_node(dependency.id()) {
                graph.add_edge(dependency.id(), id, ());
            }
        }
    }

    for deleted in &deleted_branches {
        for created in &created_branches {
            graph.add_edge(*created, *deleted, ());
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::{build_dependency_graph, FlushSummary};
    use crate::model::{BranchHandle, NoteHandle};
    use petgraph::algo::toposort;
    use uuid::Uuid;

    fn clean_note(title: &str) -> NoteHandle {
        NoteHandle::with_id(Uuid::new_v4(), title, "")
    }

    #[test]
    fn summary_reports_counts_per_category_and_state() {
        let parent = clean_note("Parent");
        let child = clean_note("Child");
        let created = NoteHandle::new("New", "");
        let updated = clean_note("Edited");
        updated.set_title("Edited twice");
        let branch = BranchHandle::new(&parent, &child, 0);

        let entities = vec![
            created.entity().clone(),
            updated.entity().clone(),
            branch.entity().clone(),
        ];
        let summary = FlushSummary::tally(&entities);
        assert_eq!(
            summary.to_string(),
            "1/1/0 notes, 0/0/0 attributes, 1/0/0 branches"
        );
    }

    #[test]
    fn deleted_branches_are_ordered_after_created_branches() {
        let parent = clean_note("Parent");
        let child = clean_note("Child");
        let old_parent = clean_note("Old parent");

        let replacement = BranchHandle::new(&parent, &child, 0);
        let obsolete = BranchHandle::with_id(Uuid::new_v4(), &old_parent, &child, 0);
        obsolete.delete();

        let entities = vec![replacement.entity().clone(), obsolete.entity().clone()];
        let graph = build_dependency_graph(&entities);
        let order = toposort(&graph, None).expect("graph should stay acyclic");

        let created_at = order
            .iter()
            .position(|id| *id == replacement.id())
            .expect("created branch should be ordered");
        let deleted_at = order
            .iter()
            .position(|id| *id == obsolete.id())
            .expect("deleted branch should be ordered");
        assert!(created_at < deleted_at);
    }
}
