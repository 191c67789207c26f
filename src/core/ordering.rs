//! Ordering relations between task names.
//!
//! The index holds five name-keyed relation tables. Every lookup returns
//! an ordered set so graph construction iterates related names in
//! lexicographic order and is reproducible for identical input.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

type Relation = BTreeMap<String, BTreeSet<String>>;

static EMPTY: BTreeSet<String> = BTreeSet::new();

/// The five ordering relations, keyed by task name.
///
/// `reverse_depends_on` is maintained by [`OrderingIndex::add_dependency`]
/// and is never written directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingIndex {
    depends_on: Relation,
    reverse_depends_on: Relation,
    run_before: Relation,
    run_after: Relation,
    always_run_after: Relation,
}

fn insert(relation: &mut Relation, key: &str, value: &str) {
    relation
        .entry(key.to_string())
        .or_default()
        .insert(value.to_string());
}

fn lookup<'a>(relation: &'a Relation, name: &str) -> &'a BTreeSet<String> {
    relation.get(name).unwrap_or(&EMPTY)
}

impl OrderingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `task` depends on `dependency`: the dependency must succeed first.
    pub fn add_dependency(&mut self, task: &str, dependency: &str) -> &mut Self {
        insert(&mut self.depends_on, task, dependency);
        insert(&mut self.reverse_depends_on, dependency, task);
        self
    }

    /// `task` runs before `other` when both are present.
    pub fn add_run_before(&mut self, task: &str, other: &str) -> &mut Self {
        insert(&mut self.run_before, task, other);
        self
    }

    /// `task` runs after `other` when both are present.
    pub fn add_run_after(&mut self, task: &str, other: &str) -> &mut Self {
        insert(&mut self.run_after, task, other);
        self
    }

    /// `follower` runs after `task` even when `task` fails.
    pub fn add_always_run_after(&mut self, task: &str, follower: &str) -> &mut Self {
        insert(&mut self.always_run_after, task, follower);
        self
    }

    /// Names `name` depends on.
    pub fn dependencies_of(&self, name: &str) -> &BTreeSet<String> {
        lookup(&self.depends_on, name)
    }

    /// Names depending on `name`.
    pub fn dependents_of(&self, name: &str) -> &BTreeSet<String> {
        lookup(&self.reverse_depends_on, name)
    }

    /// Names that `name` must run before.
    pub fn must_run_before_of(&self, name: &str) -> &BTreeSet<String> {
        lookup(&self.run_before, name)
    }

    /// Names that must run before `name`.
    pub fn must_run_after_of(&self, name: &str) -> &BTreeSet<String> {
        lookup(&self.run_after, name)
    }

    /// Names that always run after `name`.
    pub fn always_after_of(&self, name: &str) -> &BTreeSet<String> {
        lookup(&self.always_run_after, name)
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
            && self.run_before.is_empty()
            && self.run_after.is_empty()
            && self.always_run_after.is_empty()
    }
}
