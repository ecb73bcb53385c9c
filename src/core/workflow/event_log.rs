//! Append-only causal log of structural mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CreateWorkflow,
    AddTask,
    AddEmptyTask,
    AddElementSet,
    AddElements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub index: usize,
    pub kind: EventKind,
    #[serde(default)]
    pub parents: Vec<usize>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_parameter_groups: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    num_saved: usize,
}

impl EventLog {
    /// Log restored from durable storage; everything in it counts as saved.
    pub fn from_saved(events: Vec<Event>) -> Self {
        let num_saved = events.len();
        EventLog { events, num_saved }
    }

    /// Append an event and return its index. Parents must already be logged.
    pub fn add(
        &mut self,
        kind: EventKind,
        parents: &[usize],
        payload: Value,
        new_parameter_groups: Vec<usize>,
    ) -> usize {
        let index = self.events.len();
        debug_assert!(parents.iter().all(|p| *p < index));
        self.events.push(Event {
            index,
            kind,
            parents: parents.to_vec(),
            timestamp: Utc::now(),
            payload,
            new_parameter_groups,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn unsaved(&self) -> &[Event] {
        &self.events[self.num_saved..]
    }

    pub fn num_saved(&self) -> usize {
        self.num_saved
    }

    pub fn has_unsaved(&self) -> bool {
        self.num_saved < self.events.len()
    }

    pub fn mark_saved(&mut self) {
        self.num_saved = self.events.len();
    }

    pub fn discard_unsaved(&mut self) {
        self.events.truncate(self.num_saved);
    }

    /// Every parameter group created by `index` or any event caused by it.
    pub fn parameter_groups_caused_by(&self, index: usize) -> Vec<usize> {
        let mut causes = vec![index];
        let mut groups = Vec::new();
        for event in self.events.iter().skip(index) {
            if event.index == index || event.parents.iter().any(|p| causes.contains(p)) {
                if event.index != index {
                    causes.push(event.index);
                }
                groups.extend(event.new_parameter_groups.iter().copied());
            }
        }
        groups
    }
}
