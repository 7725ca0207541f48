use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle transition an event type performs on an aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    /// Aggregate kind the event acts on (e.g. `petition`).
    pub aggregate_type: String,
    /// State the aggregate moves to when the event is accepted.
    pub target_state: String,
}

/// Registered event type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeSpec {
    pub name: String,
    pub transition: Option<TransitionSpec>,
    /// Written only by the ledger itself, never by an actor's append.
    #[serde(default)]
    pub reserved: bool,
}

impl EventTypeSpec {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transition: None,
            reserved: false,
        }
    }

    /// A type only the ledger's internal paths may append.
    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            reserved: true,
            ..Self::plain(name)
        }
    }

    pub fn transition(
        name: impl Into<String>,
        aggregate_type: impl Into<String>,
        target_state: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transition: Some(TransitionSpec {
                aggregate_type: aggregate_type.into(),
                target_state: target_state.into(),
            }),
            reserved: false,
        }
    }
}

/// Fixed, in-memory registry of event types accepted by the ledger.
#[derive(Clone, Debug, Default)]
pub struct EventTypeRegistry {
    types: HashMap<String, EventTypeSpec>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the constitutional event vocabulary.
    pub fn constitutional() -> Self {
        let mut registry = Self::new();
        for spec in constitutional_event_types() {
            registry.register(spec);
        }
        registry
    }

    pub fn register(&mut self, spec: EventTypeSpec) {
        self.types.insert(spec.name.clone(), spec);
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.types.contains_key(event_type)
    }

    pub fn get(&self, event_type: &str) -> Option<&EventTypeSpec> {
        self.types.get(event_type)
    }

    pub fn is_reserved(&self, event_type: &str) -> bool {
        self.types.get(event_type).is_some_and(|spec| spec.reserved)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Sorted list of registered names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn constitutional_event_types() -> Vec<EventTypeSpec> {
    vec![
        // System
        EventTypeSpec::plain("ledger.genesis"),
        EventTypeSpec::plain("agent.registered"),
        EventTypeSpec::plain("agent.key_rotated"),
        // Petitions
        EventTypeSpec::transition("petition.submitted", "petition", "submitted"),
        EventTypeSpec::transition("petition.acknowledged", "petition", "acknowledged"),
        EventTypeSpec::transition("petition.referred", "petition", "referred"),
        EventTypeSpec::transition("petition.deliberating", "petition", "deliberating"),
        EventTypeSpec::transition("petition.accepted", "petition", "accepted"),
        EventTypeSpec::transition("petition.rejected", "petition", "rejected"),
        EventTypeSpec::transition("petition.withdrawn", "petition", "withdrawn"),
        // Motions and deliberation
        EventTypeSpec::transition("motion.introduced", "motion", "introduced"),
        EventTypeSpec::transition("motion.seconded", "motion", "seconded"),
        EventTypeSpec::transition("motion.voting_opened", "motion", "voting"),
        EventTypeSpec::transition("motion.passed", "motion", "passed"),
        EventTypeSpec::transition("motion.failed", "motion", "failed"),
        EventTypeSpec::plain("vote.cast"),
        EventTypeSpec::plain("deliberation.started"),
        EventTypeSpec::plain("deliberation.concluded"),
        // Witnessing
        EventTypeSpec::internal("witness.investigation_resolved"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constitutional_registry_contains_core_types() {
        let registry = EventTypeRegistry::constitutional();
        assert!(registry.contains("ledger.genesis"));
        assert!(registry.contains("vote.cast"));
        assert!(!registry.contains("not.a.type"));
    }

    #[test]
    fn transition_types_carry_target_state() {
        let registry = EventTypeRegistry::constitutional();
        let spec = registry.get("petition.accepted").unwrap();
        let transition = spec.transition.as_ref().unwrap();
        assert_eq!(transition.aggregate_type, "petition");
        assert_eq!(transition.target_state, "accepted");
        assert!(registry.get("vote.cast").unwrap().transition.is_none());
    }

    #[test]
    fn ledger_owned_types_are_reserved() {
        let registry = EventTypeRegistry::constitutional();
        assert!(registry.is_reserved("witness.investigation_resolved"));
        assert!(!registry.is_reserved("vote.cast"));
        assert!(!registry.is_reserved("not.a.type"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = EventTypeRegistry::new();
        registry.register(EventTypeSpec::plain("b.second"));
        registry.register(EventTypeSpec::plain("a.first"));
        assert_eq!(registry.names(), vec!["a.first", "b.second"]);
        assert_eq!(registry.len(), 2);
    }
}
