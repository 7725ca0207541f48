use std::collections::{BTreeSet, HashMap};

/// Fixed table of legal aggregate state transitions.
///
/// A `None` source state is the aggregate's creation.
#[derive(Clone, Debug, Default)]
pub struct TransitionTable {
    edges: HashMap<String, HashMap<Option<String>, BTreeSet<String>>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Petition and motion lifecycles.
    pub fn constitutional() -> Self {
        let mut table = Self::new();

        table.allow("petition", None, "submitted");
        table.allow("petition", Some("submitted"), "acknowledged");
        table.allow("petition", Some("submitted"), "withdrawn");
        table.allow("petition", Some("acknowledged"), "referred");
        table.allow("petition", Some("acknowledged"), "deliberating");
        table.allow("petition", Some("acknowledged"), "withdrawn");
        table.allow("petition", Some("referred"), "deliberating");
        table.allow("petition", Some("referred"), "withdrawn");
        table.allow("petition", Some("deliberating"), "accepted");
        table.allow("petition", Some("deliberating"), "rejected");

        table.allow("motion", None, "introduced");
        table.allow("motion", Some("introduced"), "seconded");
        table.allow("motion", Some("introduced"), "failed");
        table.allow("motion", Some("seconded"), "voting");
        table.allow("motion", Some("voting"), "passed");
        table.allow("motion", Some("voting"), "failed");

        table
    }

    pub fn allow(&mut self, aggregate_type: &str, from: Option<&str>, to: &str) {
        self.edges
            .entry(aggregate_type.to_owned())
            .or_default()
            .entry(from.map(str::to_owned))
            .or_default()
            .insert(to.to_owned());
    }

    /// Sorted targets reachable from `from`.
    pub fn allowed_from(&self, aggregate_type: &str, from: Option<&str>) -> Vec<String> {
        self.edges
            .get(aggregate_type)
            .and_then(|by_state| by_state.get(&from.map(str::to_owned)))
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_allowed(&self, aggregate_type: &str, from: Option<&str>, to: &str) -> bool {
        self.edges
            .get(aggregate_type)
            .and_then(|by_state| by_state.get(&from.map(str::to_owned)))
            .is_some_and(|targets| targets.contains(to))
    }
}
