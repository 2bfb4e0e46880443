//! Proposed changes and confidence-based conflict resolution.
//!
//! Nodes never write to the payload directly. They propose changes, each with
//! a self-assessed confidence, and the [`ChangeSet`] decides the winner per
//! attribute when the run commits: highest confidence wins, and on a tie the
//! later proposal wins.

use std::collections::HashMap;

pub use datapipe_shared::ProposedChange;

/// Pending changes of one run, in proposal order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<ProposedChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: ProposedChange) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProposedChange> {
        self.changes.iter()
    }

    /// Changes proposed for one attribute, in proposal order.
    pub fn for_attribute<'s>(
        &'s self,
        attribute: &str,
    ) -> impl Iterator<Item = &'s ProposedChange> {
        self.changes
            .iter()
            .filter(move |change| change.attribute() == attribute)
    }

    /// Whether any change targets the attribute.
    pub fn touches(&self, attribute: &str) -> bool {
        self.for_attribute(attribute).next().is_some()
    }

    /// The change that would win for one attribute.
    pub fn most_trusted(&self, attribute: &str) -> Option<&ProposedChange> {
        self.for_attribute(attribute)
            .fold(None, |best: Option<&ProposedChange>, change| match best {
                Some(best) if best.confidence() > change.confidence() => Some(best),
                _ => Some(change),
            })
    }

    /// Reduce to exactly one winner per attribute.
    ///
    /// Winners are ordered by the first proposal made for their attribute.
    pub fn resolve(&self) -> Vec<ProposedChange> {
        let mut winners: Vec<&ProposedChange> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();

        for change in &self.changes {
            match slots.get(change.attribute()) {
                Some(&slot) if winners[slot].confidence() > change.confidence() => {}
                Some(&slot) => winners[slot] = change,
                None => {
                    slots.insert(change.attribute(), winners.len());
                    winners.push(change);
                }
            }
        }

        winners.into_iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ProposedChange;
    type IntoIter = std::slice::Iter<'a, ProposedChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl FromIterator<ProposedChange> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ProposedChange>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datapipe_shared::{NodeId, Value};
    use serde_json::json;

    fn change(node: &str, attribute: &str, value: Value, confidence: i64) -> ProposedChange {
        ProposedChange::new(NodeId::from(node), attribute, value, None, confidence)
    }

    #[test]
    fn higher_confidence_wins_in_either_order() {
        let low_first: ChangeSet = [change("a", "x", json!(3), 3), change("b", "x", json!(7), 7)]
            .into_iter()
            .collect();
        let high_first: ChangeSet = [change("b", "x", json!(7), 7), change("a", "x", json!(3), 3)]
            .into_iter()
            .collect();

        for set in [low_first, high_first] {
            let resolved = set.resolve();
            assert_eq!(resolved.len(), 1);
            assert_eq!(resolved[0].new_value(), &json!(7));
        }
    }

    #[test]
    fn later_proposal_wins_ties() {
        let set: ChangeSet = [
            change("p1", "x", json!("first"), 5),
            change("p2", "x", json!("second"), 5),
        ]
        .into_iter()
        .collect();

        let resolved = set.resolve();
        assert_eq!(resolved[0].node().as_str(), "p2");
        assert_eq!(set.most_trusted("x").map(ProposedChange::new_value), Some(&json!("second")));
    }

    #[test]
    fn one_winner_per_attribute_in_first_seen_order() {
        let set: ChangeSet = [
            change("a", "y", json!(1), 0),
            change("a", "x", json!(1), 0),
            change("b", "y", json!(2), 1),
            change("c", "x", json!(0), -1),
        ]
        .into_iter()
        .collect();

        let resolved = set.resolve();
        let summary: Vec<_> = resolved
            .iter()
            .map(|c| (c.attribute(), c.new_value().clone()))
            .collect();
        assert_eq!(summary, vec![("y", json!(2)), ("x", json!(1))]);
    }

    #[test]
    fn empty_set_resolves_to_nothing() {
        let set = ChangeSet::new();
        assert!(set.resolve().is_empty());
        assert!(set.most_trusted("x").is_none());
        assert!(!set.touches("x"));
    }
}
