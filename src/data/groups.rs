//! Grouping factors — frozen categorical level maps for random effects.
//!
//! Purpose
//! -------
//! Represent the categorical dimensions over which hierarchical (random)
//! effects are estimated. A [`GroupingFactor`] freezes its level set at
//! construction; labels seen later that are not in the map resolve to the
//! implicit "overall" level, which carries a zero random offset by the
//! mean-centering contract of the parameter layer.
//!
//! Key behaviors
//! -------------
//! - [`GroupingFactor::from_labels`] builds the frozen level map from
//!   training assignments, preserving first-occurrence order.
//! - [`GroupingFactor::resolve`] maps a batch of labels to level indices,
//!   `None` marking the overall level.
//!
//! Invariants & assumptions
//! ------------------------
//! - Level maps never grow after construction (closed parameter set).
//! - Level indices are dense: `0..n_levels`.
//!
//! Downstream usage
//! ----------------
//! - The parameter layer sizes each random-offset tensor by
//!   [`GroupingFactor::n_levels`] and gathers rows by resolved index.
//! - Level maps are persisted alongside the parameter store.
use std::collections::HashMap;

/// A frozen categorical grouping dimension.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GroupingFactor {
    /// Factor name (e.g. `"subject"`).
    pub name: String,
    /// Level labels in index order.
    levels: Vec<String>,
    /// Label → dense index.
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl GroupingFactor {
    /// Build a frozen level map from training labels, preserving the order
    /// of first occurrence. Duplicate labels collapse onto one level.
    pub fn from_labels<'a, I>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut levels = Vec::new();
        let mut index = HashMap::new();
        for label in labels {
            if !index.contains_key(label) {
                index.insert(label.to_string(), levels.len());
                levels.push(label.to_string());
            }
        }
        GroupingFactor { name: name.into(), levels, index }
    }

    /// Rebuild the label index after deserialization.
    ///
    /// The index is derived state; serde skips it, so stores that load
    /// persisted factors call this once per factor.
    pub fn rebuild_index(&mut self) {
        self.index =
            self.levels.iter().enumerate().map(|(i, l)| (l.clone(), i)).collect();
    }

    /// Number of observed levels (excluding the implicit overall level).
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Level labels in index order.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Resolve one label to its dense index; `None` is the overall level.
    pub fn level_index(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Resolve a batch of labels to dense indices.
    pub fn resolve<'a, I>(&self, labels: I) -> Vec<Option<usize>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels.into_iter().map(|l| self.level_index(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Level maps preserve first-occurrence order and collapse duplicates.
    fn from_labels_freezes_first_occurrence_order() {
        let factor =
            GroupingFactor::from_labels("subject", ["s2", "s1", "s2", "s3"]);

        assert_eq!(factor.n_levels(), 3);
        let levels: Vec<&str> = factor.levels().iter().map(String::as_str).collect();
        assert_eq!(levels, vec!["s2", "s1", "s3"]);
        assert_eq!(factor.level_index("s1"), Some(1));
    }

    #[test]
    // Purpose
    // -------
    // Labels unseen at construction resolve to the overall level (`None`)
    // rather than growing the map.
    fn unseen_labels_resolve_to_overall() {
        let factor = GroupingFactor::from_labels("subject", ["s1"]);

        assert_eq!(factor.resolve(["s1", "s9"]), vec![Some(0), None]);
        assert_eq!(factor.n_levels(), 1);
    }

    #[test]
    fn rebuild_index_restores_lookups() {
        let factor = GroupingFactor::from_labels("item", ["a", "b"]);
        let json = serde_json::to_string(&factor).unwrap();
        let mut restored: GroupingFactor = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.level_index("b"), None); // index skipped by serde
        restored.rebuild_index();
        assert_eq!(restored.level_index("b"), Some(1));
    }
}
