//! Layered grouping of graph nodes.

use serde::{Deserialize, Serialize};

/// Ordered groups of node ids where each group may run concurrently.
///
/// Group `i` holds every node whose upstream nodes all sit in groups
/// `0..i`. Node ids within a group are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainableGroups {
    groups: Vec<Vec<String>>,
}

impl ChainableGroups {
    pub(crate) fn new(groups: Vec<Vec<String>>) -> Self {
        Self { groups }
    }

    /// Returns the groups in execution order.
    #[must_use]
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Returns the number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the total number of nodes across all groups.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Returns the index of the group containing `node`.
    #[must_use]
    pub fn group_of(&self, node: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.iter().any(|n| n == node))
    }

    /// Iterates over the groups.
    pub fn iter(&self) -> std::slice::Iter<'_, Vec<String>> {
        self.groups.iter()
    }

    /// Consumes the wrapper and returns the raw groups.
    #[must_use]
    pub fn into_inner(self) -> Vec<Vec<String>> {
        self.groups
    }
}

impl<'a> IntoIterator for &'a ChainableGroups {
    type Item = &'a Vec<String>;
    type IntoIter = std::slice::Iter<'a, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}
