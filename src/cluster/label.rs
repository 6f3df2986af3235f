//! Structured labels identifying the cluster each site belongs to.
use itertools::Itertools;
use std::fmt;

/// The text shown for a label with no parts, i.e. one cluster covering every site
const ALL_SITES_LABEL: &str = "all";

/// One level of a cluster label, e.g. the county a group was formed from or a bin index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelPart {
    /// The column or stage this part came from (e.g. `county`, `lcoe_bin`, `cluster`)
    pub name: String,
    /// The value shared by every site with this label
    pub value: String,
}

/// A label identifying a cluster.
///
/// Labels are built up as sites pass through the pipeline: binning, grouping and clustering
/// each append a part. Labels are only unique when all parts are considered together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterLabel(Vec<LabelPart>);

impl ClusterLabel {
    /// Create a label with no parts
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a label from `(name, value)` pairs
    pub fn from_parts<I, N, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self(
            parts
                .into_iter()
                .map(|(name, value)| LabelPart {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        )
    }

    /// A copy of this label with an extra part appended
    pub fn with_part(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(LabelPart {
            name: name.into(),
            value: value.into(),
        });
        Self(parts)
    }

    /// A copy of this label with all the parts of `other` appended
    pub fn join(&self, other: &ClusterLabel) -> Self {
        Self(self.0.iter().chain(other.0.iter()).cloned().collect())
    }

    /// The parts of this label, outermost first
    pub fn parts(&self) -> &[LabelPart] {
        &self.0
    }

    /// Whether any part of this label has the given name and value
    pub fn matches(&self, name: &str, value: &str) -> bool {
        self.0
            .iter()
            .any(|part| part.name == name && part.value == value)
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{ALL_SITES_LABEL}");
        }

        let text = self
            .0
            .iter()
            .map(|part| format!("{}_{}", part.name, part.value))
            .join(":");
        write!(f, "{text}")
    }
}
