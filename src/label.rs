//! Totally ordered class labels.
//!
//! Cluster and class names are turned into labels by a [`LabelType`]; the
//! label order drives every deterministic per-label iteration in the crate.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::KddError;

/// Separator between the levels of a hierarchical label.
pub const LEVEL_SEPARATOR: char = '.';

/// Selects how names are turned into class labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    /// Plain string labels ordered lexicographically.
    Simple,
    /// Dot-separated labels compared level by level.
    #[default]
    Hierarchical,
}

impl LabelType {
    /// Build a label of this type from its textual name.
    pub fn label(self, name: &str) -> ClassLabel {
        match self {
            LabelType::Simple => ClassLabel::Simple(name.to_owned()),
            LabelType::Hierarchical => {
                ClassLabel::Hierarchical(HierarchicalClassLabel::new(name))
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LabelType::Simple => "simple",
            LabelType::Hierarchical => "hierarchical",
        }
    }
}

impl FromStr for LabelType {
    type Err = KddError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(LabelType::Simple),
            "hierarchical" => Ok(LabelType::Hierarchical),
            _ => Err(KddError::UnknownStrategy {
                role: "class label type",
                name: s.to_owned(),
            }),
        }
    }
}

/// A class or cluster label.
///
/// Labels of different types order by type first; within one type the
/// type-specific order applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassLabel {
    Simple(String),
    Hierarchical(HierarchicalClassLabel),
}

impl ClassLabel {
    pub fn name(&self) -> &str {
        match self {
            ClassLabel::Simple(name) => name,
            ClassLabel::Hierarchical(label) => label.name(),
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Label made of [`LEVEL_SEPARATOR`]-separated levels.
///
/// Levels are compared pairwise from the left. Two levels that both parse as
/// unsigned integers compare numerically (so `cluster.2 < cluster.10`), other
/// levels compare as strings. A label that is a strict prefix of another orders
/// first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchicalClassLabel {
    name: String,
    levels: Vec<String>,
}

impl HierarchicalClassLabel {
    pub fn new(name: &str) -> Self {
        let levels = name.split(LEVEL_SEPARATOR).map(str::to_owned).collect();
        Self {
            name: name.to_owned(),
            levels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&str> {
        self.levels.get(index).map(String::as_str)
    }
}

fn compare_levels(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        // "01" and "1" are numerically equal; fall back to the text so the
        // order stays consistent with equality.
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

impl Ord for HierarchicalClassLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.levels.iter().zip(other.levels.iter()) {
            let ordering = compare_levels(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.levels.len().cmp(&other.levels.len())
    }
}

impl PartialOrd for HierarchicalClassLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
