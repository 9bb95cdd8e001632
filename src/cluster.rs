//! Grouping and filtering of iteration records by configuration
//! dimensions.

use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    fmt::Display,
    str::FromStr,
};

use serde::Serialize;

use crate::{flatten::IterationRecord, raw::Scalar};

/// Joins the dimension values of a cluster into its label.
pub const LABEL_SEPARATOR: &str = "-";

/// The label of the single cluster made when no dimension is
/// selected.
pub const ALL_ITERATIONS_LABEL: &str = "all iterations";

/// Position of a cluster in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterId(pub usize);

impl Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster<'r> {
    pub id: ClusterId,
    /// One value per selected dimension, in selection order
    pub matched_dimension_values: Vec<String>,
    pub members: Vec<&'r IterationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    #[serde(rename = "clusterID")]
    pub cluster_id: ClusterId,
    pub label: String,
    #[serde(rename = "iterationCount")]
    pub iteration_count: usize,
}

impl<'r> Cluster<'r> {
    pub fn label(&self) -> String {
        if self.matched_dimension_values.is_empty() {
            ALL_ITERATIONS_LABEL.into()
        } else {
            self.matched_dimension_values.join(LABEL_SEPARATOR)
        }
    }

    pub fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            cluster_id: self.id,
            label: self.label(),
            iteration_count: self.members.len(),
        }
    }
}

/// The clusters together with their labels, instead of recording the
/// labels somewhere on the side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clustering<'r> {
    pub clusters: Vec<Cluster<'r>>,
    pub labels: BTreeMap<ClusterId, String>,
}

impl<'r> Clustering<'r> {
    pub fn summaries(&self) -> Vec<ClusterSummary> {
        self.clusters.iter().map(Cluster::summary).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// The value of `dimension` on `record` as used in labels; a missing
/// dimension gives `Scalar::UNDEFINED`.
pub fn dimension_label(record: &IterationRecord, dimension: &str) -> String {
    match record.dimension(dimension) {
        Some(value) => value.to_string(),
        None => Scalar::UNDEFINED.into(),
    }
}

/// Partition `iterations` by the tuple of their values for
/// `selected_dimensions`. Clusters come in the order their tuples are
/// first seen. With no dimension selected, all iterations form one
/// cluster (none if there are no iterations).
pub fn cluster<'r, S: AsRef<str>>(
    iterations: impl IntoIterator<Item = &'r IterationRecord>,
    selected_dimensions: &[S],
) -> Clustering<'r> {
    let mut clusters: Vec<Cluster<'r>> = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    for record in iterations {
        let values: Vec<String> = selected_dimensions
            .iter()
            .map(|dimension| dimension_label(record, dimension.as_ref()))
            .collect();
        match index.entry(values) {
            Entry::Occupied(occupied_entry) => {
                clusters[*occupied_entry.get()].members.push(record);
            }
            Entry::Vacant(vacant_entry) => {
                let id = ClusterId(clusters.len());
                clusters.push(Cluster {
                    id,
                    matched_dimension_values: vacant_entry.key().clone(),
                    members: vec![record],
                });
                vacant_entry.insert(id.0);
            }
        }
    }
    let labels = clusters.iter().map(|c| (c.id, c.label())).collect();
    Clustering { clusters, labels }
}

/// Dimension -> required value (compared with the displayed value).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilterSelection(pub BTreeMap<String, String>);

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
        self.0.insert(dimension.into(), value.into());
    }

    /// All selected dimensions must match; dimensions not in the
    /// selection are unconstrained, a record lacking a selected
    /// dimension does not match.
    pub fn matches(&self, record: &IterationRecord) -> bool {
        self.0.iter().all(|(dimension, wanted)| {
            record
                .dimension(dimension)
                .map(|value| value.to_string() == *wanted)
                .unwrap_or(false)
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterSelection {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("expecting `dimension=value`, got {0:?}")]
pub struct ParseFilterError(String);

/// One `dimension=value` term as given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub dimension: String,
    pub value: String,
}

impl FromStr for FilterTerm {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((dimension, value)) if !dimension.is_empty() => Ok(FilterTerm {
                dimension: dimension.into(),
                value: value.into(),
            }),
            _ => Err(ParseFilterError(s.into())),
        }
    }
}

/// The iterations matching all of `selection`, in input order.
pub fn filter_iterations<'r>(
    iterations: impl IntoIterator<Item = &'r IterationRecord>,
    selection: &FilterSelection,
) -> Vec<&'r IterationRecord> {
    iterations
        .into_iter()
        .filter(|record| selection.matches(record))
        .collect()
}

/// Groups records by their declared primary metric, in first-seen
/// order. Records without one share the `None` group.
pub fn split_by_primary_metric<'r>(
    iterations: impl IntoIterator<Item = &'r IterationRecord>,
) -> Vec<(Option<&'r str>, Vec<&'r IterationRecord>)> {
    let mut groups: Vec<(Option<&'r str>, Vec<&'r IterationRecord>)> = Vec::new();
    for record in iterations {
        let metric = record.primary_metric.as_deref();
        match groups.iter_mut().find(|(m, _)| *m == metric) {
            Some((_, members)) => members.push(record),
            None => groups.push((metric, vec![record])),
        }
    }
    groups
}
