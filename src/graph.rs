//! Bar chart data: one row per cluster, one slot per member ordinal,
//! plus the legend mapping ordinals back to iterations.

use std::{collections::BTreeMap, fmt::Display};

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
    cluster::{Cluster, ClusterId, ClusterSummary, Clustering, cluster, split_by_primary_metric},
    debug,
    flatten::{HOST_SCOPE_ALL, IterationRecord},
};

/// The aggregation token a primary value key must contain.
pub const AGGREGATION_MEAN: &str = "mean";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MissingAggregationKey {
    #[error("no metric key contains both \"all\" and \"mean\"")]
    NoMatch,
    #[error("{} metric keys contain both \"all\" and \"mean\": {keys:?}", .keys.len())]
    Ambiguous { keys: Vec<String> },
}

/// The value charted for an iteration: the one metric whose key
/// contains both the all-hosts and the mean token. Zero or several
/// such keys leave the value undefined.
pub fn primary_value(record: &IterationRecord) -> Result<f64, MissingAggregationKey> {
    let mut matching = record
        .metrics
        .iter()
        .filter(|(key, _)| key.contains(HOST_SCOPE_ALL) && key.contains(AGGREGATION_MEAN));
    match (matching.next(), matching.next()) {
        (None, _) => Err(MissingAggregationKey::NoMatch),
        (Some((_, value)), None) => Ok(*value),
        (Some(_), Some(_)) => Err(MissingAggregationKey::Ambiguous {
            keys: record
                .metrics
                .keys()
                .filter(|key| key.contains(HOST_SCOPE_ALL) && key.contains(AGGREGATION_MEAN))
                .cloned()
                .collect(),
        }),
    }
}

/// One bar group. Serializes as
/// `{"clusterID": id, "cluster": label, "0": v0, ...}`, leaving out
/// undefined slots. Labels of different clusters can coincide, the id
/// can't.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRow {
    pub cluster_id: ClusterId,
    pub cluster: String,
    pub values: BTreeMap<usize, f64>,
}

impl Serialize for GraphRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry("clusterID", &self.cluster_id)?;
        map.serialize_entry("cluster", &self.cluster)?;
        for (ordinal, value) in &self.values {
            map.serialize_entry(&ordinal.to_string(), value)?;
        }
        map.end()
    }
}

/// Which iteration a series ordinal stands for within one cluster.
/// The same ordinal means different iterations in different clusters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    #[serde(rename = "clusterID")]
    pub cluster_id: ClusterId,
    pub cluster: String,
    pub ordinal: usize,
    pub controller_name: String,
    pub result_name: String,
    pub iteration_name: String,
    pub iteration_number: u64,
}

fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingSlot {
    #[serde(rename = "clusterID")]
    pub cluster_id: ClusterId,
    pub cluster: String,
    pub ordinal: usize,
    #[serde(serialize_with = "serialize_display")]
    pub reason: MissingAggregationKey,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GraphData {
    pub rows: Vec<GraphRow>,
    pub legend: Vec<LegendEntry>,
    pub missing: Vec<MissingSlot>,
}

impl GraphData {
    /// The legend of one cluster, by ordinal.
    pub fn legend_of(&self, cluster_id: ClusterId) -> impl Iterator<Item = &LegendEntry> {
        self.legend.iter().filter(move |e| e.cluster_id == cluster_id)
    }
}

fn add_cluster(data: &mut GraphData, cluster: &Cluster) {
    let label = cluster.label();
    let cluster_id = cluster.id;
    let mut values = BTreeMap::new();
    for (ordinal, record) in cluster.members.iter().enumerate() {
        data.legend.push(LegendEntry {
            cluster_id,
            cluster: label.clone(),
            ordinal,
            controller_name: record.controller_name.to_string(),
            result_name: record.result_name.to_string(),
            iteration_name: record.iteration_name.clone(),
            iteration_number: record.iteration_number,
        });
        match primary_value(record) {
            Ok(value) => {
                values.insert(ordinal, value);
            }
            Err(reason) => {
                debug!(
                    "cluster {label:?} slot {ordinal} ({}) left undefined: {reason}",
                    record.display_name()
                );
                data.missing.push(MissingSlot {
                    cluster_id,
                    cluster: label.clone(),
                    ordinal,
                    reason,
                });
            }
        }
    }
    data.rows.push(GraphRow {
        cluster_id,
        cluster: label,
        values,
    });
}

pub fn build_graph_data(clustering: &Clustering) -> GraphData {
    let mut data = GraphData::default();
    for cluster in &clustering.clusters {
        add_cluster(&mut data, cluster);
    }
    data
}

/// The chart of one primary metric group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryMetricGraph {
    pub primary_metric: Option<String>,
    pub clusters: Vec<ClusterSummary>,
    pub graph: GraphData,
}

/// Split `records` by their primary metric, cluster each group by
/// `dimensions` and chart it.
pub fn build_graphs<'r, S: AsRef<str>>(
    records: impl IntoIterator<Item = &'r IterationRecord>,
    dimensions: &[S],
) -> Vec<PrimaryMetricGraph> {
    split_by_primary_metric(records)
        .into_iter()
        .map(|(primary_metric, members)| {
            let clustering = cluster(members, dimensions);
            PrimaryMetricGraph {
                primary_metric: primary_metric.map(str::to_owned),
                clusters: clustering.summaries(),
                graph: build_graph_data(&clustering),
            }
        })
        .collect()
}
