//! One comparison session: the loaded results plus the current
//! selection, with everything derived from them.

use std::{collections::BTreeMap, fmt::Display};

use serde::Serialize;

use crate::{
    cluster::{
        Cluster, ClusterId, ClusterSummary, FilterSelection, cluster, filter_iterations,
        split_by_primary_metric,
    },
    fetch::{FetchPool, SampleFetcher, SampleRequest},
    flatten::{IterationRecord, LoadOptions, LoadedResults, load_results},
    graph::{PrimaryMetricGraph, build_graphs},
    info,
    raw::{RawResult, RawSample, RawTimeseries},
    timeseries::{MergeStrategy, MergedSeries, merge, select_series},
    warn,
};

/// What the user gets told about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notice {
    /// One or more sample fetches failed; the time series of the
    /// comparison are left empty.
    NetworkError {
        failed: usize,
        total: usize,
        message: String,
    },
}

impl Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::NetworkError { message, .. } => write!(f, "network error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTimeseries {
    pub primary_metric: Option<String>,
    pub cluster: ClusterSummary,
    pub series: MergedSeries,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TimeseriesOutcome {
    pub series: Vec<ClusterTimeseries>,
    pub notices: Vec<Notice>,
}

pub struct ComparisonSession {
    loaded: LoadedResults,
    dimensions: Vec<String>,
    filters: FilterSelection,
    merge_strategy: MergeStrategy,
    graphs: Vec<PrimaryMetricGraph>,
}

impl ComparisonSession {
    pub fn new(loaded: LoadedResults, merge_strategy: MergeStrategy) -> Self {
        let mut slf = Self {
            loaded,
            dimensions: Vec::new(),
            filters: FilterSelection::default(),
            merge_strategy,
            graphs: Vec::new(),
        };
        slf.recompute();
        slf
    }

    pub fn load(results: &[RawResult], options: &LoadOptions, merge_strategy: MergeStrategy) -> Self {
        Self::new(load_results(results, options), merge_strategy)
    }

    fn recompute(&mut self) {
        let selected = filter_iterations(&self.loaded.records, &self.filters);
        self.graphs = build_graphs(selected, &self.dimensions);
        info!(
            "{} primary metric groups, {} clusters",
            self.graphs.len(),
            self.graphs.iter().map(|g| g.clusters.len()).sum::<usize>()
        );
    }

    pub fn select_dimensions(&mut self, dimensions: Vec<String>) {
        self.dimensions = dimensions;
        self.recompute();
    }

    pub fn select_filters(&mut self, filters: FilterSelection) {
        self.filters = filters;
        self.recompute();
    }

    pub fn loaded(&self) -> &LoadedResults {
        &self.loaded
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge_strategy
    }

    /// The records passing the filter selection.
    pub fn selected_records(&self) -> Vec<&IterationRecord> {
        filter_iterations(&self.loaded.records, &self.filters)
    }

    pub fn graphs(&self) -> &[PrimaryMetricGraph] {
        &self.graphs
    }

    /// (primary metric, cluster summary) for every cluster of every
    /// primary metric group.
    pub fn cluster_summaries(&self) -> Vec<(Option<&str>, &ClusterSummary)> {
        self.graphs
            .iter()
            .flat_map(|g| {
                g.clusters
                    .iter()
                    .map(move |summary| (g.primary_metric.as_deref(), summary))
            })
            .collect()
    }

    /// The clusters of the current selection, per primary metric
    /// group.
    fn clusters(&self) -> Vec<(Option<&str>, Cluster<'_>)> {
        split_by_primary_metric(self.selected_records())
            .into_iter()
            .flat_map(|(primary_metric, members)| {
                cluster(members, &self.dimensions)
                    .clusters
                    .into_iter()
                    .map(move |c| (primary_metric, c))
            })
            .collect()
    }

    /// Merged time series for every cluster of the selection.
    pub fn timeseries(&self, pool: &FetchPool, fetcher: &impl SampleFetcher) -> TimeseriesOutcome {
        self.timeseries_of(self.clusters(), pool, fetcher)
    }

    /// Merged time series for one cluster.
    pub fn cluster_timeseries(
        &self,
        primary_metric: Option<&str>,
        cluster_id: ClusterId,
        pool: &FetchPool,
        fetcher: &impl SampleFetcher,
    ) -> TimeseriesOutcome {
        let targets = self
            .clusters()
            .into_iter()
            .filter(|(m, c)| *m == primary_metric && c.id == cluster_id)
            .collect();
        self.timeseries_of(targets, pool, fetcher)
    }

    /// Fetches the samples of all members of all `targets` at once,
    /// and only merges once every fetch has finished.
    fn timeseries_of(
        &self,
        targets: Vec<(Option<&str>, Cluster<'_>)>,
        pool: &FetchPool,
        fetcher: &impl SampleFetcher,
    ) -> TimeseriesOutcome {
        let members: Vec<&IterationRecord> = targets
            .iter()
            .flat_map(|(_, c)| c.members.iter().copied())
            .collect();
        let (positions, requests): (Vec<usize>, Vec<SampleRequest>) = members
            .iter()
            .enumerate()
            .filter_map(|(i, record)| SampleRequest::for_record(record).map(|r| (i, r)))
            .unzip();

        let fetched = match pool.fetch_all(fetcher, &requests) {
            Ok(fetched) => fetched,
            Err(failure) => {
                warn!("{failure}");
                return TimeseriesOutcome {
                    series: Vec::new(),
                    notices: vec![Notice::NetworkError {
                        failed: failure.failures.len(),
                        total: failure.total,
                        message: failure.to_string(),
                    }],
                };
            }
        };
        let samples_of: BTreeMap<usize, RawTimeseries> = positions.into_iter().zip(fetched).collect();

        let mut offset = 0;
        let series = targets
            .iter()
            .map(|(primary_metric, cluster)| {
                let inputs: Vec<(&IterationRecord, Option<&[RawSample]>)> = cluster
                    .members
                    .iter()
                    .enumerate()
                    .map(|(j, record)| {
                        let raw = samples_of.get(&(offset + j));
                        (*record, raw.and_then(|raw| select_series(record, raw)))
                    })
                    .collect();
                offset += cluster.members.len();
                ClusterTimeseries {
                    primary_metric: primary_metric.map(str::to_owned),
                    cluster: cluster.summary(),
                    series: merge(&inputs, self.merge_strategy),
                }
            })
            .collect();
        TimeseriesOutcome {
            series,
            notices: Vec::new(),
        }
    }
}
