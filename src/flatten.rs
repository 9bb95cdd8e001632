//! Turns raw iterations into flat `IterationRecord`s, threading the
//! `SchemaState` through the iterations of a load as a fold.

use std::collections::BTreeMap;

use kstring::KString;
use serde::Serialize;

use crate::{
    debug, info,
    raw::{ALL_HOSTS, RawIteration, RawResult, Scalar},
    schema::{Catalogs, SchemaGranularity, SchemaState, TouchedLeaf},
    tree::{ColumnNode, MetricKind},
};

/// Benchmark parameters that identify the run or are statistical
/// settings, not configuration dimensions.
pub const RESERVED_PARAMETER_KEYS: [&str; 4] = ["uid", "clients", "servers", "max_stddevpct"];

/// The benchmark parameter declaring the iteration's primary metric.
pub const PRIMARY_METRIC_KEY: &str = "primary_metric";

/// Token marking the host scope aggregating all hosts in metric keys.
pub const HOST_SCOPE_ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub result_name: KString,
    pub controller_name: KString,
    pub iteration_number: u64,
    pub iteration_name: String,
    /// From the `primary_metric` benchmark parameter, if it is a string
    pub primary_metric: Option<String>,
    pub dimensions: BTreeMap<String, Scalar>,
    /// `data_key` -> value, one entry per metric leaf written by this
    /// iteration
    pub metrics: BTreeMap<String, f64>,
    pub closest_sample_index: Option<u64>,
}

impl IterationRecord {
    /// `"{resultName}-{iterationName}"`, as shown in legends
    pub fn display_name(&self) -> String {
        format!("{}-{}", self.result_name, self.iteration_name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Scalar> {
        self.dimensions.get(name)
    }
}

/// Which run result the iterations of a load belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSource {
    pub controller_name: KString,
    pub result_name: KString,
}

impl From<&RawResult> for ResultSource {
    fn from(result: &RawResult) -> Self {
        Self {
            controller_name: result.controller_name.clone(),
            result_name: result.result_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub granularity: SchemaGranularity,
    /// Iterations whose name contains this are left out of the
    /// records
    pub exclude_token: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            granularity: SchemaGranularity::default(),
            exclude_token: "fail".into(),
        }
    }
}

/// The per-load output: column tree, records and catalogs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LoadedResults {
    pub columns: ColumnNode,
    pub records: Vec<IterationRecord>,
    pub catalogs: Catalogs,
}

impl LoadedResults {
    pub fn observed_ports(&self) -> Vec<&str> {
        self.catalogs
            .observed_ports
            .iter()
            .map(String::as_str)
            .collect()
    }
}

fn dimensions_of(iteration: &RawIteration) -> BTreeMap<String, Scalar> {
    match iteration.iteration_data.benchmark_parameters() {
        Some(params) => params
            .iter()
            .filter(|(key, _)| !RESERVED_PARAMETER_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), Scalar::from_json(value)))
            .collect(),
        None => {
            debug!(
                "iteration {:?} has no benchmark parameters, no dimensions",
                iteration.iteration_name
            );
            BTreeMap::new()
        }
    }
}

/// The closest sample of the entry aggregating all hosts, or if there
/// isn't exactly one such entry, of the first entry.
fn closest_sample_index(touched: &[TouchedLeaf]) -> Option<u64> {
    let closest: Vec<&TouchedLeaf> = touched
        .iter()
        .filter(|leaf| leaf.kind == MetricKind::ClosestSample)
        .collect();
    let all_hosts: Vec<&TouchedLeaf> = closest
        .iter()
        .copied()
        .filter(|leaf| leaf.client_hostname == ALL_HOSTS)
        .collect();
    let value = if all_hosts.len() == 1 {
        all_hosts[0].value
    } else {
        closest.first()?.value
    };
    if value.is_finite() && value >= 0. {
        Some(value as u64)
    } else {
        None
    }
}

/// One fold step: `(state, iteration) -> (state', record)`. The
/// record is `None` for excluded iterations, which still contribute
/// their dimension values to the catalogs.
pub fn flatten_iteration(
    state: SchemaState,
    source: &ResultSource,
    iteration: &RawIteration,
    options: &LoadOptions,
) -> (SchemaState, Option<IterationRecord>) {
    let dimensions = dimensions_of(iteration);
    let state = state.observe_dimensions(
        dimensions
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_string())),
    );

    if !options.exclude_token.is_empty() && iteration.iteration_name.contains(&options.exclude_token)
    {
        info!(
            "excluding iteration {:?} of {:?}",
            iteration.iteration_name, source.result_name
        );
        return (state, None);
    }

    let (state, touched) = state.observe_measurements(&iteration.iteration_data.measurements);
    let closest_sample_index = closest_sample_index(&touched);
    let primary_metric = dimensions
        .get(PRIMARY_METRIC_KEY)
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    let metrics = touched
        .into_iter()
        .map(|leaf| (leaf.data_key, leaf.value))
        .collect();

    let record = IterationRecord {
        result_name: source.result_name.clone(),
        controller_name: source.controller_name.clone(),
        iteration_number: iteration.iteration_number,
        iteration_name: iteration.iteration_name.clone(),
        primary_metric,
        dimensions,
        metrics,
        closest_sample_index,
    };
    (state, Some(record))
}

/// Load several results in one go, with one schema and catalog
/// shared by all of them.
pub fn load_results(results: &[RawResult], options: &LoadOptions) -> LoadedResults {
    let (state, records) = results
        .iter()
        .flat_map(|result| {
            let source = ResultSource::from(result);
            result
                .iterations
                .iter()
                .map(move |iteration| (source.clone(), iteration))
        })
        .fold(
            (SchemaState::new(options.granularity), Vec::new()),
            |(state, mut records), (source, iteration)| {
                let (state, record) = flatten_iteration(state, &source, iteration, options);
                records.extend(record);
                (state, records)
            },
        );
    info!(
        "loaded {} records from {} results, {} metric columns",
        records.len(),
        results.len(),
        state.columns.data_keys().len()
    );
    let SchemaState {
        columns,
        catalogs,
        granularity: _,
    } = state;
    LoadedResults {
        columns,
        records,
        catalogs,
    }
}

pub fn load_result(result: &RawResult, options: &LoadOptions) -> LoadedResults {
    load_results(std::slice::from_ref(result), options)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::*;

    fn iteration(name: &str, params: serde_json::Value) -> Result<RawIteration> {
        Ok(serde_json::from_value(json!({
            "iteration_name": name,
            "iteration_number": 1,
            "iteration_data": {
                "parameters": { "benchmark": [params] },
                "throughput": {
                    "tcp": {
                        "0": { "client_hostname": "all", "server_hostname": "all",
                               "server_port": "20001", "mean": 5, "stddevpct": 1,
                               "closest sample": 2 }
                    }
                }
            }
        }))?)
    }

    fn source() -> ResultSource {
        ResultSource {
            controller_name: KString::from_static("ctrl"),
            result_name: KString::from_static("res"),
        }
    }

    #[test]
    fn t_dimensions_drop_reserved() -> Result<()> {
        let it = iteration(
            "1-tcp",
            json!({ "protocol": "tcp", "uid": "u", "clients": "c", "servers": "s",
                    "max_stddevpct": 5, "primary_metric": "Gb_sec" }),
        )?;
        let (_, record) =
            flatten_iteration(SchemaState::default(), &source(), &it, &LoadOptions::default());
        let record = record.expect("not excluded");
        let names: Vec<&str> = record.dimensions.keys().map(String::as_str).collect();
        assert_eq!(names, ["primary_metric", "protocol"]);
        assert_eq!(record.primary_metric.as_deref(), Some("Gb_sec"));
        assert_eq!(record.closest_sample_index, Some(2));
        assert_eq!(record.metrics.len(), 3);
        assert_eq!(record.display_name(), "res-1-tcp");
        Ok(())
    }

    #[test]
    fn t_closest_sample_matches_host_exactly() -> Result<()> {
        let it: RawIteration = serde_json::from_value(json!({
            "iteration_name": "1-tcp",
            "iteration_number": 1,
            "iteration_data": {
                "throughput": { "tcp": {
                    "0": { "client_hostname": "hall-a", "server_hostname": "s1",
                           "server_port": "20001", "mean": 5, "stddevpct": 1,
                           "closest sample": 1 },
                    "1": { "client_hostname": "all", "server_hostname": "all",
                           "server_port": "20001", "mean": 9, "stddevpct": 1,
                           "closest sample": 3 }
                } }
            }
        }))?;
        let (_, record) =
            flatten_iteration(SchemaState::default(), &source(), &it, &LoadOptions::default());
        assert_eq!(record.expect("retained").closest_sample_index, Some(3));
        Ok(())
    }

    #[test]
    fn t_failed_iterations_are_excluded_but_cataloged() -> Result<()> {
        let it = iteration("2-udp-fail", json!({ "protocol": "udp" }))?;
        let (state, record) =
            flatten_iteration(SchemaState::default(), &source(), &it, &LoadOptions::default());
        assert!(record.is_none());
        assert!(state.catalogs.dimension_values["protocol"].contains("udp"));
        assert!(state.columns.children.is_empty());
        Ok(())
    }

    #[test]
    fn t_missing_benchmark_array_keeps_identity() -> Result<()> {
        let it: RawIteration = serde_json::from_value(json!({
            "iteration_name": "3-x",
            "iteration_number": 3,
            "iteration_data": { "parameters": {} }
        }))?;
        let (_, record) =
            flatten_iteration(SchemaState::default(), &source(), &it, &LoadOptions::default());
        let record = record.expect("retained");
        assert!(record.dimensions.is_empty());
        assert_eq!(record.iteration_number, 3);
        assert_eq!(record.result_name.as_str(), "res");
        assert_eq!(record.closest_sample_index, None);
        Ok(())
    }

    #[test]
    fn t_load_results_folds_all() -> Result<()> {
        let result = RawResult {
            controller_name: "ctrl".into(),
            result_name: "res".into(),
            iterations: vec![
                iteration("1-a", json!({ "protocol": "tcp" }))?,
                iteration("2-b-fail", json!({ "protocol": "sctp" }))?,
                iteration("3-c", json!({ "protocol": "udp" }))?,
            ],
        };
        let loaded = load_result(&result, &LoadOptions::default());
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.catalogs.dimension_values["protocol"].len(), 3);
        assert_eq!(loaded.observed_ports(), ["20001"]);
        assert_eq!(loaded.columns.data_keys().len(), 3);
        Ok(())
    }
}
