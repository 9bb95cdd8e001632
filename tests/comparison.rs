use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use bench_compare::{
    cluster::{FilterSelection, cluster, filter_iterations},
    comparison::{ComparisonSession, Notice},
    fetch::{FetchPool, SampleFetchError, SampleFetcher, SampleRequest},
    flatten::{IterationRecord, LoadOptions, load_result, load_results},
    graph::{build_graph_data, primary_value},
    raw::{RawResult, RawSample, RawTimeseries},
    schema::SchemaGranularity,
    timeseries::{MergeStrategy, MergeWarning, merge},
    tree::ColumnNode,
};
use serde_json::{Value, json};

fn endpoint(client: &str, server: &str, port: &str, mean: f64) -> Value {
    json!({
        "client_hostname": client, "server_hostname": server, "server_port": port,
        "mean": mean, "stddevpct": 1, "closest sample": 2
    })
}

fn iteration(n: u64, name: &str, params: Value, measurements: Value) -> Value {
    let mut data = measurements;
    data["parameters"] = json!({ "benchmark": [params] });
    json!({ "iteration_name": name, "iteration_number": n, "iteration_data": data })
}

fn raw_result(result_name: &str, iterations: Vec<Value>) -> Result<RawResult> {
    Ok(serde_json::from_value(json!({
        "controller_name": "ctrl",
        "result_name": result_name,
        "iterations": iterations,
    }))?)
}

/// Three tcp/udp iterations with an all-hosts entry and a per-host
/// entry each, plus one failed iteration.
fn uperf_result() -> Result<RawResult> {
    let measurements = |mean: f64| {
        json!({
            "throughput": {
                "Gb_sec": {
                    "0": endpoint("all", "all", "20001", mean),
                    "1": endpoint("h1", "h2", "20002", mean / 2.)
                }
            }
        })
    };
    raw_result(
        "uperf_1",
        vec![
            iteration(
                1,
                "1-tcp_stream-64B-1i",
                json!({ "protocol": "tcp", "message_size": 64, "primary_metric": "Gb_sec",
                        "uid": "u", "clients": ["h1"], "servers": ["h2"], "max_stddevpct": 5 }),
                measurements(10.),
            ),
            iteration(
                2,
                "2-tcp_stream-1024B-1i",
                json!({ "protocol": "tcp", "message_size": 1024, "primary_metric": "Gb_sec" }),
                measurements(20.),
            ),
            iteration(
                3,
                "3-udp_stream-64B-1i",
                json!({ "protocol": "udp", "message_size": 64, "primary_metric": "Gb_sec" }),
                measurements(30.),
            ),
            iteration(
                4,
                "4-sctp_stream-64B-1i-fail",
                json!({ "protocol": "sctp", "message_size": 64, "primary_metric": "Gb_sec" }),
                measurements(40.),
            ),
        ],
    )
}

fn numbers<'r>(records: impl IntoIterator<Item = &'r IterationRecord>) -> Vec<u64> {
    records.into_iter().map(|r| r.iteration_number).collect()
}

#[test]
fn scenario_a_cluster_by_protocol() -> Result<()> {
    let loaded = load_result(&uperf_result()?, &LoadOptions::default());
    let clustering = cluster(&loaded.records, &["protocol"]);
    let shape: Vec<(String, usize)> = clustering
        .summaries()
        .into_iter()
        .map(|s| (s.label, s.iteration_count))
        .collect();
    assert_eq!(shape, [("tcp".to_string(), 2), ("udp".to_string(), 1)]);
    Ok(())
}

#[test]
fn scenario_b_column_path_and_metric() -> Result<()> {
    let result = raw_result(
        "r",
        vec![iteration(
            1,
            "1-x",
            json!({}),
            json!({ "throughput": { "tcp": { "0": endpoint("h1", "h2", "20001", 5.) } } }),
        )],
    )?;
    let loaded = load_result(&result, &LoadOptions::default());
    let endpoint_node = loaded
        .columns
        .get(
            [
                "throughput",
                "tcp",
                "client_hostname:h1-server_hostname:h2-server_port:20001",
            ]
            .into_iter(),
        )
        .expect("path exists");
    let titles: Vec<&str> = endpoint_node.children.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, ["mean", "stddevpct", "closestSample"]);
    assert_eq!(
        loaded.records[0].metrics
            ["throughput-tcp-client_hostname:h1-server_hostname:h2-server_port:20001-mean"],
        5.
    );
    assert_eq!(loaded.observed_ports(), ["20001"]);
    Ok(())
}

#[test]
fn scenario_c_primary_value_in_row() -> Result<()> {
    let loaded = load_result(&uperf_result()?, &LoadOptions::default());
    assert_eq!(primary_value(&loaded.records[0]), Ok(10.));
    let clustering = cluster(&loaded.records, &["message_size"]);
    let data = build_graph_data(&clustering);
    assert_eq!(data.rows[0].cluster, "64");
    assert_eq!(data.rows[0].values, BTreeMap::from([(0, 10.), (1, 30.)]));
    assert_eq!(data.rows[1].values, BTreeMap::from([(0, 20.)]));
    assert!(data.missing.is_empty());
    Ok(())
}

#[test]
fn scenario_d_two_series_three_points() {
    let load = |n: u64| -> IterationRecord {
        IterationRecord {
            result_name: "res".into(),
            controller_name: "ctrl".into(),
            iteration_number: n,
            iteration_name: format!("{n}-it"),
            primary_metric: None,
            dimensions: BTreeMap::new(),
            metrics: BTreeMap::new(),
            closest_sample_index: None,
        }
    };
    let (a, b) = (load(1), load(2));
    let samples = |v: f64| -> Vec<RawSample> {
        (0..3)
            .map(|i| RawSample {
                date: 1_000 * i,
                value: v + i as f64,
            })
            .collect()
    };
    let (sa, sb) = (samples(1.), samples(10.));
    let merged = merge(
        &[(&a, Some(sa.as_slice())), (&b, Some(sb.as_slice()))],
        MergeStrategy::Position,
    );
    assert_eq!(merged.points.len(), 3);
    for point in &merged.points {
        assert_eq!(point.y.keys().copied().collect::<Vec<_>>(), [1, 2]);
    }
    assert_eq!(merged.labels[&1], "res-1-it");
}

#[test]
fn scenario_e_filter_conjunction() -> Result<()> {
    let loaded = load_result(&uperf_result()?, &LoadOptions::default());
    let mut selection = FilterSelection::default();
    selection.insert("protocol", "tcp");
    assert_eq!(numbers(filter_iterations(&loaded.records, &selection)), [1, 2]);
    selection.insert("message_size", "64");
    assert_eq!(numbers(filter_iterations(&loaded.records, &selection)), [1]);
    Ok(())
}

#[test]
fn failed_iterations_feed_catalogs_only() -> Result<()> {
    let loaded = load_result(&uperf_result()?, &LoadOptions::default());
    assert_eq!(numbers(&loaded.records), [1, 2, 3]);
    assert!(loaded.catalogs.dimension_values["protocol"].contains("sctp"));
    let dims: Vec<&str> = loaded.records[0].dimensions.keys().map(String::as_str).collect();
    assert_eq!(dims, ["message_size", "primary_metric", "protocol"]);
    Ok(())
}

fn all_partitions_exact(records: &[IterationRecord], dims: &[&str]) {
    let clustering = cluster(records, dims);
    let mut seen: Vec<u64> = clustering
        .clusters
        .iter()
        .flat_map(|c| numbers(c.members.iter().copied()))
        .collect();
    seen.sort();
    let mut all = numbers(records);
    all.sort();
    assert_eq!(seen, all, "dims {dims:?}");
}

fn partition(records: &[IterationRecord], dims: &[&str]) -> BTreeSet<BTreeSet<u64>> {
    cluster(records, dims)
        .clusters
        .iter()
        .map(|c| numbers(c.members.iter().copied()).into_iter().collect())
        .collect()
}

#[test]
fn clusters_partition_the_input() -> Result<()> {
    let loaded = load_result(&uperf_result()?, &LoadOptions::default());
    let selections: [&[&str]; 5] = [
        &[],
        &["protocol"],
        &["message_size"],
        &["protocol", "message_size"],
        &["no_such_dimension"],
    ];
    for dims in selections {
        all_partitions_exact(&loaded.records, dims);
    }
    assert_eq!(
        partition(&loaded.records, &["protocol", "message_size"]),
        partition(&loaded.records, &["message_size", "protocol"])
    );
    Ok(())
}

fn siblings_unique_everywhere(node: &ColumnNode) -> bool {
    let titles: BTreeSet<&str> = node.children.iter().map(|c| c.title.as_str()).collect();
    titles.len() == node.children.len() && node.children.iter().all(siblings_unique_everywhere)
}

#[test]
fn schema_is_deterministic_with_unique_siblings() -> Result<()> {
    let result = uperf_result()?;
    for granularity in [SchemaGranularity::Endpoint, SchemaGranularity::Network] {
        let options = LoadOptions {
            granularity,
            ..LoadOptions::default()
        };
        let first = load_result(&result, &options);
        let second = load_result(&result, &options);
        assert_eq!(first.columns, second.columns);
        assert!(siblings_unique_everywhere(&first.columns));
        assert!(first.columns.siblings_unique());
        let keys = first.columns.data_keys();
        let distinct: BTreeSet<&str> = keys.iter().copied().collect();
        assert_eq!(keys.len(), distinct.len());
    }
    Ok(())
}

#[test]
fn endpoint_granularity_adds_late_endpoints() -> Result<()> {
    let result = raw_result(
        "r",
        vec![
            iteration(
                1,
                "1-a",
                json!({}),
                json!({ "throughput": { "tcp": { "0": endpoint("h1", "h2", "1", 1.) } } }),
            ),
            iteration(
                2,
                "2-b",
                json!({}),
                json!({ "throughput": { "tcp": { "0": endpoint("h3", "h4", "2", 2.) } } }),
            ),
        ],
    )?;
    let endpoint = load_result(&result, &LoadOptions::default());
    assert_eq!(endpoint.columns.data_keys().len(), 6);
    let network = load_result(
        &result,
        &LoadOptions {
            granularity: SchemaGranularity::Network,
            ..LoadOptions::default()
        },
    );
    assert_eq!(network.columns.data_keys().len(), 3);
    // the values land in the record either way
    assert_eq!(network.records[1].metrics.len(), 3);
    Ok(())
}

#[test]
fn several_results_share_one_schema() -> Result<()> {
    let other = raw_result(
        "uperf_2",
        vec![iteration(
            1,
            "1-tcp_stream-64B-1i",
            json!({ "protocol": "tcp", "primary_metric": "Gb_sec" }),
            json!({ "latency": { "usec": { "0": endpoint("all", "all", "30000", 3.) } } }),
        )],
    )?;
    let loaded = load_results(&[uperf_result()?, other], &LoadOptions::default());
    assert_eq!(loaded.records.len(), 4);
    let types: Vec<&str> = loaded.columns.children.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(types, ["throughput", "latency"]);
    assert_eq!(loaded.observed_ports(), ["20001", "20002", "30000"]);
    let clustering = cluster(&loaded.records, &["protocol"]);
    assert_eq!(clustering.clusters[0].members.len(), 3);
    Ok(())
}

#[test]
fn empty_input_gives_empty_outputs() {
    let loaded = load_results(&[], &LoadOptions::default());
    assert!(loaded.records.is_empty());
    assert!(loaded.columns.children.is_empty());
    let clustering = cluster(&loaded.records, &["protocol"]);
    assert!(clustering.clusters.is_empty());
    let data = build_graph_data(&clustering);
    assert!(data.rows.is_empty() && data.legend.is_empty());
    assert!(merge(&[], MergeStrategy::Position).points.is_empty());
}

struct Samples;

impl SampleFetcher for Samples {
    fn fetch(&self, request: &SampleRequest) -> Result<RawTimeseries, SampleFetchError> {
        let n = request.iteration_number as i64;
        // every iteration has one sample less than the one before
        let timeseries: Vec<Value> = (0..(5 - n))
            .map(|i| json!({ "date": 1000 * i + n, "value": n }))
            .collect();
        serde_json::from_value(json!({
            "throughput": { "Gb_sec": [
                { "client_hostname": "h1", "timeseries": [] },
                { "client_hostname": "all", "timeseries": timeseries }
            ] }
        }))
        .map_err(|e| SampleFetchError::Unavailable(e.to_string()))
    }
}

struct FailSecond;

impl SampleFetcher for FailSecond {
    fn fetch(&self, request: &SampleRequest) -> Result<RawTimeseries, SampleFetchError> {
        if request.iteration_number == 2 {
            Err(SampleFetchError::Unavailable("503".into()))
        } else {
            Samples.fetch(request)
        }
    }
}

#[test]
fn merge_strategies_report_what_they_did() -> Result<()> {
    let mut session =
        ComparisonSession::load(&[uperf_result()?], &LoadOptions::default(), MergeStrategy::Position);
    session.select_dimensions(vec!["protocol".into()]);
    let pool = FetchPool::new(Some(3))?;
    let outcome = session.timeseries(&pool, &Samples);
    assert!(outcome.notices.is_empty());
    let tcp = &outcome.series[0].series;
    assert_eq!(tcp.points.len(), 3);
    assert!(tcp.warnings.contains(&MergeWarning::Truncated {
        shortest: 3,
        longest: 4
    }));
    assert!(tcp.warnings.contains(&MergeWarning::CadenceMismatch { position: 0 }));

    let regrid = ComparisonSession::load(&[uperf_result()?], &LoadOptions::default(), MergeStrategy::Regrid);
    let outcome = regrid.timeseries(&pool, &Samples);
    let all = &outcome.series[0].series;
    assert_eq!(all.strategy, MergeStrategy::Regrid);
    // the grid is the first series; the others are interpolated
    assert_eq!(all.points.len(), 4);
    assert_eq!(all.points[1].y.get(&2), Some(&2.));
    assert_eq!(all.points[3].y.get(&2), None);
    Ok(())
}

#[test]
fn fetch_failure_is_one_notice() -> Result<()> {
    let mut session =
        ComparisonSession::load(&[uperf_result()?], &LoadOptions::default(), MergeStrategy::Position);
    session.select_dimensions(vec!["protocol".into()]);
    let outcome = session.timeseries(&FetchPool::new(None)?, &FailSecond);
    assert!(outcome.series.is_empty());
    assert_eq!(outcome.notices.len(), 1);
    let Notice::NetworkError { failed, total, message } = &outcome.notices[0];
    assert_eq!((*failed, *total), (1, 3));
    assert!(message.contains("ctrl/uperf_1/2-tcp_stream-1024B-1i/sample2/result.json"));
    // clusters and bar rows are still there
    assert_eq!(session.cluster_summaries().len(), 2);
    assert_eq!(session.graphs()[0].graph.rows[0].values.len(), 2);
    Ok(())
}
